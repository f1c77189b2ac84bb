// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// 16-bit arithmetic. Addition, subtraction and multiplication trap
// when the mathematical result leaves the representable range, in
// both the signed and the unsigned family; division traps on zero.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

fn pop_unsigned_pair(machine: &mut Machine) -> Result<(u16, u16), Fault> {
    let b = machine.exprs.pop_word()?;
    let a = machine.exprs.pop_word()?;
    Ok((a, b))
}

fn pop_signed_pair(machine: &mut Machine) -> Result<(i16, i16), Fault> {
    let b = machine.exprs.pop_word()? as i16;
    let a = machine.exprs.pop_word()? as i16;
    Ok((a, b))
}

// UADD
pub fn unsigned_add(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_unsigned_pair(machine)?;
    let result = a
        .checked_add(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// USUB
pub fn unsigned_sub(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_unsigned_pair(machine)?;
    let result = a
        .checked_sub(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// UMUL
pub fn unsigned_mul(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_unsigned_pair(machine)?;
    let result = a
        .checked_mul(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// UDIV
pub fn unsigned_div(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_unsigned_pair(machine)?;
    let result = a
        .checked_div(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// UMOD
pub fn unsigned_mod(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_unsigned_pair(machine)?;
    let result = a
        .checked_rem(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// ROR
pub fn rotate_right(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let value = machine.exprs.pop_word()?;
    machine
        .exprs
        .push_word(value.rotate_right((count & 15) as u32))?;
    Ok(())
}

// SHL: shifts of 16 or more clear the word
pub fn shift_left(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let value = machine.exprs.pop_word()?;
    let result = if count > 15 { 0 } else { value << count };
    machine.exprs.push_word(result)?;
    Ok(())
}

// SHR: logical shift
pub fn shift_right(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let value = machine.exprs.pop_word()?;
    let result = if count > 15 { 0 } else { value >> count };
    machine.exprs.push_word(result)?;
    Ok(())
}

// IADD
pub fn signed_add(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_signed_pair(machine)?;
    let result = a
        .checked_add(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}

// ISUB
pub fn signed_sub(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_signed_pair(machine)?;
    let result = a
        .checked_sub(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}

// IMUL
pub fn signed_mul(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_signed_pair(machine)?;
    let result = a
        .checked_mul(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}

// IDIV: truncating, traps on zero and on MIN/-1
pub fn signed_div(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_signed_pair(machine)?;
    let result = a
        .checked_div(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}

// IMOD
pub fn signed_mod(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_signed_pair(machine)?;
    let result = a
        .checked_rem(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}
