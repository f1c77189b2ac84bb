// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// 32-bit integer arithmetic. Unlike the 16-bit opcodes these do not
// trap on overflow; only division faults.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

// DADD
pub fn double_add(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_dword()?;
    let a = machine.exprs.pop_dword()?;
    machine.exprs.push_dword(a.wrapping_add(b))?;
    Ok(())
}

// DSUB
pub fn double_sub(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_dword()?;
    let a = machine.exprs.pop_dword()?;
    machine.exprs.push_dword(a.wrapping_sub(b))?;
    Ok(())
}

// DMUL
pub fn double_mul(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_dword()?;
    let a = machine.exprs.pop_dword()?;
    machine.exprs.push_dword(a.wrapping_mul(b))?;
    Ok(())
}

// DDIV: signed division, faults on zero and on MIN/-1
pub fn double_div(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_dword()? as i32;
    let a = machine.exprs.pop_dword()? as i32;
    let quotient = a
        .checked_div(b)
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_dword(quotient as u32)?;
    Ok(())
}

// DSHL
pub fn double_shift_left(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let value = machine.exprs.pop_dword()?;
    let result = if count > 31 { 0 } else { value << count };
    machine.exprs.push_dword(result)?;
    Ok(())
}

// DSHR: logical shift
pub fn double_shift_right(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let value = machine.exprs.pop_dword()?;
    let result = if count > 31 { 0 } else { value >> count };
    machine.exprs.push_dword(result)?;
    Ok(())
}
