// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

fn pop_pair(machine: &mut Machine) -> Result<(u16, u16), Fault> {
    let b = machine.exprs.pop_word()?;
    let a = machine.exprs.pop_word()?;
    Ok((a, b))
}

fn push_bool(machine: &mut Machine, value: bool) -> Result<(), Fault> {
    machine.exprs.push_word(value as u16)?;
    Ok(())
}

// EQL
pub fn equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a == b)
}

// NEQ
pub fn not_equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a != b)
}

// LSS
pub fn less(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, (a as i16) < (b as i16))
}

// LEQ
pub fn less_equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, (a as i16) <= (b as i16))
}

// GTR
pub fn greater(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, (a as i16) > (b as i16))
}

// GEQ
pub fn greater_equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, (a as i16) >= (b as i16))
}

// ULSS
pub fn unsigned_less(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a < b)
}

// ULEQ
pub fn unsigned_less_equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a <= b)
}

// UGTR
pub fn unsigned_greater(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a > b)
}

// UGEQ
pub fn unsigned_greater_equal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let (a, b) = pop_pair(machine)?;
    push_bool(machine, a >= b)
}

// ABS: traps on the asymmetric minimum
pub fn absolute(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()? as i16;
    let result = value
        .checked_abs()
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}

// NEG
pub fn negate(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()? as i16;
    let result = value
        .checked_neg()
        .ok_or(Fault::Trap(Trap::IntegerArithmetic))?;
    machine.exprs.push_word(result as u16)?;
    Ok(())
}
