// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Jump displacements are counted from the end of the whole
// instruction. A displaced PC that leaves the code frame is caught
// by the bounds check of the next fetch.

use mule_context::Machine;

use crate::{Fault, Interpreter, Services};

fn displace(machine: &mut Machine, displacement: i64) {
    machine.regs.pc = (machine.regs.pc as i64).wrapping_add(displacement) as usize;
}

// JPC (param disp:u16, signed): jump when the condition is FALSE
pub fn jump_conditional(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_word()? as i16;
    if machine.exprs.pop_word()? == 0 {
        displace(machine, displacement as i64);
    }
    Ok(())
}

// JP (param disp:u16, signed)
pub fn jump(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_word()? as i16;
    displace(machine, displacement as i64);
    Ok(())
}

// JPFC (param disp:u8)
pub fn jump_forward_conditional(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    if machine.exprs.pop_word()? == 0 {
        displace(machine, displacement);
    }
    Ok(())
}

// JPF (param disp:u8)
pub fn jump_forward(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    displace(machine, displacement);
    Ok(())
}

// JPBC (param disp:u8)
pub fn jump_backward_conditional(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    if machine.exprs.pop_word()? == 0 {
        displace(machine, -displacement);
    }
    Ok(())
}

// JPB (param disp:u8)
pub fn jump_backward(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    displace(machine, -displacement);
    Ok(())
}

// ORJP (param disp:u8): short-circuit OR. A TRUE left operand is the
// result; otherwise the right operand is evaluated next.
pub fn or_jump(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    if machine.exprs.pop_word()? != 0 {
        machine.exprs.push_word(1)?;
        displace(machine, displacement);
    }
    Ok(())
}

// ANDJP (param disp:u8): short-circuit AND
pub fn and_jump(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_byte()? as i64;
    if machine.exprs.pop_word()? == 0 {
        machine.exprs.push_word(0)?;
        displace(machine, displacement);
    }
    Ok(())
}
