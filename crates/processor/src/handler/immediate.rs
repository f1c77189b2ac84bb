// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::Machine;

use crate::{Fault, Interpreter, Services};

use super::external_data_offset;

// LI0..LI15: the operand is the low nibble of the opcode
pub fn load_immediate_short(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = (machine.regs.ir & 0x0f) as u16;
    machine.exprs.push_word(value)?;
    Ok(())
}

// LIB (param b:u8)
pub fn load_immediate_byte(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.fetch_byte()? as u16;
    machine.exprs.push_word(value)?;
    Ok(())
}

// LIW (param w:u16)
pub fn load_immediate_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.fetch_word()?;
    machine.exprs.push_word(value)?;
    Ok(())
}

// LID (param hi:u16 lo:u16)
pub fn load_immediate_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let high = machine.fetch_word()?;
    let low = machine.fetch_word()?;
    machine.exprs.push_word(high)?;
    machine.exprs.push_word(low)?;
    Ok(())
}

// LLA (param n:u8): address of local word n
pub fn load_local_address(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as usize;
    machine.exprs.push_word((machine.regs.l + offset) as u16)?;
    Ok(())
}

// LGA (param n:u8): address of global word n
pub fn load_global_address(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as usize;
    machine.exprs.push_word((machine.regs.g + offset) as u16)?;
    Ok(())
}

// LSA (param n:u8): displace the address on the stack
pub fn load_stack_address(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as u16;
    let address = machine.exprs.pop_word()?;
    machine.exprs.push_word(address.wrapping_add(offset))?;
    Ok(())
}

// LEA (param m:u8 a:u8): address of word a in module m's data frame
pub fn load_external_address(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let module = machine.fetch_byte()? as usize;
    let offset = machine.fetch_byte()? as usize;
    let base = external_data_offset(machine, module)?;
    machine.exprs.push_word((base + offset) as u16)?;
    Ok(())
}

// LSTA (param w:u16): address of a string constant in the data frame
pub fn load_string_address(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_word()? as usize;
    machine.exprs.push_word((machine.regs.g + offset) as u16)?;
    Ok(())
}
