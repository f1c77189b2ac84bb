// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Stack-indexed data access: the base address is an operand on the
// expression stack. Byte indexing sees the guest's byte order: byte 0
// of a word is its high byte.

use mule_context::Machine;

use crate::{Fault, Interpreter, Services};

// LSW0..LSW15
pub fn load_stack_word_short(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = (machine.regs.ir & 0x0f) as u16;
    let address = machine.exprs.pop_word()?;
    let value = machine.arena.read_word(address.wrapping_add(offset) as usize);
    machine.exprs.push_word(value)?;
    Ok(())
}

// SSW0..SSW15
pub fn store_stack_word_short(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = (machine.regs.ir & 0x0f) as u16;
    let value = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    machine
        .arena
        .write_word(address.wrapping_add(offset) as usize, value);
    Ok(())
}

// LSW (param n:u8)
pub fn load_stack_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as u16;
    let address = machine.exprs.pop_word()?;
    let value = machine.arena.read_word(address.wrapping_add(offset) as usize);
    machine.exprs.push_word(value)?;
    Ok(())
}

// LSD (param n:u8)
pub fn load_stack_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as u16;
    let address = machine.exprs.pop_word()?;
    let value = machine.arena.read_dword(address.wrapping_add(offset) as usize);
    machine.exprs.push_dword(value)?;
    Ok(())
}

// LSD0
pub fn load_stack_double0(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let address = machine.exprs.pop_word()?;
    let value = machine.arena.read_dword(address as usize);
    machine.exprs.push_dword(value)?;
    Ok(())
}

// LXB: byte i of the word array at a
pub fn load_indexed_byte(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    let word = machine
        .arena
        .read_word(address.wrapping_add(index / 2) as usize);
    let byte = if index % 2 == 0 {
        word >> 8
    } else {
        word & 0x00ff
    };
    machine.exprs.push_word(byte)?;
    Ok(())
}

// LXW: word i of the array at a
pub fn load_indexed_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    let value = machine.arena.read_word(address.wrapping_add(index) as usize);
    machine.exprs.push_word(value)?;
    Ok(())
}

// LXD: doubleword i of the array at a
pub fn load_indexed_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    let value = machine
        .arena
        .read_dword(address.wrapping_add(index.wrapping_mul(2)) as usize);
    machine.exprs.push_dword(value)?;
    Ok(())
}

// SSW (param n:u8)
pub fn store_stack_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as u16;
    let value = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    machine
        .arena
        .write_word(address.wrapping_add(offset) as usize, value);
    Ok(())
}

// SSD (param n:u8)
pub fn store_stack_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let offset = machine.fetch_byte()? as u16;
    let value = machine.exprs.pop_dword()?;
    let address = machine.exprs.pop_word()?;
    machine
        .arena
        .write_dword(address.wrapping_add(offset) as usize, value);
    Ok(())
}

// SSD0
pub fn store_stack_double0(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_dword()?;
    let address = machine.exprs.pop_word()?;
    machine.arena.write_dword(address as usize, value);
    Ok(())
}

// TS: test-and-set
pub fn test_and_set(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let address = machine.exprs.pop_word()? as usize;
    let old = machine.arena.read_word(address);
    machine.arena.write_word(address, 1);
    machine.exprs.push_word(old)?;
    Ok(())
}

// SXB: store byte i of the word array at a
pub fn store_indexed_byte(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    let word_address = address.wrapping_add(index / 2) as usize;
    let word = machine.arena.read_word(word_address);
    let new = if index % 2 == 0 {
        (value << 8) | (word & 0x00ff)
    } else {
        (word & 0xff00) | (value & 0x00ff)
    };
    machine.arena.write_word(word_address, new);
    Ok(())
}

// SXW
pub fn store_indexed_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    machine
        .arena
        .write_word(address.wrapping_add(index) as usize, value);
    Ok(())
}

// SXD
pub fn store_indexed_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_dword()?;
    let index = machine.exprs.pop_word()?;
    let address = machine.exprs.pop_word()?;
    machine
        .arena
        .write_dword(address.wrapping_add(index.wrapping_mul(2)) as usize, value);
    Ok(())
}
