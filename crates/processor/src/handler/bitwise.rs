// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::Machine;

use crate::{Fault, Interpreter, Services};

fn low_bits_mask(count: u16) -> u16 {
    if count >= 16 {
        0xffff
    } else {
        (1u16 << count) - 1
    }
}

// OR
pub fn or(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_word()?;
    let a = machine.exprs.pop_word()?;
    machine.exprs.push_word(a | b)?;
    Ok(())
}

// XOR
pub fn xor(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_word()?;
    let a = machine.exprs.pop_word()?;
    machine.exprs.push_word(a ^ b)?;
    Ok(())
}

// AND
pub fn and(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = machine.exprs.pop_word()?;
    let a = machine.exprs.pop_word()?;
    machine.exprs.push_word(a & b)?;
    Ok(())
}

// COM: ones complement
pub fn complement(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    machine.exprs.push_word(!value)?;
    Ok(())
}

// IN: bit i of the set; out-of-range bits read as 0
pub fn set_in(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let set = machine.exprs.pop_word()?;
    let index = machine.exprs.pop_word()?;
    let bit = if index > 15 { 0 } else { (set >> index) & 1 };
    machine.exprs.push_word(bit)?;
    Ok(())
}

// LIN (param n:u8): bit n of the set
pub fn set_in_immediate(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.fetch_byte()? as u16;
    let set = machine.exprs.pop_word()?;
    let bit = if index > 15 { 0 } else { (set >> index) & 1 };
    machine.exprs.push_word(bit)?;
    Ok(())
}

// MSK: mask of the low i bits. For i >= 16 the historical behavior
// is 0xffff shifted left by i-16, kept as-is.
pub fn mask(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.exprs.pop_word()? & 31;
    let result = if index < 16 {
        low_bits_mask(index)
    } else {
        0xffffu16 << (index - 16)
    };
    machine.exprs.push_word(result)?;
    Ok(())
}

// NOT: boolean negation
pub fn not(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    machine.exprs.push_word((value == 0) as u16)?;
    Ok(())
}

// BIT: 1 << i; out-of-range bits yield the empty set
pub fn bit(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let index = machine.exprs.pop_word()?;
    let result = if index > 15 { 0 } else { 1u16 << index };
    machine.exprs.push_word(result)?;
    Ok(())
}

// UNPK: pop n, pop i, pop w; bits i..i+n-1 of w, right-justified
pub fn unpack(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()?;
    let position = machine.exprs.pop_word()? & 15;
    let word = machine.exprs.pop_word()?;
    machine
        .exprs
        .push_word((word >> position) & low_bits_mask(count))?;
    Ok(())
}

// PACK: pop v, pop n, pop i, pop a; insert the low n bits of v into
// DSH[a] at position i
pub fn pack(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    let count = machine.exprs.pop_word()?;
    let position = machine.exprs.pop_word()? & 15;
    let address = machine.exprs.pop_word()? as usize;
    let mask = low_bits_mask(count) << position;
    let word = machine.arena.read_word(address);
    let packed = (word & !mask) | ((value << position) & mask);
    machine.arena.write_word(address, packed);
    Ok(())
}
