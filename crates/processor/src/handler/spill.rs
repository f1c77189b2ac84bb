// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Expression-stack spill machinery.
//
// The compiler brackets every procedure call whose surrounding
// expression is still open: STORE parks the live operands on the
// procedure stack (count on top), the call runs with an empty
// expression stack, and LODFW/LODFD bring the operands back with the
// callee's result on top.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

fn restore_spill(machine: &mut Machine) -> Result<(), Fault> {
    let count = machine.stack_pop()? as usize;
    if count > machine.regs.s {
        return Err(Fault::Trap(Trap::StackOverflow));
    }
    let base = machine.regs.s - count;
    let words = machine.arena.slice(base, count).to_vec();
    machine.exprs.reload(&words)?;
    machine.regs.s = base;
    Ok(())
}

// STORE: spill the whole expression stack, count word on top
pub fn store(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let words = machine.exprs.as_slice().to_vec();
    machine.exprs.clear();
    for word in &words {
        machine.stack_push(*word)?;
    }
    machine.stack_push(words.len() as u16)?;
    Ok(())
}

// LODFW: pop the function result, restore the spill, result on top
pub fn load_result_word(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let result = machine.exprs.pop_word()?;
    restore_spill(machine)?;
    machine.exprs.push_word(result)?;
    Ok(())
}

// LODFD: doubleword result variant
pub fn load_result_double(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let result = machine.exprs.pop_dword()?;
    restore_spill(machine)?;
    machine.exprs.push_dword(result)?;
    Ok(())
}

// STOT: move the top word to the procedure stack
pub fn store_top(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    machine.stack_push(value)?;
    Ok(())
}

// STOFV: move the top doubleword to the procedure stack, low word
// first so the stacked pair reads like an arena doubleword
pub fn store_formal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_dword()?;
    machine.stack_push(value as u16)?;
    machine.stack_push((value >> 16) as u16)?;
    Ok(())
}

// COPT: duplicate the top word
pub fn copy_top(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.top_word()?;
    machine.exprs.push_word(value)?;
    Ok(())
}

// DECS: drop the top word
pub fn drop_top(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    machine.exprs.pop_word()?;
    Ok(())
}

// PCOP (param n:u8): copy a value parameter onto the stack. Pops the
// source address and word count, copies the block to the stack top,
// and makes local n the address of the copy.
pub fn copy_parameter(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let local_index = machine.fetch_byte()? as usize;
    let words = machine.exprs.pop_word()? as usize;
    let source = machine.exprs.pop_word()? as usize;

    let copy_base = machine.regs.s;
    super::block::check_block(source, words)?;
    machine.stack_grow(words)?;
    machine.arena.copy_words(copy_base, source, words);
    machine
        .arena
        .write_word(machine.regs.l + local_index, copy_base as u16);
    Ok(())
}
