// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::Machine;
use mule_isa::{Trap, ARENA_SIZE_IN_WORDS};

use crate::{Fault, Interpreter, Services};

pub(crate) fn check_block(base: usize, count: usize) -> Result<(), Fault> {
    if base + count > ARENA_SIZE_IN_WORDS {
        return Err(Fault::Trap(Trap::Index));
    }
    Ok(())
}

// MOV: pop k, pop j, pop i; copy k words DSH[j..] -> DSH[i..]
pub fn move_words(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()? as usize;
    let source = machine.exprs.pop_word()? as usize;
    let destination = machine.exprs.pop_word()? as usize;
    check_block(source, count)?;
    check_block(destination, count)?;
    machine.arena.copy_words(destination, source, count);
    Ok(())
}

// CMP: pop k, pop j, pop i; push the first differing word pair of
// the two blocks, or two zeros when they are equal
pub fn compare_blocks(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.exprs.pop_word()? as usize;
    let second = machine.exprs.pop_word()? as usize;
    let first = machine.exprs.pop_word()? as usize;
    check_block(first, count)?;
    check_block(second, count)?;

    let (a, b) = machine
        .arena
        .compare_words(first, second, count)
        .unwrap_or((0, 0));
    machine.exprs.push_word(a)?;
    machine.exprs.push_word(b)?;
    Ok(())
}
