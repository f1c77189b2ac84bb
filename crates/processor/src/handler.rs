// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

pub mod bitwise;
pub mod block;
pub mod calling;
pub mod checks;
pub mod compare;
pub mod control;
pub mod double;
pub mod float;
pub mod immediate;
pub mod indexed;
pub mod integer;
pub mod io;
pub mod jumps;
pub mod local_global;
pub mod spill;

/// One opcode handler. `PC` has been advanced past the opcode byte;
/// the handler fetches its own operands.
pub type HandlerFn = fn(&Interpreter, &mut Machine, &mut Services) -> Result<(), Fault>;

/// The default table entry: the opcode byte is outside the defined
/// instruction set.
pub fn invalid_opcode(
    _interp: &Interpreter,
    _machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    Err(Fault::Trap(Trap::InvalidOpcode))
}

/// TRA, MOVF, LXFW, SXFW, DDT, REPL, BBLT: present in the
/// instruction set, halt on use.
pub fn unimplemented_opcode(
    _interp: &Interpreter,
    _machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    Err(Fault::Unimplemented)
}

/// Bounds-checked data-frame base of module `index`. An index past
/// the module table would otherwise read another module's frame.
pub(crate) fn external_data_offset(machine: &Machine, index: usize) -> Result<usize, Fault> {
    match machine.modules.get(index) {
        Some(module) => Ok(module.data_offset),
        None => Err(Fault::BadModuleIndex { index }),
    }
}

/// Reads a guest string: characters packed two per word, high byte
/// first.
pub(crate) fn read_guest_string(machine: &Machine, base: usize, length: usize) -> String {
    let mut bytes = Vec::with_capacity(length);
    for index in 0..length {
        let word = machine.arena.read_word(base + index / 2);
        let byte = if index % 2 == 0 {
            (word >> 8) as u8
        } else {
            word as u8
        };
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
