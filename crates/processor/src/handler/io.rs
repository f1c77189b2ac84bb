// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Hardware channels and character output.
//
// Channel 1 is the keyboard-pending flag, channel 2 the buffered
// key. The disk channels exist in the instruction set but this
// machine has no disk; touching them is a system trap, the same
// fault a diskless Lilith would raise.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

// READ: pop a, pop ch, DSH[a] := channel value
pub fn read_channel(
    _interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let address = machine.exprs.pop_word()? as usize;
    let channel = machine.exprs.pop_word()?;
    let value = match channel {
        1 => services.key_pending() as u16,
        2 => services.take_key(),
        _ => return Err(Fault::Trap(Trap::System)),
    };
    machine.arena.write_word(address, value);
    Ok(())
}

// WRITE: pop v, pop ch, emit v on channel ch
pub fn write_channel(
    _interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let value = machine.exprs.pop_word()?;
    let channel = machine.exprs.pop_word()?;
    match channel {
        0 | 1 => {
            services.terminal.put_char(value as u8);
            Ok(())
        }
        _ => Err(Fault::Trap(Trap::System)),
    }
}

// DSKR/DSKW/SETRK: no disk controller on this machine
pub fn no_disk(
    _interp: &Interpreter,
    _machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    Err(Fault::Trap(Trap::System))
}

// DCH: pop ch and the two position words the bitmap display used,
// emit the character
pub fn display_char(
    _interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let character = machine.exprs.pop_word()?;
    let _column = machine.exprs.pop_word()?;
    let _line = machine.exprs.pop_word()?;
    services.terminal.put_char(character as u8);
    Ok(())
}

// RDS (param n:u8): pop a, read up to n+1 words of keyboard input,
// one character per word, NUL-terminated. Stops early at end of
// line or when no key is pending.
pub fn read_string(
    _interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let count = machine.fetch_byte()? as usize;
    let address = machine.exprs.pop_word()? as usize;
    for offset in 0..=count {
        let key = services.take_key();
        if key == 0 || key == 0x0D || key == 0x0A {
            machine.arena.write_word(address + offset, 0);
            return Ok(());
        }
        machine.arena.write_word(address + offset, key);
    }
    Ok(())
}
