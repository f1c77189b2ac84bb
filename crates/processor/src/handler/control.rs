// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// FOR and CASE control.
//
// FOR keeps its control state on the procedure stack: FOR1 pushes
// {control variable address, limit} when the loop runs at all, FOR2
// advances the control variable against them and discards both when
// the loop is done.
//
// A CASE statement compiles to ENTC with a jump table placed after
// the case bodies:
//
//     table:  low, high,
//             entry[low] .. entry[high],   (absolute byte addresses)
//             default entry
//     end:    ...code after the CASE...
//
// ENTC saves `end` on the procedure stack and jumps through the
// table; EXC at the end of each body jumps to the saved address.

use mule_context::Machine;
use mule_isa::Trap;

use crate::{Fault, Interpreter, Services};

fn code_word(machine: &Machine, byte_offset: usize) -> Result<u16, Fault> {
    let code = &machine.current_module().code;
    if byte_offset + 2 > code.len() {
        return Err(Fault::Trap(Trap::CodeOverflow));
    }
    Ok(((code[byte_offset] as u16) << 8) | (code[byte_offset + 1] as u16))
}

// FOR1 (param sign:u8 skip:u16): pop hi, lo, addr. Sign 0 counts up,
// anything else down. Without a first iteration, skip the body.
pub fn for_enter(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let downward = machine.fetch_byte()? != 0;
    let skip = machine.fetch_word()? as usize;

    let high = machine.exprs.pop_word()? as i16;
    let low = machine.exprs.pop_word()? as i16;
    let address = machine.exprs.pop_word()?;

    let iterates = if downward { low >= high } else { low <= high };
    if iterates {
        machine.arena.write_word(address as usize, low as u16);
        machine.stack_push(address)?;
        machine.stack_push(high as u16)?;
    } else {
        machine.regs.pc += skip;
    }
    Ok(())
}

// FOR2 (param step:u8 back:u16): advance the control variable; jump
// back while it stays within the limit, drop the control words when
// it does not.
pub fn for_step(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let step = machine.fetch_byte()? as i8;
    let back = machine.fetch_word()? as usize;

    if machine.regs.s < 2 {
        return Err(Fault::Trap(Trap::StackOverflow));
    }
    let limit = machine.arena.read_word(machine.regs.s - 1) as i16;
    let address = machine.arena.read_word(machine.regs.s - 2) as usize;

    let next = machine.arena.read_word(address) as i16 as i32 + step as i32;
    let within = if step >= 0 {
        next <= limit as i32
    } else {
        next >= limit as i32
    };

    if within {
        machine.arena.write_word(address, next as u16);
        machine.regs.pc = machine.regs.pc.wrapping_sub(back);
    } else {
        machine.regs.s -= 2;
    }
    Ok(())
}

// ENTC (param tab:u16): dispatch through the case table
pub fn case_enter(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let displacement = machine.fetch_word()? as usize;
    let table = machine.regs.pc + displacement;

    let selector = machine.exprs.pop_word()? as i16;
    let low = code_word(machine, table)? as i16;
    let high = code_word(machine, table + 2)? as i16;

    let entry_count = (high as i32 - low as i32 + 1) as usize;
    let default_entry = table + 4 + entry_count * 2;
    let end = default_entry + 2;

    let target = if selector >= low && selector <= high {
        let slot = (selector as i32 - low as i32) as usize;
        code_word(machine, table + 4 + slot * 2)?
    } else {
        code_word(machine, default_entry)?
    };

    machine.stack_push(end as u16)?;
    machine.regs.pc = target as usize;
    Ok(())
}

// EXC: resume after the CASE
pub fn case_exit(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let end = machine.stack_pop()?;
    machine.regs.pc = end as usize;
    Ok(())
}

// NOP
pub fn nop(
    _interp: &Interpreter,
    _machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    Ok(())
}
