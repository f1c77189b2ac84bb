// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Procedure calls and returns.
//
// Every call pushes the 4-word frame prelude (see Machine::push_frame)
// and the discriminator in frame word 0 tells RTN how to unwind:
//
// - an external call stores the caller's module index (always < 0x100)
// - a local or intermediate call stores the caller frame address
//   plus 0x100
//
// A call of 0.0 (module 0, procedure 0) is the System initialization
// sink and does nothing.

use mule_context::Machine;

use crate::{Fault, Interpreter, Services};

/// The local-call discriminator: the caller's frame address tagged
/// past the module-index range.
fn local_discriminator(machine: &Machine) -> u16 {
    (machine.regs.cs + 0x100) as u16
}

fn local_entry(machine: &Machine, proc_index: usize) -> Result<u16, Fault> {
    let module = machine.current_module();
    match module.procs.get(proc_index) {
        Some(&entry) if entry != 0 => Ok(entry),
        _ => Err(Fault::UnresolvedProcedure {
            module_index: machine.regs.modn,
            proc_index,
        }),
    }
}

fn external_call(
    machine: &mut Machine,
    module_index: usize,
    proc_index: usize,
) -> Result<(), Fault> {
    // the System initialization sink
    if module_index == 0 && proc_index == 0 {
        return Ok(());
    }
    if module_index >= machine.modules.len() {
        return Err(Fault::BadModuleIndex {
            index: module_index,
        });
    }
    let entry = match machine.modules[module_index].procs.get(proc_index) {
        Some(&entry) if entry != 0 => entry,
        _ => {
            return Err(Fault::UnresolvedProcedure {
                module_index,
                proc_index,
            })
        }
    };

    let caller = machine.regs.modn as u16;
    let caller_l = machine.regs.l;
    machine.push_frame(caller, caller_l)?;
    machine.set_module(module_index);
    machine.regs.pc = entry as usize;
    Ok(())
}

fn local_call(machine: &mut Machine, proc_index: usize) -> Result<(), Fault> {
    let entry = local_entry(machine, proc_index)?;
    let discriminator = local_discriminator(machine);
    let caller_l = machine.regs.l;
    machine.push_frame(discriminator, caller_l)?;
    machine.regs.pc = entry as usize;
    Ok(())
}

// ENTP (param n:u8): save the interrupt mask in the frame's priority
// slot and raise it
pub fn enter_priority(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let priority = machine.fetch_byte()? as u16;
    machine
        .arena
        .write_word(machine.regs.cs + 3, machine.regs.m);
    machine.regs.m = priority;
    Ok(())
}

// EXP: restore the interrupt mask from the priority slot
pub fn exit_priority(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    machine.regs.m = machine.arena.read_word(machine.regs.cs + 3);
    Ok(())
}

// GB (param n:u8): follow the static chain n levels
pub fn static_chain(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let levels = machine.fetch_byte()?;
    let mut base = machine.arena.read_word(machine.regs.l + 1);
    for _ in 1..levels {
        base = machine.arena.read_word(base as usize + 1);
    }
    machine.exprs.push_word(base)?;
    Ok(())
}

// GB1: one static level
pub fn static_chain_one(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let base = machine.arena.read_word(machine.regs.l + 1);
    machine.exprs.push_word(base)?;
    Ok(())
}

// ALLOC: pop n, reserve n words on the procedure stack, push their
// address
pub fn alloc_stack(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let words = machine.exprs.pop_word()? as usize;
    let base = machine.regs.s;
    machine.stack_grow(words)?;
    machine.exprs.push_word(base as u16)?;
    Ok(())
}

// ENTR (param n:u8): reserve the local variables of the entered
// procedure
pub fn enter_frame(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let words = machine.fetch_byte()? as usize;
    machine.stack_grow(words)?;
    Ok(())
}

// RTN
pub fn return_from_procedure(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let frame = machine.regs.cs;
    machine.regs.s = frame;

    let discriminator = machine.arena.read_word(frame);
    machine.regs.pc = machine.arena.read_word(frame + 2) as usize;

    if discriminator >= 0x100 {
        // local return: back to the caller's frame
        let caller_frame = (discriminator - 0x100) as usize;
        machine.regs.cs = caller_frame;
        machine.regs.l = caller_frame;
    } else {
        // external return: back to the caller's module
        let caller_module = discriminator as usize;
        if caller_module >= machine.modules.len() {
            return Err(Fault::BadModuleIndex {
                index: caller_module,
            });
        }
        machine.set_module(caller_module);
        let caller_l = machine.arena.read_word(frame + 1) as usize;
        machine.regs.l = caller_l;
        machine.regs.cs = caller_l;
    }
    Ok(())
}

// CLX (param m:u8 p:u8)
pub fn call_external(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let module_index = machine.fetch_byte()? as usize;
    let proc_index = machine.fetch_byte()? as usize;
    external_call(machine, module_index, proc_index)
}

// CLI (param p:u8): call with an explicit static base popped off the
// expression stack
pub fn call_intermediate(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let proc_index = machine.fetch_byte()? as usize;
    let base = machine.exprs.pop_word()? as usize;
    let entry = local_entry(machine, proc_index)?;
    let discriminator = local_discriminator(machine);
    machine.push_frame(discriminator, base)?;
    machine.regs.pc = entry as usize;
    Ok(())
}

// CLF: formal call, descriptor {module:hi, procedure:lo} on the stack
pub fn call_formal(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let descriptor = machine.exprs.pop_word()?;
    let module_index = (descriptor >> 8) as usize;
    let proc_index = (descriptor & 0x00ff) as usize;
    external_call(machine, module_index, proc_index)
}

// CLL (param p:u8)
pub fn call_local(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let proc_index = machine.fetch_byte()? as usize;
    local_call(machine, proc_index)
}

// CLL1..CLL15
pub fn call_local_short(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let proc_index = (machine.regs.ir & 0x0f) as usize;
    local_call(machine, proc_index)
}
