// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Supervisor calls: the services the original runtime provided to
// guest code.
//
//   SVC 0  heap: allocate / free / bulk release
//   SVC 1  load and run another program, then come back
//   SVC 2  wall clock
//   SVC 3  host files
//
// SYS is reserved for boot, dump and priority control; none of its
// sub-codes is recognized by this machine.
//
// File operations report success as a 0/1 status word on the
// expression stack, above any result value; an I/O failure is the
// guest's to handle, never a fault.

use mule_context::loader;
use mule_context::Machine;

use crate::handler::read_guest_string;
use crate::{Fault, Interpreter, Services};

// SVC (param sub:u8)
pub fn svc(
    interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let sub_code = machine.fetch_byte()?;
    match sub_code {
        0 => svc_heap(machine),
        1 => svc_program(interp, machine, services),
        2 => svc_clock(machine, services),
        3 => svc_file(machine, services),
        _ => Err(Fault::UnknownSvc { code: sub_code }),
    }
}

// SYS (param sub:u8)
pub fn sys(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let sub_code = machine.fetch_byte()?;
    Err(Fault::UnknownSys { code: sub_code })
}

// pop mode, pop size, pop variable address.
// mode 0: DSH[var] := allocate(size)
// mode 1: free(DSH[var])
// mode 2: release every block of this module with address <= DSH[var]
fn svc_heap(machine: &mut Machine) -> Result<(), Fault> {
    let mode = machine.exprs.pop_word()?;
    let size = machine.exprs.pop_word()? as usize;
    let variable = machine.exprs.pop_word()? as usize;
    let owner = machine.regs.modn as u8;

    match mode {
        0 => {
            let address = machine.heap.allocate(owner, size, machine.regs.s)?;
            machine.arena.write_word(variable, address as u16);
        }
        1 => {
            let address = machine.arena.read_word(variable) as usize;
            machine.heap.free(address)?;
        }
        2 => {
            let limit = machine.arena.read_word(variable) as usize;
            machine.heap.free_all(owner, limit);
        }
        _ => return Err(Fault::UnknownSvc { code: 0 }),
    }
    Ok(())
}

// pop the name descriptor {length, base}, save the register file,
// load and run the named program, restore, and report 0/1.
fn svc_program(
    interp: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), Fault> {
    let length = machine.exprs.pop_word()? as usize;
    let base = machine.exprs.pop_word()? as usize;
    let name = read_guest_string(machine, base, length);

    let saved_regs = machine.regs.clone();
    let saved_data_top = machine.data_top;
    let saved_exprs = machine.exprs.as_slice().to_vec();
    machine.exprs.clear();

    // the chained program's data frames are laid out above the live
    // procedure stack and given back afterwards
    machine.data_top = machine.regs.s;

    let status: u16 = match loader::load_initfile(machine, &name, "SYS") {
        Ok(marker) => {
            let result = interp.execute(machine, services, marker);
            machine.unload_to(marker);
            match result {
                Ok(()) => 0,
                Err(inner) => return Err(Fault::Nested(Box::new(inner))),
            }
        }
        Err(_) => 1,
    };

    machine.data_top = saved_data_top;
    machine.regs = saved_regs;
    machine.exprs.reload(&saved_exprs)?;
    machine.exprs.push_word(status)?;
    Ok(())
}

// pop the variable address; store {packed date, minutes, 0}.
// the words are byte-swapped so the guest, which reads its memory
// big-endian, sees them in its own order.
fn svc_clock(machine: &mut Machine, services: &mut Services) -> Result<(), Fault> {
    let variable = machine.exprs.pop_word()? as usize;
    let time = services.clock.now();
    machine
        .arena
        .write_word(variable, time.packed_date().swap_bytes());
    machine
        .arena
        .write_word(variable + 1, time.packed_minutes().swap_bytes());
    machine.arena.write_word(variable + 2, 0);
    Ok(())
}

// pop the file sub-command, pop the guest file-descriptor address,
// then the sub-command's own operands
fn svc_file(machine: &mut Machine, _services: &mut Services) -> Result<(), Fault> {
    let sub_command = machine.exprs.pop_word()?;
    let descriptor = machine.exprs.pop_word()?;
    let owner = machine.regs.modn;

    let ok = match sub_command {
        // Create: a nameless temporary
        0 => machine.files.create_temp(descriptor, owner).is_ok(),

        // Close
        1 => {
            machine.files.close(descriptor);
            true
        }

        // Lookup: pop create flag and name descriptor
        2 => {
            let create = machine.exprs.pop_word()? != 0;
            let length = machine.exprs.pop_word()? as usize;
            let base = machine.exprs.pop_word()? as usize;
            let name = read_guest_string(machine, base, length);
            machine.files.lookup(descriptor, owner, &name, create).is_ok()
        }

        // Rename: pop name descriptor; the empty name marks the file
        // temporary
        3 => {
            let length = machine.exprs.pop_word()? as usize;
            let base = machine.exprs.pop_word()? as usize;
            let name = read_guest_string(machine, base, length);
            machine.files.rename(descriptor, &name).is_ok()
        }

        // SetRead / SetWrite / SetModify
        4 => machine.files.reopen(descriptor, true, false).is_ok(),
        5 => machine.files.reopen(descriptor, false, true).is_ok(),
        6 => machine.files.reopen(descriptor, true, true).is_ok(),

        // SetPos / GetPos: 32-bit absolute position
        8 => {
            let position = machine.exprs.pop_dword()?;
            machine.files.set_pos(descriptor, position).is_ok()
        }
        9 => match machine.files.get_pos(descriptor) {
            Ok(position) => {
                machine.exprs.push_dword(position)?;
                true
            }
            Err(_) => {
                machine.exprs.push_dword(0)?;
                false
            }
        },

        // ReadWord / WriteWord
        13 => match machine.files.read_word(descriptor) {
            Ok(word) => {
                machine.exprs.push_word(word)?;
                true
            }
            Err(_) => {
                machine.exprs.push_word(0)?;
                false
            }
        },
        14 => {
            let word = machine.exprs.pop_word()?;
            machine.files.write_word(descriptor, word).is_ok()
        }

        // ReadChar / WriteChar
        15 => match machine.files.read_char(descriptor) {
            Ok(byte) => {
                machine.exprs.push_word(byte as u16)?;
                true
            }
            Err(_) => {
                machine.exprs.push_word(0)?;
                false
            }
        },
        16 => {
            let byte = machine.exprs.pop_word()? as u8;
            machine.files.write_char(descriptor, byte).is_ok()
        }

        // sub-commands outside the emulated set fail softly
        _ => false,
    };

    machine.exprs.push_word(if ok { 0 } else { 1 })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mule_context::loader::{fix_extcalls, parse_objfile, SearchPaths};
    use mule_context::Machine;
    use mule_isa::opcode::Opcode;
    use mule_isa::ARENA_SIZE_IN_WORDS;
    use mule_object::utils::ObjectBuilder;
    use pretty_assertions::assert_eq;

    use crate::testing::{buffer_services, execute_program, machine_with_program, TEST_CLOCK};

    static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mule-svc-test.{}.{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn global(machine: &Machine, offset: usize) -> u16 {
        machine.arena.read_word(machine.modules[1].data_offset + offset)
    }

    #[test]
    fn test_svc_clock_writes_swapped_record() {
        let mut machine = machine_with_program(&[
            Opcode::LGA as u8,
            0,
            Opcode::SVC as u8,
            2,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        // the guest reads its memory big-endian, so the record is
        // stored byte-swapped
        assert_eq!(global(&machine, 0), TEST_CLOCK.packed_date().swap_bytes());
        assert_eq!(global(&machine, 1), TEST_CLOCK.packed_minutes().swap_bytes());
        assert_eq!(global(&machine, 2), 0);
    }

    #[test]
    fn test_svc_heap_release_all() {
        let mut machine = machine_with_program(&[
            // two allocations
            Opcode::LGA as u8,
            0,
            Opcode::LIB as u8,
            8,
            Opcode::LI0 as u8,
            Opcode::SVC as u8,
            0,
            Opcode::LGA as u8,
            1,
            Opcode::LIB as u8,
            4,
            Opcode::LI0 as u8,
            Opcode::SVC as u8,
            0,
            // global 2 := 0xffff, the release limit
            Opcode::LIW as u8,
            0xff,
            0xff,
            Opcode::SGW as u8,
            2,
            // SVC 0 mode 2: release everything this module owns
            Opcode::LGA as u8,
            2,
            Opcode::LI0 as u8,
            Opcode::LI2 as u8,
            Opcode::SVC as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_ne!(global(&machine, 0), 0);
        assert_ne!(global(&machine, 1), 0);
        assert_eq!(machine.heap.lower_bound(), ARENA_SIZE_IN_WORDS);
        assert!(machine.heap.check_invariants());
    }

    #[test]
    fn test_svc_file_operations() {
        // create a temporary, write a byte, rewind, read it back,
        // close. every step reports status 0.
        let mut machine = machine_with_program(&[
            // Create
            Opcode::LIB as u8,
            0x30,
            Opcode::LI0 as u8,
            Opcode::SVC as u8,
            3,
            Opcode::SGW as u8,
            0,
            // WriteChar 'Q'
            Opcode::LIB as u8,
            b'Q',
            Opcode::LIB as u8,
            0x30,
            Opcode::LIB as u8,
            16,
            Opcode::SVC as u8,
            3,
            Opcode::SGW as u8,
            1,
            // SetPos 0
            Opcode::LID as u8,
            0,
            0,
            0,
            0,
            Opcode::LIB as u8,
            0x30,
            Opcode::LIB as u8,
            8,
            Opcode::SVC as u8,
            3,
            Opcode::SGW as u8,
            2,
            // ReadChar: pushes the byte, status on top
            Opcode::LIB as u8,
            0x30,
            Opcode::LIB as u8,
            15,
            Opcode::SVC as u8,
            3,
            Opcode::SGW as u8,
            3,
            Opcode::SGW as u8,
            4,
            // Close
            Opcode::LIB as u8,
            0x30,
            Opcode::LI1 as u8,
            Opcode::SVC as u8,
            3,
            Opcode::SGW as u8,
            5,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), 0);
        assert_eq!(global(&machine, 1), 0);
        assert_eq!(global(&machine, 2), 0);
        assert_eq!(global(&machine, 3), 0);
        assert_eq!(global(&machine, 4), b'Q' as u16);
        assert_eq!(global(&machine, 5), 0);
        assert_eq!(machine.files.open_count(), 0);
    }

    #[test]
    fn test_svc_program_chains_and_returns() {
        let dir = test_dir();

        // the child program prints one character
        let child = ObjectBuilder::new()
            .module("Child", [9, 9, 9], 0, 4)
            .proc_entries(&[1])
            .code(
                0,
                &[
                    Opcode::NOP as u8,
                    Opcode::LI0 as u8,
                    Opcode::LI0 as u8,
                    Opcode::LIB as u8,
                    b'!',
                    Opcode::DCH as u8,
                    Opcode::RTN as u8,
                    0,
                ],
            )
            .build();
        std::fs::write(dir.join("CHILD.OBJ"), child).unwrap();

        // the parent carries the name "CHILD" in its data frame and
        // chains to it
        let parent = ObjectBuilder::new()
            .module("Parent", [1, 1, 1], 8, 5)
            .proc_entries(&[1])
            .code(
                0,
                &[
                    Opcode::NOP as u8,
                    Opcode::LGA as u8, // name base
                    0,
                    Opcode::LIB as u8, // name length
                    5,
                    Opcode::SVC as u8,
                    1,
                    Opcode::SGW as u8, // status
                    3,
                    Opcode::RTN as u8,
                ],
            )
            .data(0, &[0x4348, 0x494c, 0x4400]) // "CHILD"
            .build();

        let mut machine = Machine::new(SearchPaths::from_dirs(vec![dir]));
        parse_objfile(&mut machine, &parent, "Parent").unwrap();
        fix_extcalls(&mut machine, 1).unwrap();

        let saved_data_top = machine.data_top;
        let (mut services, terminal) = buffer_services();
        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(terminal.output(), "!");
        assert_eq!(global(&machine, 3), 0);

        // the chained program was unloaded again
        assert_eq!(machine.modules.len(), 2);
        assert_eq!(machine.data_top, saved_data_top);
        assert!(machine.heap.check_invariants());
    }

    #[test]
    fn test_svc_program_missing_file_reports_failure() {
        let parent = ObjectBuilder::new()
            .module("Parent", [1, 1, 1], 8, 5)
            .proc_entries(&[1])
            .code(
                0,
                &[
                    Opcode::NOP as u8,
                    Opcode::LGA as u8,
                    0,
                    Opcode::LIB as u8,
                    4,
                    Opcode::SVC as u8,
                    1,
                    Opcode::SGW as u8,
                    3,
                    Opcode::RTN as u8,
                ],
            )
            .data(0, &[0x4e4f, 0x5045]) // "NOPE"
            .build();

        let mut machine = Machine::new(SearchPaths::from_dirs(Vec::new()));
        parse_objfile(&mut machine, &parent, "Parent").unwrap();
        fix_extcalls(&mut machine, 1).unwrap();

        let (mut services, _) = buffer_services();
        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 3), 1);
        assert_eq!(machine.modules.len(), 2);
    }
}
