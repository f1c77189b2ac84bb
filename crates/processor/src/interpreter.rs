// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_context::{loader, Machine};
use mule_isa::{opcode::Opcode, GenericError};

use crate::handler::{self, HandlerFn};
use crate::{Fault, ProcessorError, Services};

/// The fetch-decode-execute engine: a 256-entry function table
/// indexed by the opcode byte. Undefined opcodes fall into the
/// invalid-opcode trap; the halt-on-use opcodes (TRA, MOVF, LXFW,
/// SXFW, DDT, REPL, BBLT) abort with their own diagnostic.
pub struct Interpreter {
    handlers: [HandlerFn; 256],
}

impl Interpreter {
    pub fn new() -> Self {
        let mut handlers: [HandlerFn; 256] = [handler::invalid_opcode; 256];

        // immediate values and addresses
        for opcode in Opcode::LI0 as usize..=Opcode::LI15 as usize {
            handlers[opcode] = handler::immediate::load_immediate_short;
        }
        handlers[Opcode::LIB as usize] = handler::immediate::load_immediate_byte;
        handlers[Opcode::LIW as usize] = handler::immediate::load_immediate_word;
        handlers[Opcode::LID as usize] = handler::immediate::load_immediate_double;
        handlers[Opcode::LLA as usize] = handler::immediate::load_local_address;
        handlers[Opcode::LGA as usize] = handler::immediate::load_global_address;
        handlers[Opcode::LSA as usize] = handler::immediate::load_stack_address;
        handlers[Opcode::LEA as usize] = handler::immediate::load_external_address;
        handlers[Opcode::LSTA as usize] = handler::immediate::load_string_address;

        // jumps
        handlers[Opcode::JPC as usize] = handler::jumps::jump_conditional;
        handlers[Opcode::JP as usize] = handler::jumps::jump;
        handlers[Opcode::JPFC as usize] = handler::jumps::jump_forward_conditional;
        handlers[Opcode::JPF as usize] = handler::jumps::jump_forward;
        handlers[Opcode::JPBC as usize] = handler::jumps::jump_backward_conditional;
        handlers[Opcode::JPB as usize] = handler::jumps::jump_backward;
        handlers[Opcode::ORJP as usize] = handler::jumps::or_jump;
        handlers[Opcode::ANDJP as usize] = handler::jumps::and_jump;

        // local, external and global frame access
        handlers[Opcode::LLW as usize] = handler::local_global::load_local_word;
        handlers[Opcode::LLD as usize] = handler::local_global::load_local_double;
        handlers[Opcode::LEW as usize] = handler::local_global::load_external_word;
        handlers[Opcode::LED as usize] = handler::local_global::load_external_double;
        for opcode in Opcode::LLW4 as usize..=Opcode::LLW15 as usize {
            handlers[opcode] = handler::local_global::load_local_word_short;
        }
        handlers[Opcode::SLW as usize] = handler::local_global::store_local_word;
        handlers[Opcode::SLD as usize] = handler::local_global::store_local_double;
        handlers[Opcode::SEW as usize] = handler::local_global::store_external_word;
        handlers[Opcode::SED as usize] = handler::local_global::store_external_double;
        for opcode in Opcode::SLW4 as usize..=Opcode::SLW15 as usize {
            handlers[opcode] = handler::local_global::store_local_word_short;
        }
        handlers[Opcode::LGW as usize] = handler::local_global::load_global_word;
        handlers[Opcode::LGD as usize] = handler::local_global::load_global_double;
        for opcode in Opcode::LGW2 as usize..=Opcode::LGW15 as usize {
            handlers[opcode] = handler::local_global::load_global_word_short;
        }
        handlers[Opcode::SGW as usize] = handler::local_global::store_global_word;
        handlers[Opcode::SGD as usize] = handler::local_global::store_global_double;
        for opcode in Opcode::SGW2 as usize..=Opcode::SGW15 as usize {
            handlers[opcode] = handler::local_global::store_global_word_short;
        }

        // stack-indexed access
        for opcode in Opcode::LSW0 as usize..=Opcode::LSW15 as usize {
            handlers[opcode] = handler::indexed::load_stack_word_short;
        }
        for opcode in Opcode::SSW0 as usize..=Opcode::SSW15 as usize {
            handlers[opcode] = handler::indexed::store_stack_word_short;
        }
        handlers[Opcode::LSW as usize] = handler::indexed::load_stack_word;
        handlers[Opcode::LSD as usize] = handler::indexed::load_stack_double;
        handlers[Opcode::LSD0 as usize] = handler::indexed::load_stack_double0;
        handlers[Opcode::LXFW as usize] = handler::unimplemented_opcode;
        handlers[Opcode::LXB as usize] = handler::indexed::load_indexed_byte;
        handlers[Opcode::LXW as usize] = handler::indexed::load_indexed_word;
        handlers[Opcode::LXD as usize] = handler::indexed::load_indexed_double;
        handlers[Opcode::SSW as usize] = handler::indexed::store_stack_word;
        handlers[Opcode::SSD as usize] = handler::indexed::store_stack_double;
        handlers[Opcode::SSD0 as usize] = handler::indexed::store_stack_double0;
        handlers[Opcode::SXFW as usize] = handler::unimplemented_opcode;
        handlers[Opcode::TS as usize] = handler::indexed::test_and_set;
        handlers[Opcode::SXB as usize] = handler::indexed::store_indexed_byte;
        handlers[Opcode::SXW as usize] = handler::indexed::store_indexed_word;
        handlers[Opcode::SXD as usize] = handler::indexed::store_indexed_double;

        // doubleword arithmetic
        handlers[Opcode::DADD as usize] = handler::double::double_add;
        handlers[Opcode::DSUB as usize] = handler::double::double_sub;
        handlers[Opcode::DMUL as usize] = handler::double::double_mul;
        handlers[Opcode::DDIV as usize] = handler::double::double_div;
        handlers[Opcode::DSHL as usize] = handler::double::double_shift_left;
        handlers[Opcode::DSHR as usize] = handler::double::double_shift_right;

        // floating point
        handlers[Opcode::FADD as usize] = handler::float::float_add;
        handlers[Opcode::FSUB as usize] = handler::float::float_sub;
        handlers[Opcode::FMUL as usize] = handler::float::float_mul;
        handlers[Opcode::FDIV as usize] = handler::float::float_div;
        handlers[Opcode::FCMP as usize] = handler::float::float_compare;
        handlers[Opcode::FABS as usize] = handler::float::float_abs;
        handlers[Opcode::FNEG as usize] = handler::float::float_neg;
        handlers[Opcode::FFCT as usize] = handler::float::float_function;

        // channels, checks, supervisor
        handlers[Opcode::READ as usize] = handler::io::read_channel;
        handlers[Opcode::WRITE as usize] = handler::io::write_channel;
        handlers[Opcode::DSKR as usize] = handler::io::no_disk;
        handlers[Opcode::DSKW as usize] = handler::io::no_disk;
        handlers[Opcode::SETRK as usize] = handler::io::no_disk;
        handlers[Opcode::UCHK as usize] = handler::checks::unsigned_check;
        handlers[Opcode::SVC as usize] = crate::svc::svc;
        handlers[Opcode::SYS as usize] = crate::svc::sys;

        // priority, unsigned comparison, string input
        handlers[Opcode::ENTP as usize] = handler::calling::enter_priority;
        handlers[Opcode::EXP as usize] = handler::calling::exit_priority;
        handlers[Opcode::ULSS as usize] = handler::compare::unsigned_less;
        handlers[Opcode::ULEQ as usize] = handler::compare::unsigned_less_equal;
        handlers[Opcode::UGTR as usize] = handler::compare::unsigned_greater;
        handlers[Opcode::UGEQ as usize] = handler::compare::unsigned_greater_equal;
        handlers[Opcode::TRA as usize] = handler::unimplemented_opcode;
        handlers[Opcode::RDS as usize] = handler::io::read_string;

        // expression-stack spill machinery
        handlers[Opcode::STORE as usize] = handler::spill::store;
        handlers[Opcode::LODFW as usize] = handler::spill::load_result_word;
        handlers[Opcode::LODFD as usize] = handler::spill::load_result_double;
        handlers[Opcode::STOT as usize] = handler::spill::store_top;
        handlers[Opcode::STOFV as usize] = handler::spill::store_formal;
        handlers[Opcode::COPT as usize] = handler::spill::copy_top;
        handlers[Opcode::DECS as usize] = handler::spill::drop_top;
        handlers[Opcode::PCOP as usize] = handler::spill::copy_parameter;

        // 16-bit arithmetic and shifts
        handlers[Opcode::UADD as usize] = handler::integer::unsigned_add;
        handlers[Opcode::USUB as usize] = handler::integer::unsigned_sub;
        handlers[Opcode::UMUL as usize] = handler::integer::unsigned_mul;
        handlers[Opcode::UDIV as usize] = handler::integer::unsigned_div;
        handlers[Opcode::UMOD as usize] = handler::integer::unsigned_mod;
        handlers[Opcode::ROR as usize] = handler::integer::rotate_right;
        handlers[Opcode::SHL as usize] = handler::integer::shift_left;
        handlers[Opcode::SHR as usize] = handler::integer::shift_right;
        handlers[Opcode::IADD as usize] = handler::integer::signed_add;
        handlers[Opcode::ISUB as usize] = handler::integer::signed_sub;
        handlers[Opcode::IMUL as usize] = handler::integer::signed_mul;
        handlers[Opcode::IDIV as usize] = handler::integer::signed_div;
        handlers[Opcode::IMOD as usize] = handler::integer::signed_mod;

        // FOR and CASE control, explicit traps and range checks
        handlers[Opcode::FOR1 as usize] = handler::control::for_enter;
        handlers[Opcode::FOR2 as usize] = handler::control::for_step;
        handlers[Opcode::ENTC as usize] = handler::control::case_enter;
        handlers[Opcode::EXC as usize] = handler::control::case_exit;
        handlers[Opcode::TRAP as usize] = handler::checks::explicit_trap;
        handlers[Opcode::CHK as usize] = handler::checks::signed_check;
        handlers[Opcode::CHKZ as usize] = handler::checks::zero_check;
        handlers[Opcode::CHKS as usize] = handler::checks::sign_check;

        // comparison and sign operations
        handlers[Opcode::EQL as usize] = handler::compare::equal;
        handlers[Opcode::NEQ as usize] = handler::compare::not_equal;
        handlers[Opcode::LSS as usize] = handler::compare::less;
        handlers[Opcode::LEQ as usize] = handler::compare::less_equal;
        handlers[Opcode::GTR as usize] = handler::compare::greater;
        handlers[Opcode::GEQ as usize] = handler::compare::greater_equal;
        handlers[Opcode::ABS as usize] = handler::compare::absolute;
        handlers[Opcode::NEG as usize] = handler::compare::negate;

        // bitwise and set operations
        handlers[Opcode::OR as usize] = handler::bitwise::or;
        handlers[Opcode::XOR as usize] = handler::bitwise::xor;
        handlers[Opcode::AND as usize] = handler::bitwise::and;
        handlers[Opcode::COM as usize] = handler::bitwise::complement;
        handlers[Opcode::IN as usize] = handler::bitwise::set_in;
        handlers[Opcode::LIN as usize] = handler::bitwise::set_in_immediate;
        handlers[Opcode::MSK as usize] = handler::bitwise::mask;
        handlers[Opcode::NOT as usize] = handler::bitwise::not;
        handlers[Opcode::BIT as usize] = handler::bitwise::bit;

        handlers[Opcode::NOP as usize] = handler::control::nop;
        handlers[Opcode::MOVF as usize] = handler::unimplemented_opcode;

        // block operations and the character primitives
        handlers[Opcode::MOV as usize] = handler::block::move_words;
        handlers[Opcode::CMP as usize] = handler::block::compare_blocks;
        handlers[Opcode::DDT as usize] = handler::unimplemented_opcode;
        handlers[Opcode::REPL as usize] = handler::unimplemented_opcode;
        handlers[Opcode::BBLT as usize] = handler::unimplemented_opcode;
        handlers[Opcode::DCH as usize] = handler::io::display_char;
        handlers[Opcode::UNPK as usize] = handler::bitwise::unpack;
        handlers[Opcode::PACK as usize] = handler::bitwise::pack;

        // procedure calls
        handlers[Opcode::GB as usize] = handler::calling::static_chain;
        handlers[Opcode::GB1 as usize] = handler::calling::static_chain_one;
        handlers[Opcode::ALLOC as usize] = handler::calling::alloc_stack;
        handlers[Opcode::ENTR as usize] = handler::calling::enter_frame;
        handlers[Opcode::RTN as usize] = handler::calling::return_from_procedure;
        handlers[Opcode::CLX as usize] = handler::calling::call_external;
        handlers[Opcode::CLI as usize] = handler::calling::call_intermediate;
        handlers[Opcode::CLF as usize] = handler::calling::call_formal;
        handlers[Opcode::CLL as usize] = handler::calling::call_local;
        for opcode in Opcode::CLL1 as usize..=Opcode::CLL15 as usize {
            handlers[opcode] = handler::calling::call_local_short;
        }

        Self { handlers }
    }

    fn locate(&self, machine: &Machine, fault: Fault, pc: usize) -> ProcessorError {
        ProcessorError::new(
            fault,
            machine.current_module().name.clone(),
            pc,
            machine.regs.ir,
        )
    }

    /// Runs module `exec_module` from its initialization procedure
    /// until the matching return.
    ///
    /// A sentinel frame whose saved PC is 0 is pushed below the
    /// program; returning through it brings PC to 0, which ends the
    /// loop. The caller is responsible for unloading afterwards.
    pub fn execute(
        &self,
        machine: &mut Machine,
        services: &mut Services,
        exec_module: usize,
    ) -> Result<(), ProcessorError> {
        machine.set_module(exec_module);

        let entry = machine.modules[exec_module].procs.first().copied().unwrap_or(0);
        if entry == 0 {
            return Err(self.locate(
                machine,
                Fault::UnresolvedProcedure {
                    module_index: exec_module,
                    proc_index: 0,
                },
                0,
            ));
        }

        machine.regs.s = machine.data_top;
        machine.regs.pc = 0;
        machine
            .push_frame(exec_module as u16, 0)
            .map_err(|trap| self.locate(machine, trap.into(), 0))?;
        machine.regs.pc = entry as usize;

        loop {
            // a device interrupt would be dispatched here; nothing
            // raises one on this machine
            if machine.regs.req {
                machine.regs.req = false;
            }

            let pc = machine.regs.pc;
            let opcode = match machine.fetch_byte() {
                Ok(byte) => byte,
                Err(trap) => return Err(self.locate(machine, trap.into(), pc)),
            };
            machine.regs.ir = opcode;

            if machine.trace {
                eprintln!(
                    "mule: {:>3}.{:05o}  {:03o}",
                    machine.regs.modn, pc, opcode
                );
            }

            let handler = self.handlers[opcode as usize];
            if let Err(fault) = handler(self, machine, services) {
                return Err(self.locate(machine, fault, pc));
            }

            if machine.regs.pc == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads the program named on the command line, runs it, and unloads
/// everything it brought in.
pub fn run_program(
    interpreter: &Interpreter,
    machine: &mut Machine,
    services: &mut Services,
    file_name: &str,
) -> Result<(), GenericError> {
    let marker = loader::load_initfile(machine, file_name, "SYS")?;
    if machine.verbose {
        loader::print_module_table(machine);
    }
    let result = interpreter.execute(machine, services, marker);
    machine.unload_to(marker);
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mule_context::loader::{fix_extcalls, parse_objfile, SearchPaths};
    use mule_context::Machine;
    use mule_isa::opcode::Opcode;
    use mule_isa::Trap;
    use mule_object::utils::ObjectBuilder;
    use pretty_assertions::assert_eq;

    use crate::testing::{buffer_services, build_test_machine, execute_program, machine_with_program};
    use crate::Fault;

    fn global(machine: &Machine, offset: usize) -> u16 {
        machine.arena.read_word(machine.modules[1].data_offset + offset)
    }

    #[test]
    fn test_hello_terminal() {
        // proc 0 emits "Hi" and returns; DCH takes the character and
        // the two position words the bitmap display used
        let mut machine = machine_with_program(&[
            Opcode::LI0 as u8,
            Opcode::LI0 as u8,
            Opcode::LIB as u8,
            b'H',
            Opcode::DCH as u8,
            Opcode::LI0 as u8,
            Opcode::LI0 as u8,
            Opcode::LIB as u8,
            b'i',
            Opcode::DCH as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, terminal) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(terminal.output(), "Hi");
        assert_eq!(machine.regs.pc, 0);
        assert!(machine.exprs.is_empty());

        // the sentinel frame was popped
        assert_eq!(machine.regs.s, machine.data_top);
    }

    #[test]
    fn test_small_integer_arithmetic() {
        // 15 + 15 = 30, stored in global 0
        let mut machine = machine_with_program(&[
            Opcode::LI15 as u8,
            Opcode::LI15 as u8,
            Opcode::IADD as u8,
            Opcode::SGW as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 30);
    }

    #[test]
    fn test_integer_overflow_traps() {
        // 0x7fff + 1 leaves the INTEGER range
        let mut machine = machine_with_program(&[
            Opcode::LIW as u8,
            0x7f,
            0xff,
            Opcode::LI1 as u8,
            Opcode::IADD as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::Trap(Trap::IntegerArithmetic)));
        assert_eq!(error.module, "Test");
    }

    #[test]
    fn test_unsigned_overflow_traps() {
        // 0xffff + 1 carries out of the word
        let mut machine = machine_with_program(&[
            Opcode::LIW as u8,
            0xff,
            0xff,
            Opcode::LI1 as u8,
            Opcode::UADD as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::Trap(Trap::IntegerArithmetic)));
    }

    #[test]
    fn test_heap_round_trip() {
        // allocate 10 words, plant a sentinel, free, allocate 10
        // again: the second block reuses the first address
        let mut machine = machine_with_program(&[
            // SVC 0 mode 0: DSH[G+0] := allocate(10)
            Opcode::LGA as u8,
            0,
            Opcode::LIB as u8,
            10,
            Opcode::LI0 as u8,
            Opcode::SVC as u8,
            0,
            // DSH[a+3] := 0xBEEF
            Opcode::LGW as u8,
            0,
            Opcode::LSA as u8,
            3,
            Opcode::LIW as u8,
            0xbe,
            0xef,
            Opcode::SSW0 as u8,
            // SVC 0 mode 1: free(DSH[G+0])
            Opcode::LGA as u8,
            0,
            Opcode::LI0 as u8,
            Opcode::LI1 as u8,
            Opcode::SVC as u8,
            0,
            // SVC 0 mode 0: DSH[G+1] := allocate(10)
            Opcode::LGA as u8,
            1,
            Opcode::LIB as u8,
            10,
            Opcode::LI0 as u8,
            Opcode::SVC as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        let first = global(&machine, 0);
        let second = global(&machine, 1);
        assert_eq!(first, second);
        assert!(machine.heap.check_invariants());
    }

    #[test]
    fn test_cross_module_call() {
        // MAIN calls LIB.0 through CLX; LIB.0 pushes 42 and returns
        let main_image = ObjectBuilder::new()
            .module("Main", [1, 1, 1], 4, 4)
            .imports(&[("Lib", [2, 2, 2])])
            .proc_entries(&[1])
            .code(
                0,
                &[
                    Opcode::NOP as u8,
                    Opcode::CLX as u8,
                    1, // import slot, fixed up to Lib's index
                    0,
                    Opcode::SGW as u8,
                    0,
                    Opcode::RTN as u8,
                    0,
                ],
            )
            .fixups(&[2])
            .build();
        let lib_image = ObjectBuilder::new()
            .module("Lib", [2, 2, 2], 0, 2)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::LIB as u8, 42, Opcode::RTN as u8])
            .build();

        let mut machine = Machine::new(SearchPaths::from_dirs(Vec::new()));
        parse_objfile(&mut machine, &main_image, "Main").unwrap();
        parse_objfile(&mut machine, &lib_image, "Lib").unwrap();
        fix_extcalls(&mut machine, 1).unwrap();

        let (mut services, _) = buffer_services();
        execute_program(&mut machine, &mut services).unwrap();

        // the callee's result came back across the module switch
        assert_eq!(global(&machine, 0), 42);

        // execution ended back in Main with the frame popped
        assert_eq!(machine.regs.modn, 1);
        assert_eq!(machine.regs.s, machine.data_top);
        assert!(machine.exprs.is_empty());
    }

    #[test]
    fn test_call_of_unresolved_procedure_faults() {
        // Lib exports only procedure 0; calling procedure 3 hits a
        // zero entry in the table
        let main_image = ObjectBuilder::new()
            .module("Main", [1, 1, 1], 0, 3)
            .imports(&[("Lib", [2, 2, 2])])
            .proc_entries(&[1])
            .code(
                0,
                &[
                    Opcode::NOP as u8,
                    Opcode::CLX as u8,
                    1,
                    3,
                    Opcode::RTN as u8,
                    0,
                ],
            )
            .fixups(&[2])
            .build();
        let lib_image = ObjectBuilder::new()
            .module("Lib", [2, 2, 2], 0, 2)
            .proc_entries(&[1, 0, 0, 0])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8, 0, 0])
            .build();

        let mut machine = Machine::new(SearchPaths::from_dirs(Vec::new()));
        parse_objfile(&mut machine, &main_image, "Main").unwrap();
        parse_objfile(&mut machine, &lib_image, "Lib").unwrap();
        fix_extcalls(&mut machine, 1).unwrap();

        let (mut services, _) = buffer_services();
        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(
            error.fault,
            Fault::UnresolvedProcedure {
                module_index: 2,
                proc_index: 3
            }
        ));
    }

    #[test]
    fn test_for_loop_accumulates() {
        // FOR i := 1 TO 10 DO acc := acc + i END with the control
        // variable in global 1 and the accumulator in global 0
        let mut machine = machine_with_program(&[
            Opcode::LGA as u8, // 1: push address of global 1
            1,
            Opcode::LI1 as u8, // 3: low bound
            Opcode::LIB as u8, // 4: high bound 10
            10,
            Opcode::FOR1 as u8, // 6: upward, skip 11 bytes when empty
            0,
            0,
            11,
            Opcode::LGW as u8, // 10: acc
            0,
            Opcode::LGW as u8, // 12: i
            1,
            Opcode::IADD as u8, // 14
            Opcode::SGW as u8, // 15
            0,
            Opcode::FOR2 as u8, // 17: step +1, back edge 11 bytes
            1,
            0,
            11,
            Opcode::RTN as u8, // 21
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        // 1+2+..+10
        assert_eq!(global(&machine, 0), 55);
        assert_eq!(global(&machine, 1), 10);

        // the two FOR control words were discarded
        assert_eq!(machine.regs.s, machine.data_top);
    }

    #[test]
    fn test_for_loop_without_iterations_is_skipped() {
        // FOR i := 5 TO 1 runs the body zero times
        let mut machine = machine_with_program(&[
            Opcode::LGA as u8,
            1,
            Opcode::LI5 as u8,
            Opcode::LI1 as u8,
            Opcode::FOR1 as u8,
            0,
            0,
            8,
            // body would store 99
            Opcode::LIB as u8,
            99,
            Opcode::SGW as u8,
            0,
            Opcode::FOR2 as u8,
            1,
            0,
            8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 0);
    }

    #[test]
    fn test_local_call_and_static_chain() {
        // proc 1 reads the static link of its frame: the caller's L,
        // which is the sentinel frame at DATA_TOP
        let mut machine = build_test_machine(
            16,
            &[1, 3],
            &[
                Opcode::NOP as u8,
                Opcode::CLL1 as u8,
                Opcode::RTN as u8,
                Opcode::GB1 as u8, // 3: proc 1
                Opcode::SGW as u8,
                0,
                Opcode::RTN as u8,
            ],
        );
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0) as usize, machine.data_top);
    }

    #[test]
    fn test_local_call_returns_value() {
        let mut machine = build_test_machine(
            16,
            &[1, 5],
            &[
                Opcode::NOP as u8,
                Opcode::CLL1 as u8, // 1
                Opcode::SGW as u8, // 2: store the result
                0,
                Opcode::RTN as u8, // 4
                Opcode::LIB as u8, // 5: proc 1 pushes 7
                7,
                Opcode::RTN as u8,
            ],
        );
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 7);
    }

    #[test]
    fn test_store_lodfw_preserves_operands() {
        // three live operands survive a spill/restore bracket, with
        // the "call result" appearing on top
        let mut machine = machine_with_program(&[
            Opcode::LI1 as u8,
            Opcode::LI2 as u8,
            Opcode::LI3 as u8,
            Opcode::STORE as u8,
            Opcode::LIB as u8, // what a callee would leave behind
            9,
            Opcode::LODFW as u8,
            Opcode::SGW as u8, // result
            3,
            Opcode::SGW as u8, // restored operands, top first
            2,
            Opcode::SGW as u8,
            1,
            Opcode::SGW as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), 1);
        assert_eq!(global(&machine, 1), 2);
        assert_eq!(global(&machine, 2), 3);
        assert_eq!(global(&machine, 3), 9);
        assert!(machine.exprs.is_empty());
    }

    #[test]
    fn test_case_dispatch() {
        // CASE 2 OF 1: g0 := 10 | 2: g0 := 20 END, table after the
        // bodies, entries are absolute byte addresses
        let mut machine = machine_with_program(&[
            Opcode::LIB as u8, // 1
            2,
            Opcode::ENTC as u8, // 3: table at 6+10 = 16
            0,
            10,
            Opcode::LIB as u8, // 6: body for selector 1
            10,
            Opcode::SGW as u8,
            0,
            Opcode::EXC as u8, // 10
            Opcode::LIB as u8, // 11: body for selector 2
            20,
            Opcode::SGW as u8,
            0,
            Opcode::EXC as u8, // 15
            0, // 16: table: low = 1
            1,
            0, // 18: high = 2
            2,
            0, // 20: entry for 1 -> 6
            6,
            0, // 22: entry for 2 -> 11
            11,
            0, // 24: default -> 26 (empty)
            26,
            Opcode::RTN as u8, // 26
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 20);
        assert_eq!(machine.regs.s, machine.data_top);
    }

    #[test]
    fn test_conditional_jump_forward() {
        // a FALSE condition takes the jump
        let mut machine = machine_with_program(&[
            Opcode::LI0 as u8, // 1
            Opcode::JPFC as u8, // 2: to 9
            5,
            Opcode::LIB as u8, // 4: skipped
            99,
            Opcode::SGW as u8,
            0,
            Opcode::RTN as u8, // 8
            Opcode::LIB as u8, // 9
            7,
            Opcode::SGW as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 7);
    }

    #[test]
    fn test_float_bias_through_opcodes() {
        // 3 * 5 = 15 computed in REAL, converted back to INTEGER
        let mut machine = machine_with_program(&[
            Opcode::LIB as u8,
            3,
            Opcode::FFCT as u8,
            0,
            Opcode::LIB as u8,
            5,
            Opcode::FFCT as u8,
            0,
            Opcode::FMUL as u8,
            Opcode::FFCT as u8,
            1,
            Opcode::SGW as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();
        assert_eq!(global(&machine, 0), 15);
    }

    #[test]
    fn test_explicit_trap() {
        let mut machine = machine_with_program(&[
            Opcode::LIB as u8,
            14,
            Opcode::TRAP as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::ExplicitTrap { number: 14 }));
    }

    #[test]
    fn test_invalid_opcode_traps() {
        // 0o021 is a hole in the instruction set
        let mut machine = machine_with_program(&[0o021]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::Trap(Trap::InvalidOpcode)));
    }

    #[test]
    fn test_halt_on_use_opcode() {
        let mut machine = machine_with_program(&[Opcode::TRA as u8]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::Unimplemented));
        assert_eq!(error.opcode, Opcode::TRA as u8);
    }

    #[test]
    fn test_running_off_the_code_frame_traps() {
        // no RTN: PC runs past the end of the frame
        let mut machine = machine_with_program(&[Opcode::LI1 as u8, Opcode::DECS as u8]);
        let (mut services, _) = buffer_services();

        let error = execute_program(&mut machine, &mut services).unwrap_err();
        assert!(matches!(error.fault, Fault::Trap(Trap::CodeOverflow)));
    }

    #[test]
    fn test_read_string_from_keyboard() {
        let mut machine = machine_with_program(&[
            Opcode::LGA as u8,
            0,
            Opcode::RDS as u8,
            5,
            Opcode::RTN as u8,
        ]);
        let (mut services, terminal) = buffer_services();
        terminal.queue_keys("OK\r");

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), b'O' as u16);
        assert_eq!(global(&machine, 1), b'K' as u16);
        assert_eq!(global(&machine, 2), 0);
    }

    #[test]
    fn test_keyboard_channels() {
        // READ(1) twice: pending, then still pending (the flag does
        // not consume); READ(2) takes the key; READ(1) again: none
        let mut machine = machine_with_program(&[
            Opcode::LI1 as u8,
            Opcode::LGA as u8,
            0,
            Opcode::READ as u8,
            Opcode::LI2 as u8,
            Opcode::LGA as u8,
            1,
            Opcode::READ as u8,
            Opcode::LI1 as u8,
            Opcode::LGA as u8,
            2,
            Opcode::READ as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, terminal) = buffer_services();
        terminal.queue_keys("x");

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), 1);
        assert_eq!(global(&machine, 1), b'x' as u16);
        assert_eq!(global(&machine, 2), 0);
    }

    #[test]
    fn test_bit_and_set_operations() {
        let mut machine = machine_with_program(&[
            // BIT: 1 << 5
            Opcode::LIB as u8,
            5,
            Opcode::BIT as u8,
            Opcode::SGW as u8,
            0,
            // IN: bit 3 of the set {3}
            Opcode::LI3 as u8,
            Opcode::LIB as u8,
            8,
            Opcode::IN as u8,
            Opcode::SGW as u8,
            1,
            // MSK below and above the word width
            Opcode::LI4 as u8,
            Opcode::MSK as u8,
            Opcode::SGW as u8,
            2,
            Opcode::LIB as u8,
            20,
            Opcode::MSK as u8,
            Opcode::SGW as u8,
            3,
            // ROR: 1 rotated right once
            Opcode::LI1 as u8,
            Opcode::LI1 as u8,
            Opcode::ROR as u8,
            Opcode::SGW as u8,
            4,
            // SHL at the edge and past it
            Opcode::LI1 as u8,
            Opcode::LIB as u8,
            15,
            Opcode::SHL as u8,
            Opcode::SGW as u8,
            5,
            Opcode::LI1 as u8,
            Opcode::LIB as u8,
            16,
            Opcode::SHL as u8,
            Opcode::SGW as u8,
            6,
            // UNPK: bits 4..11 of 0xabcd
            Opcode::LIW as u8,
            0xab,
            0xcd,
            Opcode::LI4 as u8,
            Opcode::LIB as u8,
            8,
            Opcode::UNPK as u8,
            Opcode::SGW as u8,
            7,
            // PACK: clear bits 4..7 of global 8
            Opcode::LIW as u8,
            0xff,
            0xff,
            Opcode::SGW as u8,
            8,
            Opcode::LGA as u8,
            8,
            Opcode::LI4 as u8,
            Opcode::LI4 as u8,
            Opcode::LI0 as u8,
            Opcode::PACK as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), 0x0020);
        assert_eq!(global(&machine, 1), 1);
        assert_eq!(global(&machine, 2), 0x000f);
        // the historical out-of-range MSK: 0xffff << (20-16)
        assert_eq!(global(&machine, 3), 0xfff0);
        assert_eq!(global(&machine, 4), 0x8000);
        assert_eq!(global(&machine, 5), 0x8000);
        assert_eq!(global(&machine, 6), 0);
        assert_eq!(global(&machine, 7), 0x00bc);
        assert_eq!(global(&machine, 8), 0xff0f);
    }

    #[test]
    fn test_byte_indexing_sees_high_byte_first() {
        let mut machine = machine_with_program(&[
            // global 9 := 0x4142, "AB" in guest byte order
            Opcode::LIW as u8,
            0x41,
            0x42,
            Opcode::SGW as u8,
            9,
            // byte 0 is the high byte
            Opcode::LGA as u8,
            9,
            Opcode::LI0 as u8,
            Opcode::LXB as u8,
            Opcode::SGW as u8,
            10,
            // store 'Z' into byte 1
            Opcode::LGA as u8,
            9,
            Opcode::LI1 as u8,
            Opcode::LIB as u8,
            0x5a,
            Opcode::SXB as u8,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 10), 0x41);
        assert_eq!(global(&machine, 9), 0x415a);
    }

    #[test]
    fn test_doubleword_arithmetic_and_store() {
        // 0x00010000 + 0x0000ffff, stored as a little-endian word
        // pair in the data frame
        let mut machine = machine_with_program(&[
            Opcode::LID as u8,
            0x00,
            0x01,
            0x00,
            0x00,
            Opcode::LID as u8,
            0x00,
            0x00,
            0xff,
            0xff,
            Opcode::DADD as u8,
            Opcode::SGD as u8,
            0,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 0), 0xffff);
        assert_eq!(global(&machine, 1), 0x0001);
    }

    #[test]
    fn test_test_and_set() {
        let mut machine = machine_with_program(&[
            Opcode::LI5 as u8,
            Opcode::SGW as u8,
            11,
            Opcode::LGA as u8,
            11,
            Opcode::TS as u8,
            Opcode::SGW as u8,
            12,
            Opcode::RTN as u8,
        ]);
        let (mut services, _) = buffer_services();

        execute_program(&mut machine, &mut services).unwrap();

        assert_eq!(global(&machine, 12), 5);
        assert_eq!(global(&machine, 11), 1);
    }
}
