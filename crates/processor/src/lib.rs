// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use std::fmt::Display;

use mule_allocator::HeapError;
use mule_isa::Trap;
use mule_memory::MemoryError;

pub mod clock;
pub mod handler;
pub mod interpreter;
pub mod svc;
pub mod terminal;
pub mod testing;

pub use interpreter::Interpreter;

use clock::Clock;
use terminal::Terminal;

/// The host collaborators guest code reaches through opcodes and
/// supervisor calls: the terminal surface and the wall clock.
/// (Host files live in the machine's file table, because they follow
/// module lifetimes.)
pub struct Services {
    pub terminal: Box<dyn Terminal>,
    pub clock: Box<dyn Clock>,

    /// One key of lookahead: READ(1) reports a key pending without
    /// consuming it, READ(2) consumes it.
    pub pending_key: Option<u16>,
}

impl Services {
    pub fn new(terminal: Box<dyn Terminal>, clock: Box<dyn Clock>) -> Self {
        Self {
            terminal,
            clock,
            pending_key: None,
        }
    }

    /// The buffered key, fetching from the terminal when the buffer
    /// is empty. Does not consume.
    pub fn key_pending(&mut self) -> bool {
        if self.pending_key.is_none() {
            let key = self.terminal.poll_key();
            if key != 0 {
                self.pending_key = Some(key);
            }
        }
        self.pending_key.is_some()
    }

    /// Consumes the buffered key, or polls once. 0 when no key is
    /// available.
    pub fn take_key(&mut self) -> u16 {
        match self.pending_key.take() {
            Some(key) => key,
            None => self.terminal.poll_key(),
        }
    }
}

/// What an opcode handler can fail with. The fetch loop attaches the
/// faulting location and turns it into a `ProcessorError`.
#[derive(Debug)]
pub enum Fault {
    /// A guest-visible trap (the numbered set).
    Trap(Trap),

    /// The TRAP opcode with an arbitrary guest-chosen number.
    ExplicitTrap { number: u16 },

    /// An opcode that is in the instruction set but halts on use
    /// (TRA, MOVF, LXFW, SXFW, DDT, REPL, BBLT).
    Unimplemented,

    /// CLX/CLF with a module operand outside the module table.
    BadModuleIndex { index: usize },

    /// A call to a procedure whose entry was never resolved.
    UnresolvedProcedure { module_index: usize, proc_index: usize },

    /// Expression stack over/underflow: the instruction stream is
    /// corrupted.
    CorruptExprStack,

    /// SVC with an unknown sub-code or argument.
    UnknownSvc { code: u8 },

    /// SYS sub-codes are reserved; none is recognized.
    UnknownSys { code: u8 },

    /// Allocator failure behind SVC 0.
    Heap(HeapError),

    /// A fault inside a program chained through SVC 1; already
    /// located.
    Nested(Box<ProcessorError>),
}

impl From<Trap> for Fault {
    fn from(trap: Trap) -> Self {
        Fault::Trap(trap)
    }
}

impl From<MemoryError> for Fault {
    fn from(_: MemoryError) -> Self {
        Fault::CorruptExprStack
    }
}

impl From<HeapError> for Fault {
    fn from(source: HeapError) -> Self {
        Fault::Heap(source)
    }
}

/// A fault bound to its location: the module, the PC of the opcode,
/// and the opcode byte itself.
#[derive(Debug)]
pub struct ProcessorError {
    pub fault: Fault,
    pub module: String,
    pub pc: usize,
    pub opcode: u8,
}

impl ProcessorError {
    pub fn new(fault: Fault, module: String, pc: usize, opcode: u8) -> Self {
        Self {
            fault,
            module,
            pc,
            opcode,
        }
    }

    fn location(&self) -> String {
        format!("module \"{}\", PC {:#06x}", self.module, self.pc)
    }
}

impl Display for ProcessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fault {
            Fault::Trap(trap) => {
                write!(f, "Trap {}: {} ({})", *trap as u16, trap, self.location())
            }
            Fault::ExplicitTrap { number } => {
                write!(f, "Trap {}: raised by program ({})", number, self.location())
            }
            Fault::Unimplemented => write!(
                f,
                "Opcode {:#05o} is not implemented ({})",
                self.opcode,
                self.location()
            ),
            Fault::BadModuleIndex { index } => write!(
                f,
                "Call into module {} which is not loaded ({})",
                index,
                self.location()
            ),
            Fault::UnresolvedProcedure {
                module_index,
                proc_index,
            } => write!(
                f,
                "Call of unresolved procedure {}.{} ({})",
                module_index,
                proc_index,
                self.location()
            ),
            Fault::CorruptExprStack => {
                write!(f, "Expression stack corrupted ({})", self.location())
            }
            Fault::UnknownSvc { code } => {
                write!(f, "Unknown supervisor call {} ({})", code, self.location())
            }
            Fault::UnknownSys { code } => {
                write!(f, "Unknown system call {} ({})", code, self.location())
            }
            Fault::Heap(source) => write!(f, "{} ({})", source, self.location()),
            Fault::Nested(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for ProcessorError {}
