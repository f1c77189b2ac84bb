// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Scaffolding for interpreter tests: machines built from in-memory
// object images, and a terminal whose buffers can be inspected from
// outside the running machine.

use std::cell::RefCell;
use std::rc::Rc;

use mule_context::loader::{fix_extcalls, parse_objfile, SearchPaths};
use mule_context::Machine;
use mule_isa::opcode::Opcode;
use mule_object::utils::ObjectBuilder;

use crate::clock::{Clock, FixedClock, GuestTime};
use crate::terminal::{BufferTerminal, Terminal};
use crate::{Interpreter, ProcessorError, Services};

/// A `BufferTerminal` that stays observable while a `Services` value
/// owns a handle to it.
#[derive(Clone)]
pub struct SharedTerminal {
    inner: Rc<RefCell<BufferTerminal>>,
}

impl SharedTerminal {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BufferTerminal::new())),
        }
    }

    pub fn queue_keys(&self, keys: &str) {
        self.inner
            .borrow_mut()
            .keys
            .extend(keys.bytes().map(|b| b as u16));
    }

    pub fn output(&self) -> String {
        self.inner.borrow().output_string()
    }
}

impl Default for SharedTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for SharedTerminal {
    fn put_char(&mut self, byte: u8) {
        self.inner.borrow_mut().put_char(byte);
    }

    fn poll_key(&mut self) -> u16 {
        self.inner.borrow_mut().poll_key()
    }

    fn refresh(&mut self) {}

    fn shutdown(&mut self) {}
}

pub const TEST_CLOCK: GuestTime = GuestTime {
    year: 86,
    month: 7,
    day: 24,
    hour: 14,
    minute: 30,
};

/// Services over a shared in-memory terminal and a pinned clock.
pub fn buffer_services() -> (Services, SharedTerminal) {
    let terminal = SharedTerminal::new();
    let services = Services::new(
        Box::new(terminal.clone()),
        Box::new(FixedClock { time: TEST_CLOCK }),
    );
    (services, terminal)
}

pub fn services_with_clock(clock: Box<dyn Clock>) -> (Services, SharedTerminal) {
    let terminal = SharedTerminal::new();
    let services = Services::new(Box::new(terminal.clone()), clock);
    (services, terminal)
}

/// A machine with one module "Test" whose procedure table and code
/// frame are given literally. Entries are byte offsets into `code`.
pub fn build_test_machine(data_words: u16, proc_entries: &[u16], code: &[u8]) -> Machine {
    let code_words = code.len().div_ceil(2) as u16;
    let image = ObjectBuilder::new()
        .module("Test", [0x0001, 0x0002, 0x0003], data_words, code_words)
        .proc_entries(proc_entries)
        .code(0, code)
        .build();

    let mut machine = Machine::new(SearchPaths::from_dirs(Vec::new()));
    parse_objfile(&mut machine, &image, "Test").unwrap();
    fix_extcalls(&mut machine, 1).unwrap();
    machine
}

/// A machine whose module body is `code` behind one leading NOP (so
/// the entry offset is never 0), with a 16-word data frame.
pub fn machine_with_program(code: &[u8]) -> Machine {
    let mut body = vec![Opcode::NOP as u8];
    body.extend_from_slice(code);
    build_test_machine(16, &[1], &body)
}

/// Runs module 1 of the machine to completion.
pub fn execute_program(
    machine: &mut Machine,
    services: &mut Services,
) -> Result<(), ProcessorError> {
    Interpreter::new().execute(machine, services, 1)
}
