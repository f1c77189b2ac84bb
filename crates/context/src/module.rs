// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_isa::MODULE_KEY_LENGTH;

/// One entry of the module table.
///
/// Entry 0 is the reserved "System" pseudo-module (key all zero): it
/// has no code, and external calls of the form `0.0` fall into it as
/// a no-op. Every other entry is created on first mention, either as
/// the initial program or as an import, and carries its code frame
/// and the location of its data frame in the arena.
pub struct ModuleEntry {
    pub name: String,
    pub key: [u16; MODULE_KEY_LENGTH],

    /// Set when the module's own object file has been parsed. A
    /// module mentioned only as an import stays unloaded until the
    /// loader resolves its file.
    pub loaded: bool,

    /// The code frame: read-only after fixup.
    pub code: Vec<u8>,

    /// Word offset of the module's data frame in the arena.
    pub data_offset: usize,

    /// Word length of the data frame.
    pub data_size: usize,

    /// Procedure index -> byte offset of the entry point in `code`.
    /// Index 0 is the module initialization procedure. A zero entry
    /// is an unresolved procedure; calling it is a runtime fault.
    pub procs: Vec<u16>,

    /// Import slot -> module table index. Only populated between
    /// parse and fixup; the linker rewrites all uses and clears it.
    pub imports: Vec<usize>,

    /// Parse-time state, dropped by the fixup phase.
    pub loading: Option<Box<LoadingState>>,
}

impl ModuleEntry {
    pub fn new(name: &str, key: [u16; MODULE_KEY_LENGTH]) -> Self {
        Self {
            name: name.to_owned(),
            key,
            loaded: false,
            code: Vec::new(),
            data_offset: 0,
            data_size: 0,
            procs: Vec::new(),
            imports: Vec::new(),
            loading: None,
        }
    }

    /// The reserved entry 0.
    pub fn system() -> Self {
        Self {
            name: "System".to_owned(),
            key: [0; MODULE_KEY_LENGTH],
            loaded: true,
            code: Vec::new(),
            data_offset: 0,
            data_size: 0,
            procs: Vec::new(),
            imports: Vec::new(),
            loading: None,
        }
    }
}

/// Transient per-module state used while its object file is parsed.
#[derive(Default)]
pub struct LoadingState {
    /// Procedure entry records in file order, each with the fixup
    /// offsets that arrived while it was the current procedure.
    pub proc_temps: Vec<ProcTemp>,

    /// The 0x83 section alternates between procedure entries and
    /// code blocks; this is the toggle.
    pub next_is_code: bool,
}

pub struct ProcTemp {
    pub index: usize,
    pub entry: u16,
    pub fixups: Vec<u16>,
}
