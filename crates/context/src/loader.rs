// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// The object-file loader and linker.
//
// Loading is a three-step pipeline:
//
// 1. `load_objfile` resolves a file on the include paths, maps it and
//    parses its sections into the module table: data frames are
//    allocated at DATA_TOP, code frames are copied, procedure entries
//    and fixup offsets are parked in per-module transient state.
// 2. Unloaded modules the parse registered (imports) are resolved the
//    same way, depth first.
// 3. `fix_extcalls` turns the transient state into the final
//    procedure tables and rewrites every fixed-up operand from its
//    1-based import slot to the absolute module-table index the
//    interpreter dispatches on.

use std::fs::File;
use std::path::PathBuf;

use memmap2::Mmap;
use mule_isa::opcode::Opcode;
use mule_object::{ObjectError, SectionReader, SectionTag};

use crate::module::{LoadingState, ProcTemp};
use crate::{LoaderError, LoaderErrorType, Machine};

/// The opcodes whose one-byte module operand the linker rewrites.
const FIXABLE_OPCODES: [u8; 7] = [
    Opcode::LIW as u8,
    Opcode::LEA as u8,
    Opcode::LEW as u8,
    Opcode::LED as u8,
    Opcode::SEW as u8,
    Opcode::SED as u8,
    Opcode::CLX as u8,
];

/// The ordered include directories object files are searched on.
pub struct SearchPaths {
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn from_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// The standard order: the current directory, then the `-i`
    /// options, then the colon-separated entries of `MULE_PATH`.
    pub fn build(include: &[PathBuf]) -> Self {
        let mut dirs = vec![PathBuf::from(".")];
        dirs.extend(include.iter().cloned());
        if let Ok(var) = std::env::var("MULE_PATH") {
            dirs.extend(var.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
        Self { dirs }
    }

    /// Resolves `file_name` against the include paths.
    ///
    /// The `.OBJ` suffix is appended when missing. On each path the
    /// plain name is tried first, then the name under `alt_prefix`
    /// (`LIB.` for dependencies, `SYS.` for programs), unless the
    /// name already carries that prefix.
    pub fn find(&self, file_name: &str, alt_prefix: &str) -> Option<PathBuf> {
        let mut name = file_name.to_owned();
        if !name.ends_with(".OBJ") {
            name.push_str(".OBJ");
        }
        let prefixed = format!("{}.{}", alt_prefix, name);
        for dir in &self.dirs {
            let candidate = dir.join(&name);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !name.starts_with(&format!("{}.", alt_prefix)) {
                let candidate = dir.join(&prefixed);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Loads `file_name` and every module it transitively imports, then
/// links. Returns the module-table marker: the index of the first
/// module this call created. On failure everything the call loaded
/// is unloaded again.
pub fn load_initfile(
    machine: &mut Machine,
    file_name: &str,
    alt_prefix: &str,
) -> Result<usize, LoaderError> {
    let marker = machine.modules.len();
    let result = load_objfile(machine, file_name, alt_prefix)
        .and_then(|_| fix_extcalls(machine, marker));
    match result {
        Ok(()) => Ok(marker),
        Err(e) => {
            machine.unload_to(marker);
            Err(e)
        }
    }
}

/// Resolves and parses one object file, then recursively loads the
/// unloaded modules its parse registered.
pub fn load_objfile(
    machine: &mut Machine,
    file_name: &str,
    alt_prefix: &str,
) -> Result<(), LoaderError> {
    let path = machine
        .search_paths
        .find(file_name, alt_prefix)
        .ok_or_else(|| {
            LoaderError::new(LoaderErrorType::FileNotFound {
                name: file_name.to_owned(),
            })
        })?;

    if machine.verbose {
        eprintln!("mule: loading {}", path.display());
    }

    let file = File::open(&path).map_err(|source| {
        LoaderError::new(LoaderErrorType::Io {
            name: file_name.to_owned(),
            source,
        })
    })?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| {
        LoaderError::new(LoaderErrorType::Io {
            name: file_name.to_owned(),
            source,
        })
    })?;

    let mut top = machine.modules.len();
    parse_objfile(machine, &mmap, file_name)?;

    // dependencies registered by this parse
    while top < machine.modules.len() {
        if !machine.modules[top].loaded {
            let name = machine.modules[top].name.clone();
            load_objfile(machine, &name, "LIB")?;
            if !machine.modules[top].loaded {
                return Err(LoaderError::new(LoaderErrorType::ModuleNotLoaded {
                    module: name,
                }));
            }
        }
        top += 1;
    }
    Ok(())
}

fn object_error(name: &str, source: ObjectError) -> LoaderError {
    LoaderError::new(LoaderErrorType::Object {
        name: name.to_owned(),
        source,
    })
}

/// Parses the sections of one mapped object file into the module
/// table and the arena.
pub fn parse_objfile(
    machine: &mut Machine,
    data: &[u8],
    file_label: &str,
) -> Result<(), LoaderError> {
    let mut reader = SectionReader::new(data);
    let mut current: Option<usize> = None;

    let current_or_err = |current: Option<usize>| {
        current.ok_or_else(|| {
            LoaderError::new(LoaderErrorType::SectionOutsideModule {
                name: file_label.to_owned(),
            })
        })
    };

    while let Some(tag) = reader.read_tag().map_err(|e| object_error(file_label, e))? {
        match tag {
            SectionTag::Header => {
                reader
                    .read_header(false)
                    .map_err(|e| object_error(file_label, e))?;
            }
            SectionTag::AltHeader => {
                reader
                    .read_header(true)
                    .map_err(|e| object_error(file_label, e))?;
            }
            SectionTag::Module => {
                let section = reader.read_module().map_err(|e| object_error(file_label, e))?;
                let index = machine.init_mod_entry(&section.name, section.key)?;
                if machine.modules[index].loaded {
                    return Err(LoaderError::new(LoaderErrorType::DuplicateModule {
                        module: section.name,
                    }));
                }

                if machine.data_top + section.data_size_in_words > machine.heap.lower_bound() {
                    return Err(LoaderError::new(LoaderErrorType::ArenaExhausted {
                        module: section.name,
                    }));
                }

                let module = &mut machine.modules[index];
                module.data_offset = machine.data_top;
                module.data_size = section.data_size_in_words;
                module.code = vec![0u8; section.code_size_in_bytes];
                module.loaded = true;
                module.loading = Some(Box::new(LoadingState::default()));
                machine.data_top += section.data_size_in_words;
                current = Some(index);
            }
            SectionTag::Imports => {
                let entries = reader.read_imports().map_err(|e| object_error(file_label, e))?;
                let index = current_or_err(current)?;
                for entry in entries {
                    let import_index = machine.init_mod_entry(&entry.name, entry.key)?;
                    machine.modules[index].imports.push(import_index);
                }
            }
            SectionTag::ProcOrCode => {
                let index = current_or_err(current)?;
                let module = &mut machine.modules[index];
                let loading = module.loading.as_mut().unwrap_or_else(|| unreachable!());
                if loading.next_is_code {
                    let block = reader
                        .read_code_block()
                        .map_err(|e| object_error(file_label, e))?;
                    if block.byte_offset + block.bytes.len() > module.code.len() {
                        return Err(LoaderError::new(LoaderErrorType::FrameOverrun {
                            module: module.name.clone(),
                        }));
                    }
                    module.code[block.byte_offset..block.byte_offset + block.bytes.len()]
                        .copy_from_slice(&block.bytes);
                } else {
                    let entries = reader
                        .read_proc_entries()
                        .map_err(|e| object_error(file_label, e))?;
                    for (offset, entry) in entries.entries.iter().enumerate() {
                        loading.proc_temps.push(ProcTemp {
                            index: entries.start_index + offset,
                            entry: *entry,
                            fixups: Vec::new(),
                        });
                    }
                }
                loading.next_is_code = !loading.next_is_code;
            }
            SectionTag::Data => {
                let block = reader.read_data().map_err(|e| object_error(file_label, e))?;
                let index = current_or_err(current)?;
                let module = &machine.modules[index];
                if block.word_offset + block.words.len() > module.data_size {
                    return Err(LoaderError::new(LoaderErrorType::FrameOverrun {
                        module: module.name.clone(),
                    }));
                }
                let base = module.data_offset + block.word_offset;
                for (offset, word) in block.words.iter().enumerate() {
                    machine.arena.write_word(base + offset, *word);
                }
            }
            SectionTag::Fixups => {
                let offsets = reader.read_fixups().map_err(|e| object_error(file_label, e))?;
                let index = current_or_err(current)?;
                let module = &mut machine.modules[index];
                let loading = module.loading.as_mut().unwrap_or_else(|| unreachable!());
                match loading.proc_temps.last_mut() {
                    Some(temp) => temp.fixups.extend(offsets),
                    None => {
                        return Err(LoaderError::new(LoaderErrorType::FixupOutsideProcedure {
                            module: module.name.clone(),
                        }))
                    }
                }
            }
        }
    }
    Ok(())
}

/// The linking phase: builds the final procedure tables and rewrites
/// fixed-up operands from import slots to module-table indexes. The
/// transient loading state is dropped.
pub fn fix_extcalls(machine: &mut Machine, marker: usize) -> Result<(), LoaderError> {
    for index in marker..machine.modules.len() {
        let module = &mut machine.modules[index];
        let loading = match module.loading.take() {
            Some(loading) => loading,
            None => continue,
        };

        let proc_count = loading
            .proc_temps
            .iter()
            .map(|temp| temp.index + 1)
            .max()
            .unwrap_or(0);
        let mut procs = vec![0u16; proc_count];
        for temp in &loading.proc_temps {
            procs[temp.index] = temp.entry;
        }

        for temp in &loading.proc_temps {
            for &offset in &temp.fixups {
                let offset = offset as usize;
                if offset == 0 || offset >= module.code.len() {
                    return Err(LoaderError::new(LoaderErrorType::InvalidFixup {
                        module: module.name.clone(),
                        offset,
                        opcode: 0,
                    }));
                }
                let opcode = module.code[offset - 1];
                if !FIXABLE_OPCODES.contains(&opcode) {
                    return Err(LoaderError::new(LoaderErrorType::InvalidFixup {
                        module: module.name.clone(),
                        offset,
                        opcode,
                    }));
                }
                let slot = module.code[offset] as usize;
                if slot == 0 || slot > module.imports.len() {
                    return Err(LoaderError::new(LoaderErrorType::BadImportSlot {
                        module: module.name.clone(),
                        slot,
                    }));
                }
                module.code[offset] = module.imports[slot - 1] as u8;
            }
        }

        module.procs = procs;
        module.imports = Vec::new();
    }
    Ok(())
}

/// The verbose module listing printed after loading.
pub fn print_module_table(machine: &Machine) {
    for (index, module) in machine.modules.iter().enumerate() {
        eprintln!(
            "{:3}  {:<16} key {:04x}.{:04x}.{:04x}  data {:#06x}+{:<5} code {} bytes",
            index,
            module.name,
            module.key[0],
            module.key[1],
            module.key[2],
            module.data_offset,
            module.data_size,
            module.code.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mule_isa::opcode::Opcode;
    use mule_object::utils::ObjectBuilder;
    use pretty_assertions::assert_eq;

    use super::{load_initfile, SearchPaths};
    use crate::{LoaderErrorType, Machine};

    static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    // every test gets its own directory of object files
    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mule-loader-test.{}.{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_obj(dir: &PathBuf, name: &str, image: Vec<u8>) {
        std::fs::write(dir.join(name), image).unwrap();
    }

    fn machine_with(dir: PathBuf) -> Machine {
        Machine::new(SearchPaths::from_dirs(vec![dir]))
    }

    #[test]
    fn test_load_single_module() {
        let dir = test_dir();
        let image = ObjectBuilder::new()
            .module("Hello", [0x1001, 0x2002, 0x3003], 4, 2)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::NOP as u8, Opcode::RTN as u8, 0])
            .data(0, &[0xBEEF, 0xCAFE])
            .build();
        write_obj(&dir, "Hello.OBJ", image);

        let mut machine = machine_with(dir);
        let marker = load_initfile(&mut machine, "Hello", "SYS").unwrap();
        assert_eq!(marker, 1);
        assert_eq!(machine.modules.len(), 2);

        let module = &machine.modules[1];
        assert_eq!(module.name, "Hello");
        assert!(module.loaded);
        assert_eq!(module.data_offset, 0);
        assert_eq!(module.data_size, 4);
        assert_eq!(module.procs, vec![1]);
        assert!(module.loading.is_none());
        assert_eq!(machine.data_top, 4);

        // initialized data landed in the data frame
        assert_eq!(machine.arena.read_word(0), 0xBEEF);
        assert_eq!(machine.arena.read_word(1), 0xCAFE);
    }

    #[test]
    fn test_import_resolution_and_fixup() {
        let dir = test_dir();

        // MAIN calls LIB.0 through import slot 1; the linker rewrites
        // the slot byte to LIB's module-table index
        let main_code = [
            Opcode::NOP as u8,
            Opcode::CLX as u8,
            1, // import slot, fixed up
            0, // procedure 0
            Opcode::RTN as u8,
            0,
        ];
        let main = ObjectBuilder::new()
            .module("Main", [1, 1, 1], 0, 3)
            .imports(&[("Lib", [2, 2, 2])])
            .proc_entries(&[1])
            .code(0, &main_code)
            .fixups(&[2])
            .build();
        let lib = ObjectBuilder::new()
            .module("Lib", [2, 2, 2], 2, 1)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        write_obj(&dir, "Main.OBJ", main);
        write_obj(&dir, "Lib.OBJ", lib);

        let mut machine = machine_with(dir);
        let marker = load_initfile(&mut machine, "Main", "SYS").unwrap();
        assert_eq!(marker, 1);
        assert_eq!(machine.modules[1].name, "Main");
        assert_eq!(machine.modules[2].name, "Lib");

        // the operand byte now holds the absolute module index
        assert_eq!(machine.modules[1].code[2], 2);
        // import tables are dropped after linking
        assert!(machine.modules[1].imports.is_empty());
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = test_dir();
        let image = ObjectBuilder::new()
            .module("Cycle", [7, 7, 7], 3, 2)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8, 0, 0])
            .data(0, &[0x1111, 0x2222, 0x3333])
            .build();
        write_obj(&dir, "Cycle.OBJ", image);

        let mut machine = machine_with(dir);
        let marker = load_initfile(&mut machine, "Cycle", "SYS").unwrap();
        let code_before = machine.modules[marker].code.clone();
        let data_before = machine
            .arena
            .slice(machine.modules[marker].data_offset, 3)
            .to_vec();

        machine.unload_to(marker);
        assert_eq!(machine.modules.len(), marker);
        assert_eq!(machine.data_top, 0);

        let marker2 = load_initfile(&mut machine, "Cycle", "SYS").unwrap();
        assert_eq!(marker2, marker);
        assert_eq!(machine.modules[marker2].code, code_before);
        assert_eq!(
            machine
                .arena
                .slice(machine.modules[marker2].data_offset, 3),
            &data_before[..]
        );
    }

    #[test]
    fn test_key_mismatch_is_rejected() {
        let dir = test_dir();
        let main = ObjectBuilder::new()
            .module("Main", [1, 1, 1], 0, 1)
            .imports(&[("Lib", [2, 2, 2])])
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        // Lib on disk was compiled later: different key
        let lib = ObjectBuilder::new()
            .module("Lib", [9, 9, 9], 0, 1)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        write_obj(&dir, "Main.OBJ", main);
        write_obj(&dir, "Lib.OBJ", lib);

        let mut machine = machine_with(dir);
        let err = load_initfile(&mut machine, "Main", "SYS").unwrap_err();
        assert!(matches!(err.error_type, LoaderErrorType::KeyMismatch { .. }));
    }

    #[test]
    fn test_missing_dependency_leaves_no_state() {
        let dir = test_dir();
        let main = ObjectBuilder::new()
            .module("Main", [1, 1, 1], 2, 1)
            .imports(&[("Missing", [5, 5, 5])])
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        write_obj(&dir, "Main.OBJ", main);

        let mut machine = machine_with(dir);
        let err = load_initfile(&mut machine, "Main", "SYS").unwrap_err();
        assert!(matches!(
            err.error_type,
            LoaderErrorType::FileNotFound { .. }
        ));

        // the failed load rolled everything back
        assert_eq!(machine.modules.len(), 1);
        assert_eq!(machine.data_top, 0);
        assert!(machine.heap.check_invariants());
    }

    #[test]
    fn test_search_path_alt_prefix() {
        let dir = test_dir();
        let image = ObjectBuilder::new()
            .module("InOut", [4, 4, 4], 0, 1)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        // stored under the library prefix, requested without it
        write_obj(&dir, "LIB.InOut.OBJ", image);

        let mut machine = machine_with(dir);
        let marker = load_initfile(&mut machine, "InOut", "LIB").unwrap();
        assert_eq!(machine.modules[marker].name, "InOut");
    }

    #[test]
    fn test_invalid_fixup_is_rejected() {
        let dir = test_dir();
        // the fixup points at an operand whose opcode is NOP, which
        // the linker cannot rewrite
        let image = ObjectBuilder::new()
            .module("Bad", [1, 2, 3], 0, 2)
            .imports(&[("Lib", [2, 2, 2])])
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::NOP as u8, 1, Opcode::RTN as u8])
            .fixups(&[2])
            .build();
        let lib = ObjectBuilder::new()
            .module("Lib", [2, 2, 2], 0, 1)
            .proc_entries(&[1])
            .code(0, &[Opcode::NOP as u8, Opcode::RTN as u8])
            .build();
        write_obj(&dir, "Bad.OBJ", image);
        write_obj(&dir, "Lib.OBJ", lib);

        let mut machine = machine_with(dir);
        let err = load_initfile(&mut machine, "Bad", "SYS").unwrap_err();
        assert!(matches!(
            err.error_type,
            LoaderErrorType::InvalidFixup { offset: 2, .. }
        ));
    }
}
