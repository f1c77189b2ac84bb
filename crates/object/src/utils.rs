// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// Helper for assembling object files in memory.
//
// Real object files come out of the Modula-2 compiler; the builder
// exists so loader and interpreter tests can construct small images
// without fixture files.

use mule_isa::{MODULE_KEY_LENGTH, MODULE_NAME_LENGTH};

pub struct ObjectBuilder {
    bytes: Vec<u8>,
}

impl ObjectBuilder {
    /// Starts an image with the standard start-of-file section.
    pub fn new() -> Self {
        let mut builder = Self { bytes: Vec::new() };
        builder.put_word(0x80);
        builder.put_word(0x0001);
        builder.put_word(0);
        builder
    }

    fn put_word(&mut self, word: u16) {
        self.bytes.extend_from_slice(&word.to_be_bytes());
    }

    fn put_name(&mut self, name: &str) {
        let mut padded = [0u8; MODULE_NAME_LENGTH];
        let bytes = name.as_bytes();
        padded[..bytes.len()].copy_from_slice(bytes);
        self.bytes.extend_from_slice(&padded);
    }

    fn put_key(&mut self, key: [u16; MODULE_KEY_LENGTH]) {
        for word in key {
            self.put_word(word);
        }
    }

    pub fn module(
        mut self,
        name: &str,
        key: [u16; MODULE_KEY_LENGTH],
        data_size_in_words: u16,
        code_size_in_words: u16,
    ) -> Self {
        self.put_word(0x81);
        self.put_word(0x10); // header size without the extra 6 bytes
        self.put_name(name);
        self.put_key(key);
        self.put_word(data_size_in_words);
        self.put_word(code_size_in_words);
        self.put_word(0); // trailing word, ignored by the reader
        self
    }

    pub fn imports(mut self, entries: &[(&str, [u16; MODULE_KEY_LENGTH])]) -> Self {
        self.put_word(0x82);
        self.put_word((entries.len() * 22) as u16);
        for (name, key) in entries {
            self.put_name(name);
            self.put_key(*key);
        }
        self
    }

    /// A new-format procedure-entry section: the whole table at once.
    /// Entries are byte offsets into the code frame.
    pub fn proc_entries(mut self, entries: &[u16]) -> Self {
        self.put_word(0x83);
        self.put_word((entries.len() + 1) as u16);
        self.put_word(0);
        for entry in entries {
            self.put_word(*entry);
        }
        self
    }

    /// An old-format procedure-entry section: one entry for the
    /// procedure at `index`.
    pub fn proc_entry_old(mut self, index: u16, entry: u16) -> Self {
        self.put_word(0x83);
        self.put_word(2);
        self.put_word(index);
        self.put_word(entry);
        self
    }

    /// A code block. Odd-length code is padded to a whole word, the
    /// way the compiler pads it.
    pub fn code(mut self, word_offset: u16, code: &[u8]) -> Self {
        let word_length = code.len().div_ceil(2);
        self.put_word(0x83);
        self.put_word(word_length as u16);
        self.put_word(word_offset);
        self.bytes.extend_from_slice(code);
        if code.len() % 2 != 0 {
            self.bytes.push(0);
        }
        self
    }

    pub fn data(mut self, word_offset: u16, words: &[u16]) -> Self {
        self.put_word(0x84);
        self.put_word((words.len() + 1) as u16);
        self.put_word(word_offset);
        for word in words {
            self.put_word(*word);
        }
        self
    }

    /// A fixup section for the current procedure. Offsets are
    /// absolute byte offsets into the code frame.
    pub fn fixups(mut self, offsets: &[u16]) -> Self {
        self.put_word(0x85);
        self.put_word(offsets.len() as u16);
        for offset in offsets {
            self.put_word(*offset);
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for ObjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}
