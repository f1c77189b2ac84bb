// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_isa::{MODULE_KEY_LENGTH, MODULE_NAME_LENGTH};

use crate::{ObjectError, ObjectErrorType};

/// The known section tags. A tag is one big-endian word.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SectionTag {
    /// 0x80: start of file, followed by the literal 0x0001 and one
    /// ignored word.
    Header,

    /// 0xC1: alternate start of file, one ignored word.
    AltHeader,

    /// 0x81: module header (name, key, frame sizes).
    Module,

    /// 0x82: import list.
    Imports,

    /// 0x83: procedure entries and code blocks, alternating. The
    /// first 0x83 section of a module holds procedure entries, the
    /// next one code, and so on.
    ProcOrCode,

    /// 0x84: initialized data for the module's data frame.
    Data,

    /// 0x85: fixup offsets for the current procedure's code.
    Fixups,
}

impl SectionTag {
    pub fn from_word(word: u16) -> Option<SectionTag> {
        match word {
            0x80 => Some(SectionTag::Header),
            0xC1 => Some(SectionTag::AltHeader),
            0x81 => Some(SectionTag::Module),
            0x82 => Some(SectionTag::Imports),
            0x83 => Some(SectionTag::ProcOrCode),
            0x84 => Some(SectionTag::Data),
            0x85 => Some(SectionTag::Fixups),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ModuleSection {
    pub name: String,
    pub key: [u16; MODULE_KEY_LENGTH],
    pub data_size_in_words: usize,
    pub code_size_in_bytes: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ImportEntry {
    pub name: String,
    pub key: [u16; MODULE_KEY_LENGTH],
}

/// A procedure-entry section.
///
/// The old format carries one entry per section, addressed by
/// `start_index`; the new format carries the whole table in one
/// section with `start_index == 0`.
#[derive(Debug, PartialEq, Eq)]
pub struct ProcEntries {
    pub start_index: usize,
    pub entries: Vec<u16>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CodeBlock {
    pub byte_offset: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DataBlock {
    pub word_offset: usize,
    pub words: Vec<u16>,
}

/// A cursor over the raw bytes of an object file.
///
/// Words are read big-endian; everything the format stores is either
/// a word or a NUL-padded byte string.
pub struct SectionReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_at_end(&self) -> bool {
        // trailing odd byte is padding
        self.position + 1 >= self.data.len()
    }

    fn truncated(&self) -> ObjectError {
        ObjectError::new(ObjectErrorType::UnexpectedEnd {
            position: self.position,
        })
    }

    pub fn read_word(&mut self) -> Result<u16, ObjectError> {
        if self.position + 2 > self.data.len() {
            return Err(self.truncated());
        }
        let word = ((self.data[self.position] as u16) << 8) | (self.data[self.position + 1] as u16);
        self.position += 2;
        Ok(word)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ObjectError> {
        if self.position + count > self.data.len() {
            return Err(self.truncated());
        }
        let bytes = &self.data[self.position..(self.position + count)];
        self.position += count;
        Ok(bytes)
    }

    pub fn skip_bytes(&mut self, count: usize) -> Result<(), ObjectError> {
        if self.position + count > self.data.len() {
            return Err(self.truncated());
        }
        self.position += count;
        Ok(())
    }

    fn read_name(&mut self) -> Result<String, ObjectError> {
        let bytes = self.read_bytes(MODULE_NAME_LENGTH)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn read_key(&mut self) -> Result<[u16; MODULE_KEY_LENGTH], ObjectError> {
        let mut key = [0u16; MODULE_KEY_LENGTH];
        for slot in key.iter_mut() {
            *slot = self.read_word()?;
        }
        Ok(key)
    }

    /// Reads the next section tag, or `None` at the end of the file.
    pub fn read_tag(&mut self) -> Result<Option<SectionTag>, ObjectError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let position = self.position;
        let word = self.read_word()?;
        match SectionTag::from_word(word) {
            Some(tag) => Ok(Some(tag)),
            None => Err(ObjectError::new(ObjectErrorType::UnknownTag {
                tag: word,
                position,
            })),
        }
    }

    /// Consumes a start-of-file section body (tag already read).
    pub fn read_header(&mut self, alt: bool) -> Result<(), ObjectError> {
        if !alt {
            let value = self.read_word()?;
            if value != 0x0001 {
                return Err(ObjectError::new(ObjectErrorType::BadHeader { value }));
            }
        }
        // one ignored word in both variants
        self.read_word()?;
        Ok(())
    }

    pub fn read_module(&mut self) -> Result<ModuleSection, ObjectError> {
        let header_size = self.read_word()?;
        let name = self.read_name()?;
        let key = self.read_key()?;
        if header_size == 0x11 {
            self.skip_bytes(6)?;
        }
        let data_size_in_words = self.read_word()? as usize;
        let code_size_in_words = self.read_word()? as usize;
        // trailing word ignored
        self.read_word()?;
        Ok(ModuleSection {
            name,
            key,
            data_size_in_words,
            code_size_in_bytes: code_size_in_words * 2,
        })
    }

    pub fn read_imports(&mut self) -> Result<Vec<ImportEntry>, ObjectError> {
        let byte_length = self.read_word()? as usize;
        // one record is a 16-byte name plus a 3-word key: 11 words
        let count = byte_length / 22;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.read_name()?;
            let key = self.read_key()?;
            entries.push(ImportEntry { name, key });
        }
        Ok(entries)
    }

    pub fn read_proc_entries(&mut self) -> Result<ProcEntries, ObjectError> {
        let length = self.read_word()? as usize;
        let start_index = self.read_word()? as usize;
        if start_index != 0 {
            // old format: one entry, addressed by its index
            let entry = self.read_word()?;
            Ok(ProcEntries {
                start_index,
                entries: vec![entry],
            })
        } else {
            // new format: the whole table, length counts one extra
            let count = length.saturating_sub(1);
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(self.read_word()?);
            }
            Ok(ProcEntries {
                start_index: 0,
                entries,
            })
        }
    }

    pub fn read_code_block(&mut self) -> Result<CodeBlock, ObjectError> {
        let word_length = self.read_word()? as usize;
        let word_offset = self.read_word()? as usize;
        let bytes = self.read_bytes(word_length * 2)?.to_vec();
        Ok(CodeBlock {
            byte_offset: word_offset * 2,
            bytes,
        })
    }

    pub fn read_data(&mut self) -> Result<DataBlock, ObjectError> {
        let length = self.read_word()? as usize;
        let word_offset = self.read_word()? as usize;
        // the length word counts the offset word as well
        let count = length.saturating_sub(1);
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(self.read_word()?);
        }
        Ok(DataBlock { word_offset, words })
    }

    pub fn read_fixups(&mut self) -> Result<Vec<u16>, ObjectError> {
        let count = self.read_word()? as usize;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(self.read_word()?);
        }
        Ok(offsets)
    }
}
