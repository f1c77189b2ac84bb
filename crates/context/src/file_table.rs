// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Host files opened on behalf of guest code.
///
/// Each open file is keyed by the arena address of the guest-side
/// file descriptor record and tagged with the owning module, so a
/// module's files can be closed in bulk when it is unloaded.
/// Temporary files (created nameless, or renamed to the empty name)
/// are removed from the host filesystem on close.
pub struct FileTable {
    entries: Vec<GuestFile>,
    temp_counter: u32,
}

pub struct GuestFile {
    pub descriptor: u16,
    pub owner: usize,
    pub file: File,
    pub path: PathBuf,
    pub temporary: bool,
}

/// Guest filenames may carry the historical `DK.` volume prefix;
/// the host filesystem has no volumes.
pub fn strip_volume_prefix(name: &str) -> &str {
    name.strip_prefix("DK.").unwrap_or(name)
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            temp_counter: 0,
        }
    }

    fn position(&self, descriptor: u16) -> Option<usize> {
        self.entries.iter().position(|e| e.descriptor == descriptor)
    }

    pub fn get_mut(&mut self, descriptor: u16) -> Option<&mut GuestFile> {
        self.entries.iter_mut().find(|e| e.descriptor == descriptor)
    }

    /// Creates a nameless temporary file (sub-command Create).
    pub fn create_temp(&mut self, descriptor: u16, owner: usize) -> std::io::Result<()> {
        self.temp_counter += 1;
        let path = std::env::temp_dir().join(format!(
            "MULE.{}.{:04}.TMP",
            std::process::id(),
            self.temp_counter
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.close(descriptor);
        self.entries.push(GuestFile {
            descriptor,
            owner,
            file,
            path,
            temporary: true,
        });
        Ok(())
    }

    /// Opens an existing file, or creates it when `create` is set
    /// (sub-command Lookup).
    pub fn lookup(
        &mut self,
        descriptor: u16,
        owner: usize,
        name: &str,
        create: bool,
    ) -> std::io::Result<()> {
        let path = PathBuf::from(strip_volume_prefix(name));
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&path)
        {
            Ok(file) => file,
            // a read-only host file is still usable for reading
            Err(_) if !create => OpenOptions::new().read(true).open(&path)?,
            Err(e) => return Err(e),
        };
        self.close(descriptor);
        self.entries.push(GuestFile {
            descriptor,
            owner,
            file,
            path,
            temporary: false,
        });
        Ok(())
    }

    /// Closes the file; a temporary is removed from the host.
    pub fn close(&mut self, descriptor: u16) {
        if let Some(index) = self.position(descriptor) {
            let entry = self.entries.remove(index);
            if entry.temporary {
                let _ = std::fs::remove_file(&entry.path);
            }
        }
    }

    /// Renames the file. The empty name marks the file temporary
    /// instead, which makes the eventual close remove it.
    pub fn rename(&mut self, descriptor: u16, new_name: &str) -> std::io::Result<()> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        if new_name.is_empty() {
            entry.temporary = true;
            return Ok(());
        }
        let new_path = PathBuf::from(strip_volume_prefix(new_name));
        std::fs::rename(&entry.path, &new_path)?;
        entry.path = new_path;
        entry.temporary = false;
        Ok(())
    }

    /// Reopens the file for reading, writing, or both, positioned at
    /// the start (sub-commands SetRead/SetWrite/SetModify).
    pub fn reopen(&mut self, descriptor: u16, read: bool, write: bool) -> std::io::Result<()> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        let file = OpenOptions::new().read(read).write(write).open(&entry.path)?;
        entry.file = file;
        entry.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn set_pos(&mut self, descriptor: u16, position: u32) -> std::io::Result<()> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        entry.file.seek(SeekFrom::Start(position as u64))?;
        Ok(())
    }

    pub fn get_pos(&mut self, descriptor: u16) -> std::io::Result<u32> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        Ok(entry.file.stream_position()? as u32)
    }

    /// Reads one big-endian word (sub-command ReadWord).
    pub fn read_word(&mut self, descriptor: u16) -> std::io::Result<u16> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        let mut buffer = [0u8; 2];
        entry.file.read_exact(&mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }

    pub fn write_word(&mut self, descriptor: u16, word: u16) -> std::io::Result<()> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        entry.file.write_all(&word.to_be_bytes())
    }

    pub fn read_char(&mut self, descriptor: u16) -> std::io::Result<u8> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        let mut buffer = [0u8; 1];
        entry.file.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    pub fn write_char(&mut self, descriptor: u16, byte: u8) -> std::io::Result<()> {
        let entry = match self.get_mut(descriptor) {
            Some(entry) => entry,
            None => return Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        entry.file.write_all(&[byte])
    }

    /// Closes every file owned by module `owner`. Called when the
    /// module is unloaded.
    pub fn close_all_of(&mut self, owner: usize) {
        while let Some(index) = self.entries.iter().position(|e| e.owner == owner) {
            let entry = self.entries.remove(index);
            if entry.temporary {
                let _ = std::fs::remove_file(&entry.path);
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
