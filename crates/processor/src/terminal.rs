// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use std::collections::VecDeque;
use std::io::Write;

/// The terminal surface the machine writes characters to and polls
/// keys from.
///
/// The emulated hardware has no line discipline: output is a stream
/// of characters, and the keyboard is polled one key at a time, with
/// 0 meaning "no key pending".
pub trait Terminal {
    fn put_char(&mut self, byte: u8);

    /// One key, or 0 when none is pending. Never blocks.
    fn poll_key(&mut self) -> u16;

    fn refresh(&mut self);

    fn shutdown(&mut self);
}

/// The standard-I/O terminal used by the command line front end.
///
/// When stdin is a tty it is switched to raw, non-blocking reads
/// (VMIN=0, VTIME=0) so `poll_key` can return "nothing pending";
/// the original mode is restored on shutdown or drop.
pub struct StdioTerminal {
    saved_termios: Option<libc::termios>,
}

impl StdioTerminal {
    pub fn new() -> Self {
        let saved_termios = unsafe {
            if libc::isatty(libc::STDIN_FILENO) == 1 {
                let mut saved: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(libc::STDIN_FILENO, &mut saved) == 0 {
                    let mut raw = saved;
                    raw.c_lflag &= !(libc::ICANON | libc::ECHO);
                    raw.c_cc[libc::VMIN] = 0;
                    raw.c_cc[libc::VTIME] = 0;
                    libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw);
                    Some(saved)
                } else {
                    None
                }
            } else {
                None
            }
        };
        Self { saved_termios }
    }
}

impl Terminal for StdioTerminal {
    fn put_char(&mut self, byte: u8) {
        let mut stdout = std::io::stdout().lock();
        let _ = match byte {
            // the guest end-of-line is a carriage return
            0x0D => stdout.write_all(b"\n"),
            // rub out the character left of the cursor
            0x08 | 0x7F => stdout.write_all(b"\x08 \x08"),
            _ => stdout.write_all(&[byte]),
        };
        let _ = stdout.flush();
    }

    fn poll_key(&mut self) -> u16 {
        let mut buffer = [0u8; 1];
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                buffer.as_mut_ptr() as *mut libc::c_void,
                1,
            )
        };
        if n == 1 {
            buffer[0] as u16
        } else {
            0
        }
    }

    fn refresh(&mut self) {
        let _ = std::io::stdout().lock().flush();
    }

    fn shutdown(&mut self) {
        if let Some(saved) = self.saved_termios.take() {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}

impl Drop for StdioTerminal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Default for StdioTerminal {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory terminal for tests: output is collected, keys are
/// served from a queue.
pub struct BufferTerminal {
    pub output: Vec<u8>,
    pub keys: VecDeque<u16>,
}

impl BufferTerminal {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            keys: VecDeque::new(),
        }
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Terminal for BufferTerminal {
    fn put_char(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn poll_key(&mut self) -> u16 {
        self.keys.pop_front().unwrap_or(0)
    }

    fn refresh(&mut self) {}

    fn shutdown(&mut self) {}
}

impl Default for BufferTerminal {
    fn default() -> Self {
        Self::new()
    }
}
