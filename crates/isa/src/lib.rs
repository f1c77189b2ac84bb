// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

pub mod opcode;

use std::fmt::Display;

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

// the word arena (module data frames + procedure stack + heap),
// addressed by 16-bit word offsets.
pub const ARENA_SIZE_IN_WORDS: usize = 65536;

// the dedicated operand stack of the expression evaluator.
// the compiler never emits code that needs more than 15 words.
pub const EXPR_STACK_DEPTH: usize = 15;

// module indexes are encoded in one byte of the CLX/CLF operands,
// so the module table can never grow past 255 entries.
pub const MAX_MODULE_COUNT: usize = 255;

// module names are stored as 16 NUL-padded bytes in object files.
pub const MODULE_NAME_LENGTH: usize = 16;

// a module key is a 3-word signature that identifies the compilation
// an object file was produced by (stale imports are rejected).
pub const MODULE_KEY_LENGTH: usize = 3;

// the size of the prelude every procedure call pushes:
// {caller discriminator, caller L or base, caller PC, priority slot}
pub const CALL_FRAME_SIZE: usize = 4;

/// The guest-visible trap numbers.
///
/// A trap terminates execution; the report names the trap, the module
/// and the faulting PC. There is no trap-vector transfer back into
/// guest code.
#[repr(u16)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Trap {
    // ALLOC/ENTR would push S past H
    StackOverflow = 3,

    // UCHK/CHK/CHKZ/CHKS range check failed
    Index = 4,

    // IADD/ISUB/IMUL/UADD/USUB/UMUL out of 16-bit range,
    // also division by zero
    IntegerArithmetic = 10,

    // PC ran past the end of the code frame
    CodeOverflow = 11,

    // FFCT with an unknown sub-function
    InvalidFloatFunction = 12,

    // opcode outside the defined set
    InvalidOpcode = 13,

    // explicit TRAP, or a hardware channel this machine does not have
    System = 14,
}

impl Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trap::StackOverflow => write!(f, "Stack overflow"),
            Trap::Index => write!(f, "Index out of range"),
            Trap::IntegerArithmetic => write!(f, "Integer arithmetic overflow"),
            Trap::CodeOverflow => write!(f, "Program counter out of code frame"),
            Trap::InvalidFloatFunction => write!(f, "Unknown floating-point function"),
            Trap::InvalidOpcode => write!(f, "Invalid opcode"),
            Trap::System => write!(f, "System trap"),
        }
    }
}
