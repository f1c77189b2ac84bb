// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// REAL arithmetic. The guest representation carries a 2-bit exponent
// bias (a factor of 4 against host floats); see mule_memory::real.
// Addition, subtraction, comparison and sign operations are
// bias-neutral; multiplication, division and the conversions are not.

use mule_context::Machine;
use mule_isa::Trap;
use mule_memory::real;

use crate::{Fault, Interpreter, Services};

fn pop_real(machine: &mut Machine) -> Result<f32, Fault> {
    Ok(real::real_from_bits(machine.exprs.pop_dword()?))
}

fn push_real(machine: &mut Machine, value: f32) -> Result<(), Fault> {
    machine.exprs.push_dword(real::real_to_bits(value))?;
    Ok(())
}

// FADD
pub fn float_add(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = pop_real(machine)?;
    let a = pop_real(machine)?;
    push_real(machine, a + b)
}

// FSUB
pub fn float_sub(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = pop_real(machine)?;
    let a = pop_real(machine)?;
    push_real(machine, a - b)
}

// FMUL: rebias the product
pub fn float_mul(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = pop_real(machine)?;
    let a = pop_real(machine)?;
    push_real(machine, real::real_mul(a, b))
}

// FDIV: rebias the quotient
pub fn float_div(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = pop_real(machine)?;
    let a = pop_real(machine)?;
    push_real(machine, real::real_div(a, b))
}

// FCMP: 0xffff / 0 / 1 for a<b / a=b / a>b
pub fn float_compare(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let b = pop_real(machine)?;
    let a = pop_real(machine)?;
    let result: u16 = if a < b {
        0xffff
    } else if a > b {
        1
    } else {
        0
    };
    machine.exprs.push_word(result)?;
    Ok(())
}

// FABS
pub fn float_abs(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let a = pop_real(machine)?;
    push_real(machine, a.abs())
}

// FNEG
pub fn float_neg(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let a = pop_real(machine)?;
    push_real(machine, -a)
}

// FFCT (param f:u8): 0 = INTEGER -> REAL, 1 = REAL -> INTEGER
pub fn float_function(
    _interp: &Interpreter,
    machine: &mut Machine,
    _services: &mut Services,
) -> Result<(), Fault> {
    let function = machine.fetch_byte()?;
    match function {
        0 => {
            let value = machine.exprs.pop_word()? as i16;
            push_real(machine, real::int_to_real(value))
        }
        1 => {
            let value = pop_real(machine)?;
            let truncated = real::real_to_int(value);
            machine.exprs.push_word(truncated as i16 as u16)?;
            Ok(())
        }
        _ => Err(Fault::Trap(Trap::InvalidFloatFunction)),
    }
}
