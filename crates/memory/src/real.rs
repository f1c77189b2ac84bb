// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// The guest REAL type is IEEE-754 single precision with a 2-bit
// exponent bias offset inherited from the original hardware: a guest
// bit pattern, read as a host f32, represents 4x the guest value.
//
// All conversions in and out of REAL therefore carry a factor of 4:
//
//     INTEGER -> REAL      f = i * 4
//     REAL -> INTEGER      i = trunc(f / 4)
//     FMUL                 (4a)*(4b) = 16ab, divide by 4
//     FDIV                 (4a)/(4b) = a/b, multiply by 4
//
// FADD, FSUB, FCMP, FABS and FNEG are bias-neutral and need no
// correction. Getting this wrong makes every REAL computed by guest
// code off by a power of four.

/// The guest-to-host scale factor of the REAL exponent bias.
pub const REAL_BIAS_FACTOR: f32 = 4.0;

#[inline]
pub fn real_from_bits(bits: u32) -> f32 {
    f32::from_bits(bits)
}

#[inline]
pub fn real_to_bits(value: f32) -> u32 {
    value.to_bits()
}

/// INTEGER -> REAL (FFCT 0).
#[inline]
pub fn int_to_real(value: i16) -> f32 {
    (value as f32) * REAL_BIAS_FACTOR
}

/// REAL -> INTEGER (FFCT 1), truncating toward zero.
#[inline]
pub fn real_to_int(value: f32) -> i32 {
    (value / REAL_BIAS_FACTOR).trunc() as i32
}

/// The product of two biased representations, rebiased.
#[inline]
pub fn real_mul(a: f32, b: f32) -> f32 {
    (a * b) / REAL_BIAS_FACTOR
}

/// The quotient of two biased representations, rebiased.
#[inline]
pub fn real_div(a: f32, b: f32) -> f32 {
    (a / b) * REAL_BIAS_FACTOR
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{int_to_real, real_div, real_mul, real_to_int};

    #[test]
    fn test_int_real_round_trip() {
        for i in [-1000i16, -1, 0, 1, 7, 255, 32000] {
            let r = int_to_real(i);
            assert_eq!(real_to_int(r), i as i32);
        }
    }

    #[test]
    fn test_bias_factor_visible_in_representation() {
        // the guest value 1 is the host float 4.0
        assert_eq!(int_to_real(1), 4.0);
        assert_eq!(int_to_real(-3), -12.0);
    }

    #[test]
    fn test_mul_div_rebias() {
        let three = int_to_real(3);
        let five = int_to_real(5);

        // 3 * 5 = 15, represented as 60.0
        assert_eq!(real_mul(three, five), int_to_real(15));

        // 15 / 3 = 5, represented as 20.0
        assert_eq!(real_div(int_to_real(15), three), five);
    }
}
