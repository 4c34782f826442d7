//! Fixed-point math helpers from `celt/mathops.c`.
//!
//! Integer approximations of log2, square root, reciprocal and fractional
//! division. All routines operate on explicit Q formats and stay within
//! 32-bit signed arithmetic so results match the reference bit for bit.

use crate::celt::fixed_ops::{
    add32, mult16_16_q15, mult16_32_q15, mult32_32_q31, pshr32, shl32, sub32, vshr32,
};

/// Integer base-2 logarithm: `floor(log2(x))` for positive `x`.
///
/// Returns 0 for non-positive inputs so shift computations degrade safely;
/// callers that require a positive domain assert it themselves.
#[inline]
pub(crate) fn celt_ilog2(x: i32) -> i32 {
    if x <= 0 {
        return 0;
    }
    31 - x.leading_zeros() as i32
}

/// Fixed-point square root approximation: QX input, QX/2 output.
///
/// The relative error of the minimax polynomial stays below 0.5 % over the
/// normalised range, which covers every energy value the width estimator
/// feeds in.
pub(crate) fn celt_sqrt(x: i32) -> i32 {
    if x == 0 {
        return 0;
    }
    if x >= 1_073_741_824 {
        return 32_767;
    }

    let k = (celt_ilog2(x) >> 1) - 7;
    let x = vshr32(x, 2 * k);
    let n = (x - 32_768) as i16;
    const COEFFS: [i16; 6] = [23_171, 11_574, -2_901, 1_592, -1_002, 336];

    let mut acc = COEFFS[5];
    acc = COEFFS[4].wrapping_add(mult16_16_q15(n, acc));
    acc = COEFFS[3].wrapping_add(mult16_16_q15(n, acc));
    acc = COEFFS[2].wrapping_add(mult16_16_q15(n, acc));
    acc = COEFFS[1].wrapping_add(mult16_16_q15(n, acc));
    let result = add32(i32::from(COEFFS[0]), i32::from(mult16_16_q15(n, acc)));
    vshr32(result, 7 - k)
}

/// Fixed-point reciprocal approximation for positive inputs.
pub(crate) fn celt_rcp(x: i32) -> i32 {
    debug_assert!(x > 0);

    let i = celt_ilog2(x);
    let n = (vshr32(x, i - 15) - 32_768) as i16;
    let mut r = 30_840i16.wrapping_add(mult16_16_q15(-15_420, n));

    // Two Newton iterations in Q15.
    let err = mult16_16_q15(r, n).wrapping_add(r.wrapping_add(-32_768));
    r = r.wrapping_sub(mult16_16_q15(r, err));
    let err = mult16_16_q15(r, n).wrapping_add(r.wrapping_add(-32_768));
    r = r.wrapping_sub(1i16.wrapping_add(mult16_16_q15(r, err)));

    vshr32(i32::from(r), i - 16)
}

/// Divides two Q32 values, returning the quotient in Q29.
pub(crate) fn frac_div32_q29(a: i32, b: i32) -> i32 {
    debug_assert!(b != 0);

    let shift = celt_ilog2(b) - 29;
    let a = vshr32(a, shift);
    let b = vshr32(b, shift);
    let rcp = pshr32(celt_rcp(pshr32(b, 16)), 3) as i16;
    let mut result = mult16_32_q15(rcp, a);
    let rem = sub32(pshr32(a, 2), mult32_32_q31(result, b));
    result = add32(result, shl32(mult16_32_q15(rcp, rem), 2));
    result
}

/// Saturated fractional division: the quotient of two same-Q values in Q31.
pub(crate) fn frac_div32(a: i32, b: i32) -> i32 {
    let result = frac_div32_q29(a, b);
    if result >= 536_870_912 {
        2_147_483_647
    } else if result <= -536_870_912 {
        -2_147_483_647
    } else {
        shl32(result, 2)
    }
}
