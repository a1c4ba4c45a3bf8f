//! Rebase-safe share arithmetic.
//!
//! A reward promise is stored as a *share* of the reward token's total
//! supply rather than a nominal amount, so a rebase from `S` to `S'`
//! scales every outstanding promise by `S'/S` automatically:
//!
//! - `share_of(amount, supply) = amount * PRECISION / supply`
//! - `amount_of(share, supply) = share * supply / PRECISION`
//!
//! Products of two 18-decimal quantities routinely exceed `u128`, so
//! [`mul_div`] computes `a * b / d` through a 256-bit intermediate and
//! only fails when the final quotient itself does not fit.

use crate::constants::PRECISION;
use crate::error::MathError;

/// Full 256-bit product of two `u128` values as `(high, low)` words.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Middle column: carries out of bit 128 land in the high word.
    let (mid, mid_carry) = lh.overflowing_add(hl);
    let (low, low_carry) = ll.overflowing_add(mid << 64);
    let high = hh
        + (mid >> 64)
        + ((mid_carry as u128) << 64)
        + low_carry as u128;
    (high, low)
}

/// Quotient and remainder of `a * b / denom`.
fn mul_div_rem(a: u128, b: u128, denom: u128) -> Result<(u128, u128), MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok((product / denom, product % denom));
    }

    let (high, low) = widening_mul(a, b);
    if high >= denom {
        return Err(MathError::ArithmeticOverflow);
    }

    // Binary long division of the 256-bit product. `rem < denom` holds at the
    // top of every iteration, so one conditional subtraction suffices.
    let mut rem = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= denom {
            rem = rem.wrapping_sub(denom);
            quotient |= 1;
        }
    }
    Ok((quotient, rem))
}

/// Compute `a * b / denom` (floor) without intermediate overflow.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `denom == 0`
/// - [`MathError::ArithmeticOverflow`] if the quotient exceeds `u128::MAX`
///
/// # Examples
///
/// ```
/// use ebb_core::math::mul_div;
/// assert_eq!(mul_div(6, 7, 4).unwrap(), 10);
/// // 1e27 * 1e18 overflows u128, the quotient does not.
/// let big = 10u128.pow(27);
/// assert_eq!(mul_div(big, 10u128.pow(18), 10u128.pow(18)).unwrap(), big);
/// ```
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    mul_div_rem(a, b, denom).map(|(q, _)| q)
}

/// Compute `a * b / denom`, rounding up.
pub fn mul_div_up(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    let (q, rem) = mul_div_rem(a, b, denom)?;
    if rem == 0 {
        Ok(q)
    } else {
        q.checked_add(1).ok_or(MathError::ArithmeticOverflow)
    }
}

/// Multiply two 18-decimal fixed-point values.
pub fn mul_fixed(a: u128, b: u128) -> Result<u128, MathError> {
    mul_div(a, b, PRECISION)
}

/// Convert an absolute token amount into a share of `supply`.
///
/// # Errors
///
/// [`MathError::ZeroSupply`] when `supply == 0`.
pub fn share_of(amount: u128, supply: u128) -> Result<u128, MathError> {
    if supply == 0 {
        return Err(MathError::ZeroSupply);
    }
    mul_div(amount, PRECISION, supply)
}

/// Convert a share of supply back into an absolute token amount at `supply`.
///
/// # Examples
///
/// ```
/// use ebb_core::constants::TOKEN;
/// use ebb_core::math::{amount_of, share_of};
/// let supply = 1_000_000 * TOKEN;
/// let share = share_of(10 * TOKEN, supply).unwrap();
/// // Supply doubles: the same share is worth twice the tokens.
/// assert_eq!(amount_of(share, 2 * supply).unwrap(), 20 * TOKEN);
/// ```
pub fn amount_of(share: u128, supply: u128) -> Result<u128, MathError> {
    mul_div(share, supply, PRECISION)
}

/// [`amount_of`] rounded up. Tokens pulled into an engine to back `share`
/// are sized this way, so the holding never falls below the share at any
/// later supply.
pub fn amount_of_up(share: u128, supply: u128) -> Result<u128, MathError> {
    mul_div_up(share, supply, PRECISION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOKEN;
    use proptest::prelude::*;

    #[test]
    fn widening_mul_small() {
        assert_eq!(widening_mul(3, 5), (0, 15));
    }

    #[test]
    fn widening_mul_max() {
        // (2^128 - 1)^2 = 2^256 - 2^129 + 1
        let (hi, lo) = widening_mul(u128::MAX, u128::MAX);
        assert_eq!(hi, u128::MAX - 1);
        assert_eq!(lo, 1);
    }

    #[test]
    fn widening_mul_power_of_two() {
        let (hi, lo) = widening_mul(1u128 << 100, 1u128 << 100);
        assert_eq!(hi, 1u128 << 72);
        assert_eq!(lo, 0);
    }

    #[test]
    fn mul_div_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_wide_path_exact() {
        let supply = 3 * 10u128.pow(27);
        let share = 7 * 10u128.pow(17);
        // share * supply overflows u128 (2.1e45).
        assert!(share.checked_mul(supply).is_none());
        assert_eq!(mul_div(share, supply, PRECISION).unwrap(), 21 * 10u128.pow(26));
    }

    #[test]
    fn mul_div_quotient_overflow() {
        assert_eq!(mul_div(u128::MAX, u128::MAX, 1), Err(MathError::ArithmeticOverflow));
        assert_eq!(mul_div(u128::MAX, 2, 2).unwrap(), u128::MAX);
    }

    #[test]
    fn mul_div_floor_on_wide_path() {
        let a = u128::MAX;
        let b = 3;
        // (2^128-1)*3 / 4 = floor(...)
        let expected = (u128::MAX / 4) * 3 + ((u128::MAX % 4) * 3) / 4;
        assert_eq!(mul_div(a, b, 4).unwrap(), expected);
    }

    #[test]
    fn mul_div_up_rounds_only_inexact() {
        assert_eq!(mul_div_up(6, 7, 4).unwrap(), 11);
        assert_eq!(mul_div_up(6, 8, 4).unwrap(), 12);
        assert_eq!(mul_div_up(u128::MAX, 3, 3).unwrap(), u128::MAX);
        assert_eq!(mul_div_up(u128::MAX, u128::MAX, u128::MAX - 1), Err(MathError::ArithmeticOverflow));
    }

    #[test]
    fn pulled_amount_covers_share_after_upward_rebase() {
        // An odd supply makes the share value fractional.
        let supply = 1_234_567 * TOKEN + 891;
        let share = 7 * 10u128.pow(12) + 3;
        let pulled = amount_of_up(share, supply).unwrap();
        assert_eq!(pulled, amount_of(share, supply).unwrap() + 1);
        // Value of the pulled tokens once the supply grows 2.31x.
        let grown = supply / 100 * 231;
        let held = mul_div(pulled, grown, supply).unwrap();
        assert!(held >= amount_of(share, grown).unwrap());
    }

    #[test]
    fn share_of_zero_supply() {
        assert_eq!(share_of(1, 0), Err(MathError::ZeroSupply));
    }

    #[test]
    fn share_roundtrip_at_fixed_supply() {
        let supply = 1_000_000 * TOKEN;
        let share = share_of(10 * TOKEN, supply).unwrap();
        assert_eq!(share, 10u128.pow(13));
        assert_eq!(amount_of(share, supply).unwrap(), 10 * TOKEN);
    }

    #[test]
    fn rebase_scales_amount() {
        let share = share_of(10 * TOKEN, 1_000_000 * TOKEN).unwrap();
        assert_eq!(amount_of(share, 2_000_000 * TOKEN).unwrap(), 20 * TOKEN);
        assert_eq!(amount_of(share, 500_000 * TOKEN).unwrap(), 5 * TOKEN);
    }

    #[test]
    fn mul_fixed_identity() {
        assert_eq!(mul_fixed(123_456, PRECISION).unwrap(), 123_456);
        assert_eq!(mul_fixed(PRECISION / 2, PRECISION / 2).unwrap(), PRECISION / 4);
    }

    proptest! {
        #[test]
        fn mul_div_matches_narrow_path(a in 0u128..(1u128 << 64), b in 0u128..(1u128 << 64), d in 1u128..u128::MAX) {
            prop_assert_eq!(mul_div(a, b, d).unwrap(), a * b / d);
        }

        #[test]
        fn mul_div_inverse_of_multiplication(a in 1u128..u128::MAX, b in 1u128..(1u128 << 64)) {
            // a * b / b == a, exercising the wide path whenever a * b overflows.
            prop_assert_eq!(mul_div(a, b, b).unwrap(), a);
        }

        #[test]
        fn rounding_up_adds_at_most_one(a in 0u128..u128::MAX, b in 0u128..(1u128 << 64), d in 1u128..u128::MAX) {
            if let (Ok(down), Ok(up)) = (mul_div(a, b, d), mul_div_up(a, b, d)) {
                prop_assert!(up == down || up == down + 1);
            }
        }

        #[test]
        fn amount_never_exceeds_original(amount in 0u128..(1u128 << 64), supply in 1u128..(1u128 << 100)) {
            let share = share_of(amount, supply).unwrap();
            prop_assert!(amount_of(share, supply).unwrap() <= amount);
        }
    }
}
