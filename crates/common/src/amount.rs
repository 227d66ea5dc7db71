//! Decimal Amount Codec
//!
//! Converts user-entered decimal strings into smallest-unit [`Amount`]s and
//! back, using integer arithmetic only.
//!
//! ## Accepted Input
//!
//! ```text
//! "1"      -> 1 * 10^d
//! "1.5"    -> 15 * 10^(d-1)
//! ".5"     -> 5 * 10^(d-1)
//! "2."     -> 2 * 10^d
//! " 3 "    -> surrounding whitespace is trimmed
//! ```
//!
//! Rejected: empty input, a lone `.`, signs (`-1`, `+1`), exponents, any
//! non-digit character, more fractional digits than the token has decimals,
//! and values that overflow 256 bits. Nothing is ever coerced to zero.

use thiserror::Error;

use crate::types::Amount;

/// Decimals of the native token (ether / wei).
pub const NATIVE_DECIMALS: u8 = 18;

/// Reasons an amount string is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative: '{0}'")]
    Negative(String),

    #[error("malformed decimal amount: '{0}'")]
    Malformed(String),

    #[error("too many fractional digits in '{input}' (max {max})")]
    TooPrecise { input: String, max: u8 },

    #[error("amount out of range: '{0}'")]
    Overflow(String),

    #[error("amount must be greater than zero")]
    Zero,
}

/// Parses a non-negative decimal string into the smallest unit with
/// `decimals` fractional digits.
pub fn parse_units(input: &str, decimals: u8) -> Result<Amount, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_string()));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooPrecise {
            input: trimmed.to_string(),
            max: decimals,
        });
    }

    let overflow = || AmountError::Overflow(trimmed.to_string());

    // Digits of the whole part followed by the fraction right-padded to
    // `decimals` digits form the smallest-unit integer.
    let padding = usize::from(decimals) - fraction.len();
    let ten = Amount::from(10u64);
    let mut value = Amount::ZERO;
    for b in whole.bytes().chain(fraction.bytes()) {
        value = value
            .checked_mul(ten)
            .and_then(|v| v.checked_add(Amount::from(u64::from(b - b'0'))))
            .ok_or_else(overflow)?;
    }
    for _ in 0..padding {
        value = value.checked_mul(ten).ok_or_else(overflow)?;
    }

    Ok(value)
}

/// [`parse_units`] that also rejects zero, for value-bearing sends.
pub fn parse_nonzero_units(input: &str, decimals: u8) -> Result<Amount, AmountError> {
    let value = parse_units(input, decimals)?;
    if value == Amount::ZERO {
        return Err(AmountError::Zero);
    }
    Ok(value)
}

/// [`parse_units`] with the native token's 18 decimals.
pub fn parse_ether(input: &str) -> Result<Amount, AmountError> {
    parse_units(input, NATIVE_DECIMALS)
}

/// Renders a smallest-unit amount as a decimal string, dropping trailing
/// fractional zeros (`1500000000000000000` with 18 decimals is `"1.5"`).
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// [`format_units`] with the native token's 18 decimals.
pub fn format_ether(amount: Amount) -> String {
    format_units(amount, NATIVE_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(s: &str) -> Amount {
        let mut v = Amount::ZERO;
        for b in s.bytes() {
            v = v * Amount::from(10u64) + Amount::from(u64::from(b - b'0'));
        }
        v
    }

    #[test]
    fn one_and_a_half_ether_is_exact() {
        assert_eq!(parse_ether("1.5"), Ok(wei("1500000000000000000")));
    }

    #[test]
    fn full_precision_fraction() {
        assert_eq!(parse_ether("0.000000000000000001"), Ok(Amount::from(1u64)));
        assert_eq!(
            parse_ether("123456789.123456789123456789"),
            Ok(wei("123456789123456789123456789"))
        );
    }

    #[test]
    fn accepted_shapes() {
        assert_eq!(parse_ether(".5"), Ok(wei("500000000000000000")));
        assert_eq!(parse_ether("2."), Ok(wei("2000000000000000000")));
        assert_eq!(parse_ether(" 3 "), Ok(wei("3000000000000000000")));
        assert_eq!(parse_ether("0"), Ok(Amount::ZERO));
        assert_eq!(parse_units("42", 0), Ok(Amount::from(42u64)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_ether(""), Err(AmountError::Empty));
        assert_eq!(parse_ether("   "), Err(AmountError::Empty));
        assert!(matches!(parse_ether("-1"), Err(AmountError::Negative(_))));
        assert!(matches!(parse_ether("+1"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_ether("."), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_ether("1e5"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_ether("1.2.3"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_ether("abc"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_ether("1 000"), Err(AmountError::Malformed(_))));
    }

    #[test]
    fn nonzero_parse() {
        assert_eq!(parse_nonzero_units("0.0", 18), Err(AmountError::Zero));
        assert_eq!(parse_nonzero_units("0.1", 1), Ok(Amount::from(1u64)));
        assert!(matches!(parse_nonzero_units("x", 18), Err(AmountError::Malformed(_))));
    }

    #[test]
    fn rejects_excess_precision() {
        let err = parse_ether("0.0000000000000000001");
        assert!(matches!(err, Err(AmountError::TooPrecise { max: 18, .. })));
        assert!(matches!(parse_units("1.5", 0), Err(AmountError::TooPrecise { .. })));
    }

    #[test]
    fn rejects_overflow() {
        let huge = "9".repeat(80);
        assert!(matches!(parse_ether(&huge), Err(AmountError::Overflow(_))));
    }

    #[test]
    fn formats_back_to_trimmed_decimal() {
        assert_eq!(format_ether(wei("1500000000000000000")), "1.5");
        assert_eq!(format_ether(wei("2000000000000000000")), "2");
        assert_eq!(format_ether(Amount::from(1u64)), "0.000000000000000001");
        assert_eq!(format_ether(Amount::ZERO), "0");
        assert_eq!(format_units(Amount::from(1234u64), 2), "12.34");
        assert_eq!(format_units(Amount::from(7u64), 0), "7");
    }
}
