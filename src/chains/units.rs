//! Base units to decimal strings over `U256`, without floating point.

use ethers::types::U256;
use ethers::utils::{self, ConversionError};

/// Formats `value` base units with `decimals` implied decimals, showing exactly
/// `display` fractional digits. Extra digits are truncated.
///
/// `format_units(123_456_789u64, 8, 8) == Ok("1.23456789")`
pub fn format_units<T: Into<U256>>(value: T, decimals: u32, display: u32) -> Result<String, ConversionError> {
    let (whole, mut fraction) = split(value.into(), decimals)?;
    if display == 0 {
        return Ok(whole);
    }

    let display = display as usize;
    if fraction.len() > display {
        fraction.truncate(display);
    } else {
        fraction.extend(std::iter::repeat('0').take(display - fraction.len()));
    }
    Ok(format!("{}.{}", whole, fraction))
}

/// Like [`format_units`] with every significant digit kept and trailing zeros
/// dropped, leaving at least one fractional digit.
pub fn format_units_trimmed<T: Into<U256>>(value: T, decimals: u32) -> Result<String, ConversionError> {
    let (whole, fraction) = split(value.into(), decimals)?;
    let trimmed = fraction.trim_end_matches('0');
    if trimmed.is_empty() {
        Ok(format!("{}.0", whole))
    } else {
        Ok(format!("{}.{}", whole, trimmed))
    }
}

fn split(value: U256, decimals: u32) -> Result<(String, String), ConversionError> {
    let formatted = utils::format_units(value, decimals)?;
    Ok(match formatted.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), fraction.to_string()),
        None => (formatted, String::new()),
    })
}

/// Parses a `0x`-prefixed hex quantity as returned by Ethereum JSON-RPC.
pub fn parse_hex_quantity(quantity: &str) -> Option<U256> {
    let digits = quantity.strip_prefix("0x").or_else(|| quantity.strip_prefix("0X"))?;
    if digits.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_display_digits() {
        assert_eq!(format_units(123_456_789u64, 8, 8).unwrap(), "1.23456789");
        assert_eq!(format_units(0u64, 8, 8).unwrap(), "0.00000000");
        assert_eq!(format_units(5u64, 6, 6).unwrap(), "0.000005");
        assert_eq!(format_units(1_500_000u64, 6, 6).unwrap(), "1.500000");
    }

    #[test]
    fn wei_truncates_to_display_digits() {
        // 1.234567891234567891 ETH
        assert_eq!(format_units(1_234_567_891_234_567_891u64, 18, 8).unwrap(), "1.23456789");
        assert_eq!(format_units(999u64, 18, 8).unwrap(), "0.00000000");
    }

    #[test]
    fn values_beyond_u128_keep_every_digit() {
        let value = U256::one() << 128;
        assert_eq!(
            format_units(value, 18, 18).unwrap(),
            "340282366920938463463.374607431768211456"
        );
        assert_eq!(
            format_units(U256::MAX, 0, 0).unwrap(),
            U256::MAX.to_string()
        );
    }

    #[test]
    fn trimmed_output() {
        assert_eq!(format_units_trimmed(14_000u64, 8).unwrap(), "0.00014");
        assert_eq!(format_units_trimmed(100_000_000u64, 8).unwrap(), "1.0");
        assert_eq!(format_units_trimmed(0u64, 18).unwrap(), "0.0");
        assert_eq!(format_units_trimmed(7u64, 0).unwrap(), "7.0");
    }

    #[test]
    fn too_many_decimals_is_an_error() {
        assert!(format_units(1u64, 200, 8).is_err());
    }

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_hex_quantity("0x0"), Some(U256::zero()));
        assert_eq!(parse_hex_quantity("0x"), Some(U256::zero()));
        assert_eq!(
            parse_hex_quantity("0xde0b6b3a7640000"),
            Some(U256::exp10(18))
        );
        assert_eq!(
            parse_hex_quantity("0x100000000000000000000000000000000"),
            Some(U256::one() << 128)
        );
        assert_eq!(parse_hex_quantity("1234"), None);
        assert_eq!(parse_hex_quantity("0xzz"), None);
    }
}
