//! Amount validation and base-unit conversion.
//!
//! Human-entered amounts stay decimal strings until decimals are resolved,
//! then convert once into integer base units. Floating point is never
//! involved.

use crate::error::ValidationError;
use alloy::primitives::{
    U256,
    utils::{ParseUnits, parse_units},
};

/// Converts a positive decimal string into base units at the given precision.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidAmount {
        input: amount.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty amount"));
    }
    let parsed =
        parse_units(trimmed, decimals).map_err(|err| invalid(&err.to_string()))?;
    let value = match parsed {
        ParseUnits::U256(value) => value,
        ParseUnits::I256(_) => return Err(invalid("amount must be positive")),
    };
    if value.is_zero() {
        return Err(invalid("amount must be greater than zero"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_at_native_precision() {
        assert_eq!(
            to_base_units("0.01", 18).unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
    }

    #[test]
    fn converts_at_token_precision() {
        assert_eq!(to_base_units("100.5", 6).unwrap(), U256::from(100_500_000u64));
        assert_eq!(to_base_units("1", 0).unwrap(), U256::from(1u64));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for input in ["", "   ", "abc", "1.2.3", "-1", "0", "0.0", "1,5"] {
            assert!(to_base_units(input, 18).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn rejects_excess_fractional_digits() {
        assert!(to_base_units("0.1234567", 6).is_err());
        assert!(to_base_units("0.123456", 6).is_ok());
    }

    #[test]
    fn rejects_overflow() {
        let huge = "9".repeat(80);
        assert!(to_base_units(&huge, 18).is_err());
    }
}
