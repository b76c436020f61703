use crate::error::TesseraError;
use serde::{Deserialize, Serialize};

/// Fallback currency for local rows created before currency capture existed.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Monetary amount in minor units (cents) with its ISO currency code.
///
/// The remote platform ships amounts as decimal strings; everything inside
/// this layer works in minor units so aggregate arithmetic stays exact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount_minor: u64,
    pub currency: String,
}

impl Money {
    pub fn new(amount_minor: u64, currency: impl Into<String>) -> Self {
        Self {
            amount_minor,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }

    /// Decimal string form the remote platform understands, e.g. `"450.00"`.
    pub fn to_decimal_string(&self) -> String {
        format_minor_decimal(self.amount_minor)
    }
}

/// Parse a non-negative decimal string ("450", "450.5", "450.00") into minor
/// units, assuming a two-digit currency exponent.
pub fn parse_decimal_minor(value: &str) -> Result<u64, TesseraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(invalid_amount(value));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid_amount(value));
    }
    if frac.len() > 2 {
        return Err(invalid_amount(value));
    }

    let whole_minor = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .map_err(|_| invalid_amount(value))?
            .checked_mul(100)
            .ok_or_else(|| invalid_amount(value))?
    };

    let frac_minor = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<2}");
        padded.parse::<u64>().map_err(|_| invalid_amount(value))?
    };

    whole_minor
        .checked_add(frac_minor)
        .ok_or_else(|| invalid_amount(value))
}

pub fn format_minor_decimal(amount_minor: u64) -> String {
    format!("{}.{:02}", amount_minor / 100, amount_minor % 100)
}

fn invalid_amount(value: &str) -> TesseraError {
    TesseraError::Serialization(format!("invalid monetary amount '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_remote_shapes() {
        assert_eq!(parse_decimal_minor("450.00").unwrap(), 45_000);
        assert_eq!(parse_decimal_minor("450").unwrap(), 45_000);
        assert_eq!(parse_decimal_minor("450.5").unwrap(), 45_050);
        assert_eq!(parse_decimal_minor("0.07").unwrap(), 7);
        assert_eq!(parse_decimal_minor(".50").unwrap(), 50);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", "-1", "+3", "1.234", "12,50", "abc", "."] {
            assert!(parse_decimal_minor(bad).is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn formats_back_to_two_decimals() {
        assert_eq!(format_minor_decimal(45_000), "450.00");
        assert_eq!(format_minor_decimal(7), "0.07");
        assert_eq!(Money::new(120_505, "USD").to_decimal_string(), "1205.05");
    }
}
