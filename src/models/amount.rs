use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Absolute tolerance for comparing amounts that went through the ledger's
/// textual storage more than once.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,

    #[error("Amount is not a number: {0}")]
    NotANumber(String),

    #[error("Amount is not finite")]
    NotFinite,
}

/// A money amount in the gym's currency.
///
/// The ledger hands amounts back as JSON numbers or as locale-formatted text
/// (`"1 000,50"`, `"1000.50"`); every read goes through [`Amount::from_cell`]
/// so nothing untyped leaves the ledger gateway.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(f64);

impl Amount {
    pub fn new(value: f64) -> Result<Self, AmountError> {
        if value.is_finite() {
            Ok(Self(value))
        } else {
            Err(AmountError::NotFinite)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Parses user- or ledger-supplied text, tolerating thousands separators,
    /// spaces and decimal commas.
    pub fn parse(text: &str) -> Result<Self, AmountError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(AmountError::Empty);
        }
        let value = normalized
            .parse::<f64>()
            .map_err(|_| AmountError::NotANumber(text.trim().to_string()))?;
        Self::new(value)
    }

    pub fn from_cell(cell: &Value) -> Result<Self, AmountError> {
        match cell {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| AmountError::NotANumber(n.to_string()))
                .and_then(Self::new),
            Value::String(s) => Self::parse(s),
            Value::Null => Err(AmountError::Empty),
            other => Err(AmountError::NotANumber(other.to_string())),
        }
    }

    /// Amounts are stored as numbers so the sheet keeps them numeric.
    pub fn to_cell(self) -> Value {
        if self.is_whole() && self.0.abs() < 9.0e15 {
            Value::from(self.0 as i64)
        } else {
            serde_json::Number::from_f64(self.0)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
    }

    pub fn is_whole(self) -> bool {
        self.0.fract() == 0.0
    }

    pub fn exactly_matches(self, other: Amount) -> bool {
        self.0 == other.0
    }

    pub fn approx_matches(self, other: Amount) -> bool {
        (self.0 - other.0).abs() < AMOUNT_TOLERANCE
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value as f64)
    }
}

/// Renders whole amounts without a trailing `.0`, so `8000.0` and `"8000"`
/// produce the same text.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0.0 {
            // avoid "-0"
            return write!(f, "0");
        }
        write!(f, "{}", self.0)
    }
}

fn normalize(text: &str) -> String {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    match (compact.rfind(','), compact.rfind('.')) {
        // "1.000,50"
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        // "1,000.50"
        (Some(_), Some(_)) => compact.replace(',', ""),
        // "1,000,000"
        (Some(_), None) if compact.matches(',').count() > 1 => compact.replace(',', ""),
        // "1000,5"
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locale_formats_parse_to_same_value() {
        let expected = Amount::new(1000.5).unwrap();
        for text in ["1 000,50", "1000.50", "1000,5", "1,000.50", "1.000,50", "1\u{a0}000,50"] {
            assert_eq!(Amount::parse(text).unwrap(), expected, "{}", text);
        }
        assert_eq!(Amount::from_cell(&json!(1000.5)).unwrap(), expected);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(Amount::parse("   "), Err(AmountError::Empty));
        assert!(matches!(
            Amount::parse("eight thousand"),
            Err(AmountError::NotANumber(_))
        ));
        assert_eq!(Amount::parse("inf"), Err(AmountError::NotFinite));
        assert_eq!(Amount::from_cell(&Value::Null), Err(AmountError::Empty));
        assert!(Amount::from_cell(&json!(true)).is_err());
    }

    #[test]
    fn test_display_drops_trailing_zero_fraction() {
        assert_eq!(Amount::new(8000.0).unwrap().to_string(), "8000");
        assert_eq!(Amount::new(1000.5).unwrap().to_string(), "1000.5");
        assert_eq!(Amount::parse("8 000").unwrap().to_string(), "8000");
    }

    #[test]
    fn test_approximate_match_absorbs_rounding() {
        let a = Amount::new(1000.5).unwrap();
        let b = Amount::new(1000.5 + 0.004).unwrap();
        assert!(!a.exactly_matches(b));
        assert!(a.approx_matches(b));
        assert!(!a.approx_matches(Amount::new(1000.6).unwrap()));
    }

    #[test]
    fn test_to_cell_keeps_whole_amounts_integral() {
        assert_eq!(Amount::new(8000.0).unwrap().to_cell(), json!(8000));
        assert_eq!(Amount::new(12.25).unwrap().to_cell(), json!(12.25));
    }
}
