// =============================================================================
// StockCode — fixed 6-digit numeric identifier, validated at every boundary
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated 6-digit Korean equity ticker. Construction is the only place
/// validity is checked; once built, every consumer can trust the shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StockCode(String);

impl StockCode {
    /// Validate and wrap a raw string. Rejects anything that is not exactly
    /// six ASCII digits.
    pub fn new(raw: impl Into<String>) -> Result<Self, StockCodeError> {
        let raw = raw.into();
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StockCodeError::InvalidFormat(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StockCode {
    type Error = StockCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StockCode> for String {
    fn from(code: StockCode) -> Self {
        code.0
    }
}

impl fmt::Display for StockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StockCodeError {
    #[error("stock code must be exactly 6 ASCII digits, got {0:?}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digits() {
        assert!(StockCode::new("005930").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(StockCode::new("5930").is_err());
        assert!(StockCode::new("00059300").is_err());
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(StockCode::new("00593A").is_err());
    }

    #[test]
    fn roundtrips_through_json() {
        let code = StockCode::new("000660").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"000660\"");
        let back: StockCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }

    #[test]
    fn rejects_invalid_json() {
        let result: Result<StockCode, _> = serde_json::from_str("\"12AB56\"");
        assert!(result.is_err());
    }
}
