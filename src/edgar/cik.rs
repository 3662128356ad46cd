use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest identifier EDGAR hands out; shorter ones are zero-padded to this width.
pub const CIK_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid CIK input. Please enter digits only.")]
    InvalidFormat,
    #[error("Invalid CIK input. CIK should be 10 digits or less.")]
    TooLong,
}

/// A validated Central Index Key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cik(String);

impl Cik {
    pub fn new(input: &str) -> Result<Self, ValidationError> {
        validate(input)
    }

    /// The identifier as entered, minus surrounding whitespace.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Zero-padded form used in EDGAR paths and as the cache key.
    pub fn padded(&self) -> String {
        format!("{:0>width$}", self.0, width = CIK_WIDTH)
    }
}

impl AsRef<str> for Cik {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cik {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate(input: &str) -> Result<Cik, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat);
    }
    if trimmed.len() > CIK_WIDTH {
        return Err(ValidationError::TooLong);
    }
    Ok(Cik(trimmed.to_string()))
}
