use serde::{Deserialize, Serialize};

/// One `invstOrSec` line item. Fields are kept as document text; a missing
/// child element is `None`, never a dropped record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub title: Option<String>,
    pub cusip: Option<String>,
    pub balance: Option<String>,
    pub value: Option<String>,
}

impl Holding {
    /// Market value in USD, if the text reads as a finite number.
    pub fn value_usd(&self) -> Option<f64> {
        self.value.as_deref().and_then(parse_number)
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Something the tolerant parser had to work around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub position: Option<u64>,
}

impl ParseDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: u64) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} (byte {})", self.message, position),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHoldings {
    pub holdings: Vec<Holding>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedHoldings {
    /// True when the strict parse succeeded and nothing had to be recovered.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion() {
        assert_eq!(parse_number("10000"), Some(10000.0));
        assert_eq!(parse_number(" 1.5E3 "), Some(1500.0));
        assert_eq!(parse_number("-250.75"), Some(-250.75));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn missing_value_is_not_numeric() {
        let holding = Holding {
            title: Some("Cash".to_string()),
            ..Default::default()
        };
        assert_eq!(holding.value_usd(), None);
    }
}
