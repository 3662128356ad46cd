use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Form type labels as they appear in `filings.recent.form`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum ReportType {
    FormNportP,
    FormNportPA,
    FormNportEx,
    FormNcsr,
    FormNcsrs,
    FormNcen,
    Form24F2NT,
    Form497K,
    Form485BPOS,
    Form10K,
    Form10Q,
    Form8K,
    Form13FHR,
    Other(String),
}

impl TryFrom<String> for ReportType {
    type Error = Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReportType::from_str(&s)
    }
}

impl From<ReportType> for String {
    fn from(report_type: ReportType) -> Self {
        report_type.to_string()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::FormNportP => write!(f, "NPORT-P"),
            ReportType::FormNportPA => write!(f, "NPORT-P/A"),
            ReportType::FormNportEx => write!(f, "NPORT-EX"),
            ReportType::FormNcsr => write!(f, "N-CSR"),
            ReportType::FormNcsrs => write!(f, "N-CSRS"),
            ReportType::FormNcen => write!(f, "N-CEN"),
            ReportType::Form24F2NT => write!(f, "24F-2NT"),
            ReportType::Form497K => write!(f, "497K"),
            ReportType::Form485BPOS => write!(f, "485BPOS"),
            ReportType::Form10K => write!(f, "10-K"),
            ReportType::Form10Q => write!(f, "10-Q"),
            ReportType::Form8K => write!(f, "8-K"),
            ReportType::Form13FHR => write!(f, "13F-HR"),
            ReportType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for ReportType {
    type Err = Infallible;

    /// Exact match on the EDGAR label; anything else is kept verbatim as `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ReportType::iter()
            .filter(|t| !matches!(t, ReportType::Other(_)))
            .find(|t| t.to_string() == s)
            .unwrap_or_else(|| ReportType::Other(s.to_string())))
    }
}

impl Default for ReportType {
    fn default() -> Self {
        ReportType::FormNportP
    }
}
