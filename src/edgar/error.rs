use thiserror::Error;

use super::report::ReportType;

/// Everything that can end a fetch action. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Failed to fetch JSON data. Status code: {0}")]
    IndexFetchFailed(u16),
    #[error("No {0} filings found.")]
    NoMatchingFiling(ReportType),
    #[error("Failed to fetch XML. Status code: {0}")]
    DocumentFetchFailed(u16),
    #[error("Malformed submissions index: {0}")]
    MalformedIndex(String),
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    /// `NoMatchingFiling` is informational rather than a failure of the service.
    pub fn is_informational(&self) -> bool {
        matches!(self, FetchError::NoMatchingFiling(_))
    }
}
