use std::sync::Arc;

use crate::edgar::{Cik, FetchError, FilingHoldings, ReportType};

/// What the web layer needs from the data side.
#[async_trait::async_trait]
pub trait HoldingsBackend: Send + Sync {
    /// Latest holdings for `cik`, memoized across calls.
    async fn fetch_holdings(&self, cik: &Cik) -> Result<Arc<FilingHoldings>, FetchError>;

    /// Forgets every memoized result, returning how many were dropped.
    fn clear_cache(&self) -> usize;

    fn form_type(&self) -> &ReportType;
}
