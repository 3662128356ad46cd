pub mod cache;
pub mod cik;
pub mod error;
pub mod filing;
pub mod parsing;
pub mod report;

use std::sync::Arc;

pub use cache::HoldingsCache;
pub use cik::{validate, Cik, ValidationError};
pub use error::FetchError;
pub use filing::{DocumentLocation, Endpoints, Filing};
pub use parsing::{Holding, ParseDiagnostic, ParsedHoldings};
pub use report::ReportType;

use crate::utils::http::Transport;

/// Holdings of one resolved filing, plus whatever the parser had to recover from.
#[derive(Debug, Clone)]
pub struct FilingHoldings {
    pub location: DocumentLocation,
    pub holdings: Vec<Holding>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// The stateless resolve-then-parse pipeline.
#[derive(Clone)]
pub struct HoldingsClient {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    form_type: ReportType,
}

impl HoldingsClient {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, form_type: ReportType) -> Self {
        Self {
            transport,
            endpoints,
            form_type,
        }
    }

    pub fn form_type(&self) -> &ReportType {
        &self.form_type
    }

    pub async fn resolve(&self, cik: &Cik) -> Result<DocumentLocation, FetchError> {
        filing::resolve(self.transport.as_ref(), &self.endpoints, cik, &self.form_type).await
    }

    pub async fn parse(&self, location: &DocumentLocation) -> Result<ParsedHoldings, FetchError> {
        log::info!("Fetching primary document from {}", location.url);

        let response = self
            .transport
            .get(&location.url)
            .await
            .map_err(|e| FetchError::Request {
                url: location.url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            log::error!("Primary document request failed with status {}", response.status);
            return Err(FetchError::DocumentFetchFailed(response.status));
        }

        let parsed = parsing::parse_holdings(&response.body);
        for diagnostic in &parsed.diagnostics {
            log::warn!("{}: {}", location.url, diagnostic);
        }
        log::info!(
            "Parsed {} holdings from {}",
            parsed.holdings.len(),
            location.filing.accession_number
        );

        Ok(parsed)
    }

    pub async fn fetch_holdings(&self, cik: &Cik) -> Result<FilingHoldings, FetchError> {
        let location = self.resolve(cik).await?;
        let parsed = self.parse(&location).await?;
        Ok(FilingHoldings {
            location,
            holdings: parsed.holdings,
            diagnostics: parsed.diagnostics,
        })
    }
}
