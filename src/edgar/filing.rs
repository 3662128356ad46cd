use serde::Deserialize;
use url::Url;

use super::cik::Cik;
use super::error::FetchError;
use super::report::ReportType;
use crate::utils::http::Transport;

pub const EDGAR_DATA_URL: &str = "https://data.sec.gov";
pub const EDGAR_ARCHIVES_URL: &str = "https://www.sec.gov";
pub const USER_AGENT: &str = "software@example.com";
pub const PRIMARY_DOCUMENT: &str = "primary_doc.xml";

/// Base URLs of the two EDGAR hosts the pipeline talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub data_url: Url,
    pub archives_url: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            data_url: Url::parse(EDGAR_DATA_URL).expect("static URL"),
            archives_url: Url::parse(EDGAR_ARCHIVES_URL).expect("static URL"),
        }
    }
}

impl Endpoints {
    pub fn submissions_url(&self, cik: &Cik) -> Result<Url, FetchError> {
        join(
            &self.data_url,
            &format!("submissions/CIK{}.json", cik.padded()),
        )
    }

    pub fn primary_document_url(&self, cik: &Cik, accession: &str) -> Result<Url, FetchError> {
        join(
            &self.archives_url,
            &format!(
                "Archives/edgar/data/{}/{}/{}",
                cik.padded(),
                accession,
                PRIMARY_DOCUMENT
            ),
        )
    }
}

fn join(base: &Url, path: &str) -> Result<Url, FetchError> {
    let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&raw).map_err(|e| FetchError::Request {
        url: raw.clone(),
        reason: e.to_string(),
    })
}

/// Only the slice of the submissions JSON the resolver reads. Missing levels
/// default to empty so an institution without filings reads as "no match".
#[derive(Debug, Default, Deserialize)]
pub struct CompanyFilings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filings: FilingsData,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilingsData {
    #[serde(default)]
    pub recent: FilingEntry,
}

/// Parallel lists, one position per filing, most recent first.
#[derive(Debug, Default, Deserialize)]
pub struct FilingEntry {
    #[serde(rename = "form", default)]
    pub report_type: Vec<ReportType>,
    #[serde(rename = "accessionNumber", default)]
    pub accession_number: Vec<String>,
}

/// One filing picked out of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filing {
    pub report_type: ReportType,
    pub accession_number: String,
}

impl Filing {
    /// Accession number as it appears in archive paths.
    pub fn accession_path(&self) -> String {
        self.accession_number.replace('-', "")
    }
}

/// Where a resolved filing's primary document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub cik: Cik,
    pub filing: Filing,
    pub url: Url,
}

impl FilingEntry {
    /// First position whose form label equals `target`. Index order is trusted
    /// as most-recent-first; nothing is re-sorted here.
    pub fn latest(&self, target: &ReportType) -> Result<Option<Filing>, FetchError> {
        let Some(position) = self.report_type.iter().position(|form| form == target) else {
            return Ok(None);
        };

        let accession_number = self.accession_number.get(position).ok_or_else(|| {
            FetchError::MalformedIndex(format!(
                "no accession number at position {} ({} forms, {} accession numbers)",
                position,
                self.report_type.len(),
                self.accession_number.len()
            ))
        })?;

        Ok(Some(Filing {
            report_type: target.clone(),
            accession_number: accession_number.clone(),
        }))
    }
}

pub async fn get_company_filings(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    cik: &Cik,
) -> Result<CompanyFilings, FetchError> {
    let url = endpoints.submissions_url(cik)?;
    log::info!("Fetching company filings from {}", url);

    let response = transport.get(&url).await.map_err(|e| FetchError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !response.is_success() {
        log::error!("Submissions index request failed with status {}", response.status);
        return Err(FetchError::IndexFetchFailed(response.status));
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| FetchError::MalformedIndex(format!("failed to parse filings JSON: {}", e)))
}

/// Turns a CIK into the location of its latest `target` filing's primary document.
pub async fn resolve(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    cik: &Cik,
    target: &ReportType,
) -> Result<DocumentLocation, FetchError> {
    let company = get_company_filings(transport, endpoints, cik).await?;

    let filing = company
        .filings
        .recent
        .latest(target)?
        .ok_or_else(|| FetchError::NoMatchingFiling(target.clone()))?;

    log::info!(
        "Latest {} for CIK {} ({}): {}",
        target,
        cik.padded(),
        company.name.as_deref().unwrap_or("unknown"),
        filing.accession_number
    );

    let url = endpoints.primary_document_url(cik, &filing.accession_path())?;

    Ok(DocumentLocation {
        cik: cik.clone(),
        filing,
        url,
    })
}
