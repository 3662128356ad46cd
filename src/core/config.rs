use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::edgar::filing::{EDGAR_ARCHIVES_URL, EDGAR_DATA_URL, USER_AGENT};
use crate::edgar::{Endpoints, ReportType};

#[derive(Clone, Debug)]
pub struct HoldingsConfig {
    pub user_agent: String,
    pub bind_addr: SocketAddr,
    pub endpoints: Endpoints,
    pub form_type: ReportType,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub http_timeout: Option<Duration>,
}

impl HoldingsConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user_agent = get("USER_AGENT").unwrap_or_else(|| USER_AGENT.to_string());

        let bind_addr = get("HOLDINGS_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .context("HOLDINGS_BIND_ADDR must be a socket address like 127.0.0.1:3000")?;

        let data_url = parse_url(get("EDGAR_DATA_URL"), EDGAR_DATA_URL, "EDGAR_DATA_URL")?;
        let archives_url =
            parse_url(get("EDGAR_ARCHIVES_URL"), EDGAR_ARCHIVES_URL, "EDGAR_ARCHIVES_URL")?;

        let form_type = match get("HOLDINGS_FORM_TYPE") {
            Some(raw) => ReportType::from_str(raw.trim()).unwrap_or_else(|never| match never {}),
            None => ReportType::default(),
        };

        let rate_limit_max = parse_number(get("HOLDINGS_RATE_LIMIT_MAX"), 5, "HOLDINGS_RATE_LIMIT_MAX")?;
        if rate_limit_max == 0 {
            return Err(anyhow!("HOLDINGS_RATE_LIMIT_MAX must be at least 1"));
        }
        let window_secs = parse_number(
            get("HOLDINGS_RATE_LIMIT_WINDOW_SECS"),
            10,
            "HOLDINGS_RATE_LIMIT_WINDOW_SECS",
        )?;
        let timeout_secs = parse_number(
            get("HOLDINGS_HTTP_TIMEOUT_SECS"),
            30,
            "HOLDINGS_HTTP_TIMEOUT_SECS",
        )?;

        Ok(Self {
            user_agent,
            bind_addr,
            endpoints: Endpoints {
                data_url,
                archives_url,
            },
            form_type,
            rate_limit_max,
            rate_limit_window: Duration::from_secs(window_secs as u64),
            // 0 disables the timeout entirely
            http_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs as u64)),
        })
    }
}

fn parse_url(raw: Option<String>, default: &str, key: &str) -> Result<Url> {
    let raw = raw.unwrap_or_else(|| default.to_string());
    Url::parse(&raw).with_context(|| format!("{} is not a valid URL: {}", key, raw))
}

fn parse_number(raw: Option<String>, default: usize, key: &str) -> Result<usize> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{} must be a non-negative integer, got {}", key, raw)),
        None => Ok(default),
    }
}
