use std::sync::Arc;

use super::config::HoldingsConfig;
use super::types::HoldingsBackend;
use crate::edgar::{Cik, FetchError, FilingHoldings, HoldingsCache, HoldingsClient, ReportType};
use crate::utils::http::{ReqwestTransport, Transport};

pub struct HoldingsService {
    client: HoldingsClient,
    cache: HoldingsCache,
}

impl HoldingsService {
    pub fn new(client: HoldingsClient) -> Self {
        Self {
            client,
            cache: HoldingsCache::new(),
        }
    }

    pub fn from_config(config: &HoldingsConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(&config.user_agent, config.http_timeout)?);
        Ok(Self::new(HoldingsClient::new(
            transport,
            config.endpoints.clone(),
            config.form_type.clone(),
        )))
    }

    pub fn cache(&self) -> &HoldingsCache {
        &self.cache
    }
}

#[async_trait::async_trait]
impl HoldingsBackend for HoldingsService {
    async fn fetch_holdings(&self, cik: &Cik) -> Result<Arc<FilingHoldings>, FetchError> {
        self.cache
            .get_or_fetch(cik, || self.client.fetch_holdings(cik))
            .await
    }

    fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    fn form_type(&self) -> &ReportType {
        self.client.form_type()
    }
}
