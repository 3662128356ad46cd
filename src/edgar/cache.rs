use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use super::cik::Cik;
use super::error::FetchError;
use super::FilingHoldings;

type Slot = Arc<OnceCell<Arc<FilingHoldings>>>;

/// Process-wide memo of successful fetches, keyed by zero-padded CIK.
///
/// Concurrent requests for the same CIK share a single upstream fetch. Only
/// successes are stored; a failed fetch leaves nothing behind, so the next
/// request tries again.
#[derive(Default)]
pub struct HoldingsCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl HoldingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn get_or_fetch<F, Fut>(&self, cik: &Cik, fetch: F) -> Result<Arc<FilingHoldings>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FilingHoldings, FetchError>>,
    {
        let key = cik.padded();
        let slot = self.slots().entry(key.clone()).or_default().clone();

        if let Some(cached) = slot.get() {
            log::debug!("Cache hit for CIK {}", key);
            return Ok(Arc::clone(cached));
        }

        let result = slot
            .get_or_try_init(|| async { fetch().await.map(Arc::new) })
            .await
            .map(Arc::clone);

        if result.is_err() {
            let mut slots = self.slots();
            if slots
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized())
            {
                slots.remove(&key);
            }
        }

        result
    }

    pub fn get(&self, cik: &Cik) -> Option<Arc<FilingHoldings>> {
        self.slots()
            .get(&cik.padded())
            .and_then(|slot| slot.get().cloned())
    }

    /// Drops every memoized result and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots();
        let cleared = slots.values().filter(|slot| slot.initialized()).count();
        slots.clear();
        log::info!("Cleared {} cached filings", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.slots().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::filing::{DocumentLocation, Filing};
    use crate::edgar::{Holding, ReportType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample(cik: &Cik) -> FilingHoldings {
        FilingHoldings {
            location: DocumentLocation {
                cik: cik.clone(),
                filing: Filing {
                    report_type: ReportType::FormNportP,
                    accession_number: "0001-22-000001".to_string(),
                },
                url: url::Url::parse("https://www.sec.gov/primary_doc.xml").unwrap(),
            },
            holdings: vec![Holding {
                title: Some("Bond".to_string()),
                ..Default::default()
            }],
            diagnostics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn second_call_is_served_from_memory() {
        let cache = HoldingsCache::new();
        let cik = Cik::new("1234").unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let holdings = cache
                .get_or_fetch(&cik, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(sample(&cik))
                })
                .await
                .unwrap();
            assert_eq!(holdings.holdings.len(), 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn padded_and_unpadded_share_a_key() {
        let cache = HoldingsCache::new();
        let short = Cik::new("1234").unwrap();
        let long = Cik::new("0000001234").unwrap();
        cache.get_or_fetch(&short, || async { Ok(sample(&short)) }).await.unwrap();
        assert!(cache.get(&long).is_some());
    }

    #[tokio::test]
    async fn failures_are_not_memoized() {
        let cache = HoldingsCache::new();
        let cik = Cik::new("42").unwrap();

        let first = cache
            .get_or_fetch(&cik, || async { Err(FetchError::IndexFetchFailed(503)) })
            .await;
        assert_eq!(first.unwrap_err(), FetchError::IndexFetchFailed(503));
        assert!(cache.is_empty());

        let second = cache.get_or_fetch(&cik, || async { Ok(sample(&cik)) }).await;
        assert!(second.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn clear_forces_a_refetch() {
        let cache = HoldingsCache::new();
        let cik = Cik::new("7").unwrap();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(sample(&cik))
        };

        cache.get_or_fetch(&cik, fetch).await.unwrap();
        assert_eq!(cache.clear(), 1);
        assert!(cache.get(&cik).is_none());
        cache.get_or_fetch(&cik, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let cache = Arc::new(HoldingsCache::new());
        let cik = Cik::new("99").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let cik = cik.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(&cik, || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(sample(&cik))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
