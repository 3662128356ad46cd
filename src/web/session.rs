use axum_extra::headers::Cookie;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::edgar::{Cik, FilingHoldings};

pub const SESSION_COOKIE: &str = "holdings_session";

/// What one browser session last fetched successfully.
#[derive(Debug, Clone)]
pub struct SessionHoldings {
    pub cik: Cik,
    pub filing: Arc<FilingHoldings>,
}

/// Per-session holdings, overwritten by each successful fetch and gone when
/// the process exits.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHoldings>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHoldings> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn set(&self, id: Uuid, holdings: SessionHoldings) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, holdings);
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session id carried by the request cookie, if it parses.
pub fn session_id(cookie: Option<&Cookie>) -> Option<Uuid> {
    cookie
        .and_then(|c| c.get(SESSION_COOKIE))
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

pub fn set_cookie_header(id: &Uuid) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::filing::{DocumentLocation, Filing};
    use crate::edgar::ReportType;

    fn holdings(cik: &str) -> SessionHoldings {
        let cik = Cik::new(cik).unwrap();
        SessionHoldings {
            filing: Arc::new(FilingHoldings {
                location: DocumentLocation {
                    cik: cik.clone(),
                    filing: Filing {
                        report_type: ReportType::FormNportP,
                        accession_number: "1".to_string(),
                    },
                    url: url::Url::parse("https://www.sec.gov/x.xml").unwrap(),
                },
                holdings: Vec::new(),
                diagnostics: Vec::new(),
            }),
            cik,
        }
    }

    #[test]
    fn later_fetch_overwrites_earlier() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(store.get(&id).is_none());

        store.set(id, holdings("1"));
        store.set(id, holdings("2"));
        assert_eq!(store.get(&id).unwrap().cik.as_str(), "2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.set(a, holdings("1"));
        assert!(store.get(&b).is_none());
    }

    #[test]
    fn cookie_value_format() {
        let id = Uuid::nil();
        assert_eq!(
            set_cookie_header(&id),
            "holdings_session=00000000-0000-0000-0000-000000000000; Path=/; HttpOnly; SameSite=Lax"
        );
        assert_eq!(session_id(None), None);
    }
}
