pub mod chart;
pub mod handlers;
pub mod page;
pub mod session;
pub mod table;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::core::HoldingsBackend;
use crate::utils::rate_limit::RateLimit;

pub use page::{Notice, NoticeLevel, ViewQuery};
pub use session::SessionStore;

/// Form posts carry a CIK and a handful of knobs.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn HoldingsBackend>,
    pub limiter: Arc<dyn RateLimit>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(backend: Arc<dyn HoldingsBackend>, limiter: Arc<dyn RateLimit>) -> Self {
        Self {
            backend,
            limiter,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/fetch", post(handlers::fetch))
        .route("/cache/clear", post(handlers::clear_cache))
        .route("/health", get(handlers::health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
