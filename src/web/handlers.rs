use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use axum_extra::{headers::Cookie, TypedHeader};
use log::{info, warn};
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

use super::page::{Notice, NoticeLevel, Page, ViewQuery};
use super::session::{session_id, set_cookie_header, SessionHoldings};
use super::AppState;
use crate::edgar::validate;
use crate::utils::rate_limit::RateDecision;

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const FETCH_SUCCESS_MESSAGE: &str = "Data fetched successfully.";

const UNKNOWN_CLIENT: &str = "unknown";

fn client_key(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn render(
    state: &AppState,
    query: &ViewQuery,
    notices: &[Notice],
    data: Option<&SessionHoldings>,
) -> Html<String> {
    Html(
        Page {
            form_type: state.backend.form_type(),
            query,
            notices,
            data,
        }
        .render(),
    )
}

/// `GET /`: redraws the page from the session's holdings. Sorting, filtering
/// and chart options all travel in the query string.
pub async fn index(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<ViewQuery>,
) -> Html<String> {
    if !query.cik.trim().is_empty() {
        if let Err(e) = validate(&query.cik) {
            let notices = [Notice::new(NoticeLevel::Error, e.to_string())];
            return render(&state, &query, &notices, None);
        }
    }

    let current = session_id(cookie.as_ref().map(|TypedHeader(c)| c))
        .and_then(|id| state.sessions.get(&id));
    render(&state, &query, &[], current.as_ref())
}

/// `POST /fetch`: the only action that reaches EDGAR, so the only one that
/// is throttled. The budget is spent before the input is looked at.
pub async fn fetch(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    cookie: Option<TypedHeader<Cookie>>,
    Form(query): Form<ViewQuery>,
) -> Response {
    let client = client_key(connect_info);
    let existing = session_id(cookie.as_ref().map(|TypedHeader(c)| c));
    let current = existing.and_then(|id| state.sessions.get(&id));

    if let RateDecision::Limited { retry_after } = state.limiter.check_and_record(&client, Instant::now()) {
        let notices = [Notice::new(NoticeLevel::Warning, RATE_LIMITED_MESSAGE)];
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.as_secs().max(1).to_string())],
            render(&state, &query, &notices, current.as_ref()),
        )
            .into_response();
    }

    if query.cik.trim().is_empty() {
        return render(&state, &query, &[], current.as_ref()).into_response();
    }

    let cik = match validate(&query.cik) {
        Ok(cik) => cik,
        Err(e) => {
            let notices = [Notice::new(NoticeLevel::Error, e.to_string())];
            return render(&state, &query, &notices, None).into_response();
        }
    };

    info!("Fetching holdings for CIK {} on behalf of {}", cik.padded(), client);
    match state.backend.fetch_holdings(&cik).await {
        Ok(filing) => {
            let id = existing.unwrap_or_else(Uuid::new_v4);
            let data = SessionHoldings { cik, filing };
            state.sessions.set(id, data.clone());

            let notices = [Notice::new(NoticeLevel::Success, FETCH_SUCCESS_MESSAGE)];
            (
                [(header::SET_COOKIE, set_cookie_header(&id))],
                render(&state, &query, &notices, Some(&data)),
            )
                .into_response()
        }
        Err(e) => {
            let level = if e.is_informational() {
                NoticeLevel::Info
            } else {
                warn!("Fetch for CIK {} failed: {}", cik.padded(), e);
                NoticeLevel::Error
            };
            let notices = [Notice::new(level, e.to_string())];
            render(&state, &query, &notices, current.as_ref()).into_response()
        }
    }
}

/// `POST /cache/clear`: drops every memoized filing. Session tables stay.
pub async fn clear_cache(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Form(query): Form<ViewQuery>,
) -> Html<String> {
    let dropped = state.backend.clear_cache();
    info!("Cleared {} cached filings", dropped);

    let current = session_id(cookie.as_ref().map(|TypedHeader(c)| c))
        .and_then(|id| state.sessions.get(&id));
    let notices = [Notice::new(
        NoticeLevel::Info,
        format!("Cache cleared ({} entries).", dropped),
    )];
    render(&state, &query, &notices, current.as_ref())
}

pub async fn health() -> &'static str {
    "OK"
}
