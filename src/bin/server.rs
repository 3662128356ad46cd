use holdings_viewer::{
    core::HoldingsConfig,
    utils::rate_limit::RateLimiter,
    web::{self, AppState},
    HoldingsService,
};
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = HoldingsConfig::from_env()?;

    let service = HoldingsService::from_config(&config)?;
    let limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window);
    let state = AppState::new(Arc::new(service), Arc::new(limiter));

    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        "Serving {} holdings on http://{}",
        config.form_type,
        listener.local_addr()?
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
