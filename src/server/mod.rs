//! HTTP server support (standalone + embeddable).
//!
//! - **Standalone**: `vidcraft-billing-server` binary calls `run()`
//! - **Embedded**: host Axum app calls `router(state)` (and may nest it)

mod http;
mod http_auth;
mod http_errors;
mod http_parse;
mod http_types;
mod state;

pub use http::router;
pub use state::{
    build_state_from_env, build_state_with_pool, AppState, AuthServiceType, LedgerServiceType,
    PaymentEventAdapterType, SubscriptionServiceType,
};

use crate::infrastructure::AppConfig;
use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Standalone entrypoint for the `vidcraft-billing-server` binary.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn")),
        )
        .init();

    let config = AppConfig::from_env().context("load config")?;
    let state = build_state_from_env(config.clone()).await?;

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("parse listen address")?;
    let listener = TcpListener::bind(addr).await.context("bind listener")?;

    info!(
        host = %config.server_host,
        port = config.server_port,
        "Server running"
    );
    info!(
        docs = %format!("http://{}:{}/docs", config.server_host, config.server_port),
        "API docs"
    );

    let app = router(state);
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
