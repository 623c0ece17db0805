//! GradeFlow - homework submission and AI-assisted grading backend
//! Mission: One relational store, revocable sessions, role-gated CRUD

use anyhow::{Context, Result};
use gradeflow_backend::auth::TokenStore;
use gradeflow_backend::models::Config;
use gradeflow_backend::{build_router, AppState, RateLimiters};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("🚀 GradeFlow backend starting");

    let config = Config::from_env()?;
    let state = AppState::new(&config)?;

    state
        .users
        .ensure_admin(&config.admin_email, &config.admin_password)
        .context("Failed to bootstrap admin account")?;

    // Background: drop expired token rows so the table stays lean.
    // Validation never depends on this sweep.
    tokio::spawn(token_sweeper(
        state.tokens.clone(),
        config.token_sweep_interval_secs,
    ));

    let limiters = RateLimiters::from_config(&config);
    tokio::spawn(rate_limit_cleanup(limiters.clone()));

    let app = build_router(state, limiters);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filter overrides
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gradeflow_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Periodically delete token rows that are past their expiry
async fn token_sweeper(tokens: Arc<TokenStore>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(60)));
    loop {
        ticker.tick().await;
        match tokens.purge_expired() {
            Ok(0) => {}
            Ok(n) => info!("🧹 Purged {} expired tokens", n),
            Err(e) => warn!("Token purge failed: {}", e),
        }
    }
}

/// Periodically drop idle per-IP rate limit entries
async fn rate_limit_cleanup(limiters: RateLimiters) {
    let mut ticker = interval(Duration::from_secs(300));
    loop {
        ticker.tick().await;
        limiters.cleanup();
    }
}
