//! M-Pesa Relay Server
//!
//! Axum server between the storefront checkout and the Safaricom Daraja
//! API. Holds the credentials, signs STK push and query requests, and
//! receives the provider's result callbacks.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use mpesa_relay::{DarajaClient, DarajaCredentials, MemoryCallbackStore, PaymentGateway};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let credentials = DarajaCredentials::from_env();

    let missing = credentials.missing();
    if missing.is_empty() {
        tracing::info!("✓ M-Pesa credentials configured");
    } else {
        tracing::warn!("⚠ Missing required M-Pesa credentials:");
        for name in &missing {
            tracing::warn!("  - {}", name);
        }
        tracing::warn!("  STK push requests will fail until these are set in .env");
    }

    let client = Arc::new(DarajaClient::new(credentials.clone())?);

    if credentials.callback_url.is_none() {
        tracing::warn!("⚠ MPESA_CALLBACK_URL not set; callbacks will target the request host");
    }

    // Build application state
    let state = AppState {
        gateway: client.clone(),
        credentials: Arc::new(credentials.clone()),
        callbacks: Arc::new(MemoryCallbackStore::new()),
    };

    let app = routes::router(state, config.static_dir.as_deref());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 M-Pesa relay running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("📡 Base URL: {}", credentials.base_url);
    tracing::info!(
        "📱 Shortcode: {}",
        credentials.shortcode.as_deref().unwrap_or("NOT CONFIGURED")
    );
    if let Some(dir) = &config.static_dir {
        tracing::info!("📦 Serving storefront from {}", dir.display());
    }
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /api/health                - Health check");
    tracing::info!("  GET  /api/mpesa/test-auth       - Verify credentials");
    tracing::info!("  POST /api/mpesa/stk-push        - Initiate payment");
    tracing::info!("  POST /api/mpesa/query-status    - Check payment status");
    tracing::info!("  POST /api/mpesa/callback        - Provider callback");
    tracing::info!("  GET  /api/mpesa/callback/{{id}}   - Recorded callback");
    tracing::info!("");

    // Verify credentials against the provider without holding up startup
    if credentials.oauth_pair().is_ok() {
        let base_url = credentials.base_url.clone();
        tokio::spawn(async move {
            match client.access_token().await {
                Ok(_) => tracing::info!("✓ OAuth token obtained from {}", base_url),
                Err(e) => {
                    tracing::warn!("⚠ Could not obtain OAuth token: {}", e);
                    tracing::warn!("  {}", e.user_message());
                }
            }
        });
    }

    axum::serve(listener, app).await?;

    Ok(())
}
