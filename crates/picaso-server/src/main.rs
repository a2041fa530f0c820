//! picaso HTTP Server
//!
//! Axum-based server providing REST and WebSocket endpoints for generating
//! artworks and ordering them as framed prints.

mod app;
mod config;
mod handlers;
mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    let state = config.build_state()?;

    tracing::info!(
        "Quota: {} generations per {}h",
        config.quota.max_attempts,
        config.quota.window.as_secs() / 3600
    );
    tracing::info!("Persistence chain:");
    for name in state.chain.strategy_names() {
        tracing::info!("  • {}", name);
    }

    let app = app::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🎨 picaso server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /api/health                  - Health check");
    tracing::info!("  POST /api/generate-image          - Generate from a composed prompt");
    tracing::info!("  GET  /api/quota                   - Remaining generations");
    tracing::info!("  POST /api/artworks                - Generate and keep an artwork");
    tracing::info!("  GET  /api/artworks/current        - Current artwork");
    tracing::info!("  GET  /api/artworks/stream         - WebSocket with progress");
    tracing::info!("  POST /api/create-checkout-session - Create Stripe checkout");
    tracing::info!("  POST /api/checkout/complete       - Order confirmation");
    tracing::info!("  POST /api/checkout/cancel         - Checkout cancelled");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
