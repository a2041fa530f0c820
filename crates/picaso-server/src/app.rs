//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    artwork_stream_handler, cancel_checkout, complete_checkout, create_artwork,
    create_checkout_session, current_artwork, generate_image, health_check, quota_status,
    stored_image,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/api/health", get(health_check))

        // Generation
        .route("/api/generate-image", post(generate_image))
        .route("/api/quota", get(quota_status))
        .route("/api/artworks", post(create_artwork))
        .route("/api/artworks/current", get(current_artwork))
        .route("/api/artworks/stream", get(artwork_stream_handler))

        // Checkout
        .route("/api/create-checkout-session", post(create_checkout_session))
        .route("/api/checkout/complete", post(complete_checkout))
        .route("/api/checkout/cancel", post(cancel_checkout))

        // In-memory object store
        .route("/images/{*key}", get(stored_image))

        // Static frontend
        .fallback_service(ServeDir::new("static"))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
