//! Router

use std::path::Path;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{callback, callback_status, health, query_status, stk_push, test_auth};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Health & diagnostics
        .route("/api/health", get(health))
        .route("/api/mpesa/test-auth", get(test_auth))
        // Payments
        .route("/api/mpesa/stk-push", post(stk_push))
        .route("/api/mpesa/query-status", post(query_status))
        // Provider notifications
        .route("/api/mpesa/callback", post(callback))
        .route("/api/mpesa/callback/{checkout_request_id}", get(callback_status));

    // Built storefront
    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
