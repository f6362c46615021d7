//! Gateway HTTP surface.
//!
//! This module provides the router that:
//! - Accepts a single JSON request envelope per call
//! - Publishes `auth` and `log` requests to the topic exchange
//! - Forwards `mail` requests straight to the mail service

pub mod error;
pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::GatewayError;
pub use handlers::{broker, dispatch, handle_submission, health, AppState, HealthResponse};

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(300));

    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", post(broker))
        .route("/handle", post(handle_submission))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
