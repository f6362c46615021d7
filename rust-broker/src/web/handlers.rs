//! Gateway endpoint handlers.
//!
//! A submission is resolved to exactly one outbound call:
//! - `auth` / `log` are published to the exchange and acknowledged at once
//! - `mail` is forwarded to the mail service and answered when it replies
//!
//! Every failure is answered with a JSON error envelope; nothing is retried.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::downstream::Forwarder;
use crate::event::{
    publish_event, Event, EventPublisher, JsonResponse, MailPayload, Request, RequestEnvelope,
};
use crate::web::error::GatewayError;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub publisher: Arc<dyn EventPublisher>,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: Config, publisher: Arc<dyn EventPublisher>, forwarder: Forwarder) -> Self {
        Self {
            config: Arc::new(config),
            publisher,
            forwarder,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// No-op endpoint confirming the gateway is reachable.
pub async fn broker() -> Json<JsonResponse> {
    Json(JsonResponse::ok("Hit the broker"))
}

// =============================================================================
// Submissions
// =============================================================================

/// Submission endpoint.
///
/// The raw body is decoded here rather than through the `Json` extractor so
/// malformed or oversized input is answered with the same error envelope as
/// every other failure.
pub async fn handle_submission(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<JsonResponse>), GatewayError> {
    let body = body?;
    let envelope: RequestEnvelope = serde_json::from_slice(&body)?;

    info!(action = %envelope.action, body_length = body.len(), "gateway_request_received");

    let request = Request::try_from(envelope)?;
    let response = dispatch(&state, request).await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Perform the single outbound call a request asks for.
pub async fn dispatch(state: &AppState, request: Request) -> Result<JsonResponse, GatewayError> {
    match request {
        Request::Auth(credentials) => {
            emit(state, Event::Auth(credentials)).await?;
            Ok(JsonResponse::ok("authenticated via RabbitMQ"))
        }
        Request::Log(entry) => {
            emit(state, Event::Log(entry)).await?;
            Ok(JsonResponse::ok("logged via RabbitMQ"))
        }
        Request::Mail(mail) => send_mail(state, &mail).await,
    }
}

async fn emit(state: &AppState, event: Event) -> Result<(), GatewayError> {
    publish_event(state.publisher.as_ref(), &event)
        .await
        .map_err(GatewayError::Publish)?;

    info!(routing_key = %event.routing_key(), "gateway_event_enqueued");
    Ok(())
}

async fn send_mail(state: &AppState, mail: &MailPayload) -> Result<JsonResponse, GatewayError> {
    state.forwarder.send_mail(mail).await?;
    Ok(JsonResponse::ok(format!("message sent to {}", mail.to)))
}
