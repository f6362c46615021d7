//! Gateway errors rendered as JSON error envelopes.

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::warn;

use crate::downstream::ForwardError;
use crate::event::{EnvelopeError, JsonResponse};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Body(#[from] BytesRejection),

    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("{0:#}")]
    Publish(anyhow::Error),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Body(rejection) => rejection.status(),
            GatewayError::Decode(_) | GatewayError::Envelope(_) => StatusCode::BAD_REQUEST,
            GatewayError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Forward(ForwardError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            GatewayError::Forward(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "gateway_request_failed");
        (status, Json(JsonResponse::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(GatewayError::from(decode).status(), StatusCode::BAD_REQUEST);

        let unknown = EnvelopeError::UnknownAction("launch".to_string());
        let err = GatewayError::from(unknown);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "unknown action");

        let err = GatewayError::Publish(anyhow::anyhow!("channel closed"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = GatewayError::from(ForwardError::InvalidCredentials);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = GatewayError::from(ForwardError::Service {
            service: "mail",
            status: 500,
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "error calling mail service (status 500)");
    }
}
