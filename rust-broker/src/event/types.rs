//! Wire types shared by the gateway and the listener.
//!
//! This module defines:
//! - Payloads carried by a request (`auth`, `log`, `mail`)
//! - The lenient inbound envelope and the typed [`Request`] it resolves to
//! - [`Event`], the subset of requests that travel over the exchange

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the topic exchange used when none is configured.
pub const DEFAULT_EXCHANGE: &str = "exchange";

/// Severity suffix appended to every routing key the gateway publishes.
pub const INFO_SEVERITY: &str = "INFO";

// =============================================================================
// Payloads
// =============================================================================

/// Credentials to be verified by the authentication service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// A named log entry for the logger service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: String,
}

/// An email for the mail service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailPayload {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

/// Uniform response envelope returned by the gateway and the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Inbound request as it appears on the wire.
///
/// Every field is optional; only the payload selected by `action` matters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailPayload>,
}

/// A request resolved to the single action it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Auth(AuthPayload),
    Log(LogPayload),
    Mail(MailPayload),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("unknown action")]
    UnknownAction(String),
}

impl TryFrom<RequestEnvelope> for Request {
    type Error = EnvelopeError;

    /// A known action with a missing payload resolves to the empty payload.
    fn try_from(envelope: RequestEnvelope) -> Result<Self, Self::Error> {
        match envelope.action.as_str() {
            "auth" => Ok(Request::Auth(envelope.auth.unwrap_or_default())),
            "log" => Ok(Request::Log(envelope.log.unwrap_or_default())),
            "mail" => Ok(Request::Mail(envelope.mail.unwrap_or_default())),
            _ => Err(EnvelopeError::UnknownAction(envelope.action)),
        }
    }
}

// =============================================================================
// Events (exchange messages)
// =============================================================================

/// A request that is delivered asynchronously through the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Auth(AuthPayload),
    Log(LogPayload),
}

/// Why a delivery body could not be turned into an [`Event`].
#[derive(Debug, Error)]
#[error("undecodable {action} message: {source}")]
pub struct DecodeError {
    pub action: String,
    #[source]
    pub source: serde_json::Error,
}

impl Event {
    pub fn action(&self) -> &'static str {
        match self {
            Event::Auth(_) => "auth",
            Event::Log(_) => "log",
        }
    }

    /// Routing key of the form `<action>.INFO`.
    pub fn routing_key(&self) -> String {
        format!("{}.{}", self.action(), INFO_SEVERITY)
    }

    /// JSON body of the inner payload.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Event::Auth(payload) => serde_json::to_vec(payload),
            Event::Log(payload) => serde_json::to_vec(payload),
        }
    }

    /// Recover an event from a delivered message.
    ///
    /// A full [`RequestEnvelope`] carrying an action is routed by that action.
    /// A bare payload is routed by the first word of its routing key.
    /// Anything that is not `auth` is handled as a log entry.
    pub fn decode(routing_key: &str, body: &[u8]) -> Result<Event, DecodeError> {
        if let Ok(envelope) = serde_json::from_slice::<RequestEnvelope>(body) {
            if !envelope.action.is_empty() {
                return Ok(match envelope.action.as_str() {
                    "auth" => Event::Auth(envelope.auth.unwrap_or_default()),
                    _ => Event::Log(envelope.log.unwrap_or_default()),
                });
            }
        }

        let action = routing_key.split('.').next().unwrap_or_default();
        let result = match action {
            "auth" => serde_json::from_slice(body).map(Event::Auth),
            _ => serde_json::from_slice(body).map(Event::Log),
        };

        result.map_err(|source| DecodeError {
            action: action.to_string(),
            source,
        })
    }
}

impl From<AuthPayload> for Event {
    fn from(payload: AuthPayload) -> Self {
        Event::Auth(payload)
    }
}

impl From<LogPayload> for Event {
    fn from(payload: LogPayload) -> Self {
        Event::Log(payload)
    }
}
