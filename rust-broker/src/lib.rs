//! Topicgate - action-routing gateway over a RabbitMQ topic exchange.
//!
//! This library provides shared modules for the two Topicgate binaries:
//! - `topicgate-gateway`: HTTP gateway that publishes or forwards each request
//! - `topicgate-listener`: Topic consumer that forwards events downstream
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway ─┬─ auth/log → exchange → Listener → auth/logger service
//!                   └─ mail ───────────────────────────→ mail service
//! ```

pub mod config;
pub mod downstream;
pub mod event;
pub mod listener;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use downstream::{Endpoints, ForwardError, Forwarder};
pub use event::{
    Emitter, Event, EventPublisher, MemoryExchange, Request, RequestEnvelope, DEFAULT_EXCHANGE,
};
pub use listener::{Dispatcher, Listener, Message};
pub use web::AppState;
