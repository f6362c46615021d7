//! Event module for topic exchange operations.
//!
//! This module provides:
//! - Wire types for requests and the events published from them
//! - Exchange/queue declaration and topic binding
//! - The RabbitMQ emitter and an in-memory exchange behind one trait
//!
//! ## Architecture
//!
//! ```text
//! Gateway → exchange (topic) → per-listener queue → Listener → downstream HTTP
//! ```

pub mod emitter;
pub mod memory;
pub mod topology;
pub mod types;

pub use emitter::{publish_event, Emitter, EventPublisher};
pub use memory::MemoryExchange;
pub use topology::{bind_topics, declare_exchange, declare_random_queue, topic_matches};
pub use types::{
    AuthPayload, DecodeError, EnvelopeError, Event, JsonResponse, LogPayload, MailPayload,
    Request, RequestEnvelope, DEFAULT_EXCHANGE, INFO_SEVERITY,
};
