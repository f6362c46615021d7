//! Per-message dispatch.
//!
//! Each delivered message is decoded and forwarded on its own task. Tasks
//! wait on a shared semaphore so at most `concurrency` forwards run at once,
//! while the consume loop itself never waits.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::Message;
use crate::downstream::{ForwardError, Forwarder};
use crate::event::{Event, LogPayload};

/// Forward a decoded event to the service that handles its action.
pub async fn handle_event(forwarder: &Forwarder, event: &Event) -> Result<(), ForwardError> {
    match event {
        Event::Auth(credentials) => forwarder.authenticate(credentials).await.map(|_| ()),
        Event::Log(entry) => forwarder.log_entry(entry).await,
    }
}

/// Decode a delivery, tolerating malformed bodies.
///
/// A body that cannot be decoded is dispatched as an empty log entry.
pub fn decode_message(message: &Message) -> Event {
    Event::decode(&message.routing_key, &message.body).unwrap_or_else(|e| {
        warn!(
            routing_key = %message.routing_key,
            error = %e,
            body_preview = %String::from_utf8_lossy(&message.body[..message.body.len().min(500)]),
            "listener_message_decode_failed"
        );
        Event::Log(LogPayload::default())
    })
}

/// Spawns one bounded task per message.
#[derive(Clone)]
pub struct Dispatcher {
    forwarder: Arc<Forwarder>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(forwarder: Forwarder, concurrency: usize) -> Self {
        Self {
            forwarder: Arc::new(forwarder),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Number of dispatch tasks that may start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn the handling task for `message` and return without waiting.
    pub fn spawn(&self, message: Message) -> JoinHandle<()> {
        let forwarder = Arc::clone(&self.forwarder);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let event = decode_message(&message);

            match handle_event(&forwarder, &event).await {
                Ok(()) => info!(
                    routing_key = %message.routing_key,
                    action = event.action(),
                    "listener_event_forwarded"
                ),
                Err(e) => error!(
                    routing_key = %message.routing_key,
                    action = event.action(),
                    error = %e,
                    "listener_event_forward_failed"
                ),
            }
        })
    }
}
