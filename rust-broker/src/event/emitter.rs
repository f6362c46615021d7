//! Async RabbitMQ emitter for publishing events to the topic exchange.
//!
//! The emitter maintains a persistent connection and channel that can be
//! shared across request handlers. A publish that finds the channel closed
//! reconnects first; a publish that fails is reported to the caller as is.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions, BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::topology::declare_exchange;
use super::types::Event;

/// Destination for JSON-encoded events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `body` to the exchange under `routing_key`.
    async fn publish(&self, body: &[u8], routing_key: &str) -> Result<()>;
}

/// Encode `event` and publish it under its own routing key.
pub async fn publish_event(publisher: &dyn EventPublisher, event: &Event) -> Result<()> {
    let body = event.encode().context("Failed to serialize event")?;
    publisher.publish(&body, &event.routing_key()).await
}

/// RabbitMQ-backed [`EventPublisher`].
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

struct EmitterInner {
    url: String,
    exchange: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Emitter {
    /// Create a new emitter for the given RabbitMQ URL and exchange.
    ///
    /// No connection is made until the first publish.
    pub fn new(url: String, exchange: String) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                url,
                exchange,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_emitter_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_emitter_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        declare_exchange(&ch, &self.inner.exchange).await?;

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_emitter_closed");
    }
}

#[async_trait]
impl EventPublisher for Emitter {
    async fn publish(&self, body: &[u8], routing_key: &str) -> Result<()> {
        let channel = self.ensure_connected().await?;

        channel
            .basic_publish(
                &self.inner.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .context("Failed to publish event")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            exchange = %self.inner.exchange,
            routing_key = routing_key,
            body_length = body.len(),
            "rabbitmq_event_published"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::LogPayload;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, body: &[u8], routing_key: &str) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), body.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_emitter_creation() {
        let emitter = Emitter::new("amqp://localhost:5672".to_string(), "exchange".to_string());
        assert_eq!(emitter.inner.exchange, "exchange");
        assert!(Arc::strong_count(&emitter.inner) == 1);
    }

    #[tokio::test]
    async fn test_publish_event_uses_routing_key() {
        let publisher = RecordingPublisher::default();
        let event = Event::Log(LogPayload {
            name: "test".to_string(),
            data: "hello".to_string(),
        });

        publish_event(&publisher, &event).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "log.INFO");
        let decoded: LogPayload = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(decoded.name, "test");
        assert_eq!(decoded.data, "hello");
    }

    #[tokio::test]
    async fn test_publish_without_broker_fails() {
        // Nothing listens on port 1; the connect error must surface.
        let emitter = Emitter::new("amqp://127.0.0.1:1/%2f".to_string(), "exchange".to_string());
        let result = emitter.publish(b"{}", "log.INFO").await;
        assert!(result.is_err());
    }
}
