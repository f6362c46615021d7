//! In-process topic exchange.
//!
//! Routes messages with the same topic semantics as the broker: each call to
//! [`MemoryExchange::bind`] creates a fresh exclusive queue, and every queue
//! with a matching pattern receives its own copy of a published message.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::debug;

use super::emitter::EventPublisher;
use super::topology::topic_matches;
use crate::listener::Message;

struct MemoryQueue {
    patterns: Vec<String>,
    sender: UnboundedSender<Message>,
}

/// Topic exchange held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryExchange {
    queues: Arc<RwLock<Vec<MemoryQueue>>>,
}

impl MemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue bound to `patterns` and return its delivery stream.
    ///
    /// The queue is removed once the returned receiver is dropped.
    pub async fn bind(&self, patterns: &[String]) -> UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded();
        self.queues.write().await.push(MemoryQueue {
            patterns: patterns.to_vec(),
            sender,
        });
        receiver
    }

    /// Number of live queues.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }
}

#[async_trait]
impl EventPublisher for MemoryExchange {
    async fn publish(&self, body: &[u8], routing_key: &str) -> Result<()> {
        let mut queues = self.queues.write().await;
        queues.retain(|queue| !queue.sender.is_closed());

        let mut delivered = 0;
        for queue in queues.iter() {
            if queue.patterns.iter().any(|p| topic_matches(p, routing_key)) {
                let message = Message::new(routing_key, body.to_vec());
                if queue.sender.unbounded_send(message).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!(routing_key = routing_key, queues = delivered, "memory_event_published");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn topics(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_binding_filters_by_routing_key() {
        let exchange = MemoryExchange::new();
        let mut auth_queue = exchange.bind(&topics(&["auth.*"])).await;

        exchange.publish(b"first", "auth.INFO").await.unwrap();
        exchange.publish(b"second", "log.INFO").await.unwrap();
        drop(exchange);

        let received: Vec<Message> = auth_queue.by_ref().collect().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].routing_key, "auth.INFO");
        assert_eq!(received[0].body, b"first".to_vec());
    }

    #[tokio::test]
    async fn test_every_queue_gets_a_copy() {
        let exchange = MemoryExchange::new();
        let mut first = exchange.bind(&topics(&["auth.*", "log.*"])).await;
        let mut second = exchange.bind(&topics(&["auth.*", "log.*"])).await;

        exchange.publish(b"hello", "log.INFO").await.unwrap();

        assert_eq!(first.next().await.unwrap().body, b"hello".to_vec());
        assert_eq!(second.next().await.unwrap().body, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_overlapping_patterns_deliver_once() {
        let exchange = MemoryExchange::new();
        let mut queue = exchange.bind(&topics(&["log.*", "#"])).await;

        exchange.publish(b"once", "log.INFO").await.unwrap();
        drop(exchange);

        let received: Vec<Message> = queue.by_ref().collect().await;
        assert_eq!(received.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_queues_are_pruned() {
        let exchange = MemoryExchange::new();
        let queue = exchange.bind(&topics(&["#"])).await;
        assert_eq!(exchange.queue_count().await, 1);

        drop(queue);
        exchange.publish(b"gone", "log.INFO").await.unwrap();
        assert_eq!(exchange.queue_count().await, 0);
    }
}
