//! Exchange and queue setup.
//!
//! The gateway and every listener share one durable topic exchange. Each
//! listener owns a server-named, exclusive, auto-deleting queue bound to its
//! topic patterns, so every running listener receives its own copy of each
//! matching message.

use anyhow::{Context, Result};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, ExchangeKind, Queue,
};
use tracing::info;

/// Declare the topic exchange (idempotent).
pub async fn declare_exchange(channel: &Channel, name: &str) -> Result<()> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                auto_delete: false,
                internal: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("Failed to declare exchange {}", name))?;

    info!(exchange = name, kind = "topic", "rabbitmq_exchange_declared");

    Ok(())
}

/// Declare an anonymous queue that lives only as long as this connection.
pub async fn declare_random_queue(channel: &Channel) -> Result<Queue> {
    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                durable: false,
                exclusive: true,
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare random queue")?;

    info!(queue = queue.name().as_str(), "rabbitmq_queue_declared");

    Ok(queue)
}

/// Bind `queue` to `exchange` once per topic pattern.
pub async fn bind_topics(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    topics: &[String],
) -> Result<()> {
    for topic in topics {
        channel
            .queue_bind(
                queue,
                exchange,
                topic,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to bind queue to topic {}", topic))?;

        info!(queue = queue, exchange = exchange, topic = %topic, "rabbitmq_queue_bound");
    }

    Ok(())
}

/// Match a routing key against a topic binding pattern.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((first, key_rest)) => {
                (word == "*" || word == *first) && match_words(rest, key_rest)
            }
            None => false,
        },
    }
}
