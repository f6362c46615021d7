//! Topic listener using lapin.
//!
//! This module handles declaring the exchange, binding a private queue to the
//! requested topics, consuming with automatic acknowledgment, and spawning a
//! dispatch task for every delivery.

pub mod dispatch;

use std::fmt::Display;
use std::future::Future;

use anyhow::{bail, Context, Result};
use futures::{Stream, StreamExt};
use lapin::{message::Delivery, options::BasicConsumeOptions, types::FieldTable, Connection};
use tracing::{error, info, warn};

use crate::event::{bind_topics, declare_exchange, declare_random_queue};

pub use dispatch::{decode_message, handle_event, Dispatcher};

/// A delivered message, independent of the transport it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
        }
    }
}

impl From<Delivery> for Message {
    fn from(delivery: Delivery) -> Self {
        Self {
            routing_key: delivery.routing_key.as_str().to_string(),
            body: delivery.data,
        }
    }
}

/// Consumer side of the topic exchange.
pub struct Listener<'a> {
    connection: &'a Connection,
    exchange: String,
}

impl<'a> Listener<'a> {
    /// Declare the exchange on a fresh channel of `connection`.
    pub async fn new(connection: &'a Connection, exchange: impl Into<String>) -> Result<Self> {
        let exchange = exchange.into();

        let channel = connection
            .create_channel()
            .await
            .context("Failed to create channel")?;
        declare_exchange(&channel, &exchange).await?;

        Ok(Self {
            connection,
            exchange,
        })
    }

    /// Bind a private queue to `topics` and dispatch deliveries until
    /// `shutdown` resolves or the channel is lost.
    pub async fn listen<F>(
        &self,
        topics: &[String],
        dispatcher: Dispatcher,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let channel = self
            .connection
            .create_channel()
            .await
            .context("Failed to create channel")?;

        info!("rabbitmq_channel_created");

        let queue = declare_random_queue(&channel).await?;
        let queue_name = queue.name().as_str();

        bind_topics(&channel, queue_name, &self.exchange, topics).await?;

        let consumer = channel
            .basic_consume(
                queue_name,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to start consumer")?;

        info!(
            exchange = %self.exchange,
            queue = queue_name,
            topics = ?topics,
            "listener_waiting_for_messages"
        );

        let result =
            run_dispatch_loop(consumer.map(|d| d.map(Message::from)), &dispatcher, shutdown).await;

        if let Err(e) = channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        result
    }
}

/// Dispatch every delivery from `deliveries` until `shutdown` resolves.
///
/// Returns `Ok` on shutdown and an error if the stream ends first. Dispatch
/// tasks still running when the loop exits are left to finish on their own.
pub async fn run_dispatch_loop<S, E, F>(
    deliveries: S,
    dispatcher: &Dispatcher,
    shutdown: F,
) -> Result<()>
where
    S: Stream<Item = Result<Message, E>>,
    E: Display,
    F: Future<Output = ()>,
{
    futures::pin_mut!(deliveries);
    futures::pin_mut!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("listener_stopping");
                return Ok(());
            }
            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(message)) => {
                        info!(
                            routing_key = %message.routing_key,
                            body_length = message.body.len(),
                            "listener_message_received"
                        );
                        dispatcher.spawn(message);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("listener_delivery_stream_closed");
                        bail!("delivery stream closed");
                    }
                }
            }
        }
    }
}
