//! Topicgate Listener - topic consumer that forwards events downstream.
//!
//! The listener binds a private queue to the configured topic patterns and
//! forwards every delivered event to the authentication or logger service.
//! Failures are logged; nothing is reported back to the publisher.

use anyhow::{Context, Result};
use lapin::{Connection, ConnectionProperties};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topicgate::{Config, Dispatcher, Endpoints, Forwarder, Listener};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("listener_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        amqp_url_set = !config.amqp_url.is_empty(),
        exchange = %config.exchange_name,
        topics = ?config.listener_topics,
        concurrency = config.dispatch_concurrency,
        "config_loaded"
    );

    info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let forwarder = Forwarder::new(Endpoints::from(&config), config.request_timeout())
        .context("Failed to create HTTP client")?;
    let dispatcher = Dispatcher::new(forwarder, config.dispatch_concurrency);

    let listener = Listener::new(&conn, config.exchange_name.clone()).await?;
    let result = listener
        .listen(&config.listener_topics, dispatcher, shutdown_signal())
        .await;

    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    result?;

    info!("listener_shutdown_complete");
    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
