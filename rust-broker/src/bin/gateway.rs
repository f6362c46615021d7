//! Topicgate Gateway - HTTP entry point for action requests.
//!
//! This binary provides a small web server that:
//! - Accepts one JSON request envelope per call
//! - Publishes `auth` and `log` requests to the topic exchange
//! - Forwards `mail` requests directly to the mail service
//!
//! Published requests are acknowledged with 202 as soon as the broker
//! accepts them; the listener does the rest.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topicgate::web::{router, AppState};
use topicgate::{Config, Emitter, Endpoints, Forwarder};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("gateway_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        exchange = %config.exchange_name,
        mailer_url = %config.mailer_url,
        request_timeout_ms = ?config.request_timeout_ms,
        "config_loaded"
    );

    // Create RabbitMQ emitter; it connects on first publish
    let emitter = Emitter::new(config.amqp_url.clone(), config.exchange_name.clone());
    info!("rabbitmq_emitter_created");

    let forwarder = Forwarder::new(Endpoints::from(&config), config.request_timeout())
        .context("Failed to create HTTP client")?;

    let state = AppState::new(config.clone(), Arc::new(emitter.clone()), forwarder);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "gateway_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close emitter connection
    emitter.close().await;

    info!("gateway_shutdown_complete");

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

    info!("gateway_shutting_down");
}
