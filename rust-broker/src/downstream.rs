//! HTTP forwarding to the mail, logger and authentication services.
//!
//! Every call POSTs a JSON body to a fixed endpoint and expects
//! `202 Accepted` back. The authentication service additionally answers
//! with a [`JsonResponse`] whose `error` flag is honoured.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::event::{AuthPayload, JsonResponse, LogPayload, MailPayload};

/// Fixed endpoints of the downstream services.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub mail: String,
    pub log: String,
    pub auth: String,
}

impl From<&Config> for Endpoints {
    fn from(config: &Config) -> Self {
        Self {
            mail: config.mailer_url.clone(),
            log: config.logger_url.clone(),
            auth: config.auth_url.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("error calling {service} service: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("error calling {service} service (status {status})")]
    Service { service: &'static str, status: u16 },

    #[error("invalid response from {service} service: {source}")]
    InvalidResponse {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} service rejected request: {message}")]
    Rejected { service: &'static str, message: String },
}

/// Shared HTTP client bound to the downstream endpoints.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    endpoints: Endpoints,
}

impl Forwarder {
    /// Build a forwarder; `timeout` of `None` keeps the client default.
    pub fn new(endpoints: Endpoints, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(100);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoints,
        })
    }

    /// Send an email through the mail service.
    pub async fn send_mail(&self, mail: &MailPayload) -> Result<(), ForwardError> {
        let status = self.post_json("mail", &self.endpoints.mail, mail).await?.status();
        expect_accepted("mail", status)?;

        info!(to = %mail.to, "downstream_mail_sent");
        Ok(())
    }

    /// Write a log entry through the logger service.
    pub async fn log_entry(&self, entry: &LogPayload) -> Result<(), ForwardError> {
        let status = self.post_json("logger", &self.endpoints.log, entry).await?.status();
        expect_accepted("logger", status)?;

        info!(name = %entry.name, "downstream_log_written");
        Ok(())
    }

    /// Verify credentials with the authentication service.
    ///
    /// `401` maps to [`ForwardError::InvalidCredentials`]; a `202` whose body
    /// carries `error: true` maps to [`ForwardError::Rejected`].
    pub async fn authenticate(
        &self,
        credentials: &AuthPayload,
    ) -> Result<JsonResponse, ForwardError> {
        let response = self
            .post_json("auth", &self.endpoints.auth, credentials)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(email = %credentials.email, "downstream_auth_invalid_credentials");
            return Err(ForwardError::InvalidCredentials);
        }
        expect_accepted("auth", response.status())?;

        let body: JsonResponse = response
            .json()
            .await
            .map_err(|source| ForwardError::InvalidResponse {
                service: "auth",
                source,
            })?;

        if body.error {
            return Err(ForwardError::Rejected {
                service: "auth",
                message: body.message,
            });
        }

        info!(email = %credentials.email, "downstream_auth_accepted");
        Ok(body)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        service: &'static str,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, ForwardError> {
        // `.json()` also sets `Content-Type: application/json`
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ForwardError::Transport { service, source })
    }
}

fn expect_accepted(service: &'static str, status: StatusCode) -> Result<(), ForwardError> {
    if status == StatusCode::ACCEPTED {
        Ok(())
    } else {
        Err(ForwardError::Service {
            service,
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Throwaway downstream services for tests.

    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    use super::Endpoints;

    /// A captured downstream request.
    #[derive(Debug, Clone)]
    pub struct Captured {
        pub path: String,
        pub content_type: Option<String>,
        pub body: serde_json::Value,
    }

    #[derive(Clone)]
    struct MockState {
        status: StatusCode,
        reply: serde_json::Value,
        delay: Duration,
        captured: Arc<Mutex<Vec<Captured>>>,
        in_flight: Arc<AtomicUsize>,
        peak_in_flight: Arc<AtomicUsize>,
    }

    /// A local server answering every POST with a fixed status and body.
    ///
    /// Requests are recorded once they have been answered.
    pub struct MockService {
        pub addr: SocketAddr,
        pub captured: Arc<Mutex<Vec<Captured>>>,
        peak_in_flight: Arc<AtomicUsize>,
    }

    impl MockService {
        pub async fn start(status: StatusCode, reply: serde_json::Value) -> Self {
            Self::start_with_delay(status, reply, Duration::ZERO).await
        }

        /// Like [`MockService::start`], but every request takes `delay`.
        pub async fn start_with_delay(
            status: StatusCode,
            reply: serde_json::Value,
            delay: Duration,
        ) -> Self {
            let captured = Arc::new(Mutex::new(Vec::new()));
            let peak_in_flight = Arc::new(AtomicUsize::new(0));
            let state = MockState {
                status,
                reply,
                delay,
                captured: Arc::clone(&captured),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak_in_flight: Arc::clone(&peak_in_flight),
            };

            let app = Router::new()
                .route("/send", post(capture))
                .route("/log", post(capture))
                .route("/authenticate", post(capture))
                .with_state(state);

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                addr,
                captured,
                peak_in_flight,
            }
        }

        pub fn endpoints(&self) -> Endpoints {
            Endpoints {
                mail: format!("http://{}/send", self.addr),
                log: format!("http://{}/log", self.addr),
                auth: format!("http://{}/authenticate", self.addr),
            }
        }

        pub fn requests(&self) -> Vec<Captured> {
            self.captured.lock().unwrap().clone()
        }

        /// Highest number of requests that were being served at once.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    async fn capture(
        State(state): State<MockState>,
        uri: axum::http::Uri,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !state.delay.is_zero() {
            tokio::time::sleep(state.delay).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        state.captured.lock().unwrap().push(Captured {
            path: uri.path().to_string(),
            content_type: headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
            body,
        });
        (state.status, Json(state.reply.clone()))
    }

    /// Endpoints on a port where nothing listens.
    pub fn unreachable_endpoints() -> Endpoints {
        Endpoints {
            mail: "http://127.0.0.1:1/send".to_string(),
            log: "http://127.0.0.1:1/log".to_string(),
            auth: "http://127.0.0.1:1/authenticate".to_string(),
        }
    }
}
