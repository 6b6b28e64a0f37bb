//! Request forwarding to the active backend.
//!
//! # Responsibilities
//! - Reconstruct the request body within the configured bound
//! - Attach the session's credential and a recomputed `Content-Length`
//! - Enforce the hard request deadline (`BackendTimeout` on expiry), and keep
//!   enforcing it on the streamed response body
//! - Retry once, on a fresh connection, when the connect itself failed
//!
//! Non-2xx backend responses are returned untouched; only transport
//! failures become proxy errors.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Response};
use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::body::{collect_bounded, DeadlineBody};
use crate::forward::client::BackendClient;
use crate::http::bridge::{self, OutboundHead, PendingRequest};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::resilience::retries::{should_retry, FailureKind};
use crate::session::{auth_header_value, Session};

/// Executes backend exchanges for the bridge.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: BackendClient,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            client: BackendClient::new(config.backend.protocol, config.timeouts.connect()),
            request_timeout: config.timeouts.request(),
            max_body_bytes: config.limits.max_body_bytes,
        }
    }

    /// Forward `pending` to the backend named by `session`.
    ///
    /// `session` is the snapshot taken at dispatch; both attempts use it even
    /// if the registry is rotated meanwhile.
    pub async fn forward(
        &self,
        pending: PendingRequest,
        session: Arc<Session>,
    ) -> Result<Response<Body>, ProxyError> {
        let request_id = pending.headers.request_id().to_string();
        let inbound_version = pending.version;
        let head = OutboundHead {
            method: pending.method,
            path: pending.path,
            headers: pending.headers,
        };
        let body = collect_bounded(pending.body, self.max_body_bytes).await?;
        let authorization = auth_header_value(&session)?;
        let addr = session.authority();

        let timeout_ms = self.request_timeout.as_millis() as u64;
        let deadline = Instant::now() + self.request_timeout;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = bridge::build_outbound(
                &head,
                body.clone(),
                &session,
                authorization.clone(),
                self.client.protocol(),
            )?;

            match tokio::time::timeout_at(deadline, self.client.send(request)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(
                        request_id = %request_id,
                        backend = %addr,
                        status = %response.status(),
                        attempt,
                        "Backend responded"
                    );
                    let response = response.map(|body| DeadlineBody::new(body, deadline, timeout_ms));
                    return Ok(bridge::translate_response(response, inbound_version));
                }
                Ok(Err(e)) => {
                    let failure = FailureKind::classify(&e);
                    let reason = session.token().scrub(&describe(&e));
                    if should_retry(attempt, failure) {
                        tracing::warn!(
                            request_id = %request_id,
                            backend = %addr,
                            attempt,
                            error = %reason,
                            "Backend connect failed, retrying on a new connection"
                        );
                        metrics::record_retry();
                        continue;
                    }
                    return Err(ProxyError::BackendUnreachable {
                        addr,
                        attempts: attempt,
                        reason,
                    });
                }
                Err(_) => {
                    return Err(ProxyError::BackendTimeout { addr, timeout_ms });
                }
            }
        }
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
