//! Error taxonomy for the proxy.
//!
//! # Layers
//! ```text
//! ProxyError   → per-request / per-session failures, rendered as
//!                {"error": "<message>"} with a matching status code
//! StartupError → fatal at startup, carries the process exit code
//! ```
//!
//! Messages never contain the session token. Backend error text is passed
//! through [`crate::session::Token::scrub`] before it lands in a variant.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::ConfigError;
use crate::lifecycle::port_owner::PortOwner;

/// Errors raised while serving a single request or replacing the session.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No session has been installed yet.
    #[error("no active backend session")]
    NoActiveSession,

    /// Session input failed validation (bad host, port or empty token).
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// The reachability probe in `set_session` failed.
    #[error("backend {addr} is unreachable: {reason}")]
    UnreachableBackend { addr: String, reason: String },

    /// The backend could not be reached while forwarding. Connect failures
    /// get one retry; a reset after the request was sent gets none.
    #[error("backend {addr} unreachable after {attempts} attempt(s): {reason}")]
    BackendUnreachable {
        addr: String,
        attempts: u32,
        reason: String,
    },

    /// The backend did not answer within `request_timeout_ms`.
    #[error("backend {addr} did not respond within {timeout_ms} ms")]
    BackendTimeout { addr: String, timeout_ms: u64 },

    /// The request body exceeded `limits.max_body_bytes`.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The client sent something that could not be re-originated.
    #[error("malformed request: {0}")]
    BadRequest(String),

    /// The drain grace period elapsed before this request finished.
    #[error("proxy is shutting down")]
    ShuttingDown,
}

impl ProxyError {
    /// HTTP status the client sees for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoActiveSession | ProxyError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InvalidSession(_) | ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnreachableBackend { .. } | ProxyError::BackendUnreachable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Short, stable name used as the `error_class` log field.
    pub fn class(&self) -> &'static str {
        match self {
            ProxyError::NoActiveSession => "NoActiveSession",
            ProxyError::InvalidSession(_) => "InvalidSession",
            ProxyError::UnreachableBackend { .. } => "UnreachableBackend",
            ProxyError::BackendUnreachable { .. } => "BackendUnreachable",
            ProxyError::BackendTimeout { .. } => "BackendTimeout",
            ProxyError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ProxyError::BadRequest(_) => "BadRequest",
            ProxyError::ShuttingDown => "ShuttingDown",
        }
    }
}

/// JSON error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Fatal errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("port {port} is already in use{}", owner_suffix(.owner))]
    PortInUse { port: u16, owner: Option<PortOwner> },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

fn owner_suffix(owner: &Option<PortOwner>) -> String {
    match owner {
        Some(owner) => format!(" by {}", owner),
        None => String::new(),
    }
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Configuration(_) => 1,
            StartupError::PortInUse { .. } | StartupError::Bind { .. } => 2,
            StartupError::Serve(_) => 1,
        }
    }
}
