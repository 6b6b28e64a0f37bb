//! The single authoritative backend session.
//!
//! # Responsibilities
//! - Hold the active `Session` behind a reader-shared / writer-exclusive lock
//! - Validate and probe new sessions before they become authoritative
//! - Hand out `Arc<Session>` snapshots, so a request keeps the session it was
//!   dispatched with even if the registry is rotated mid-flight
//!
//! # Design Decisions
//! - The lock is never held across an await; probing happens before the swap
//! - Replacing the session is one pointer write under the write lock
//! - The probe is TCP connect only, no protocol handshake

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use tokio::net::TcpStream;

use crate::config::validation::check_host;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::session::Token;

/// Backend address plus credential.
#[derive(Debug, Clone)]
pub struct Session {
    backend_host: String,
    backend_port: u16,
    token: Token,
    created_at: SystemTime,
}

impl Session {
    /// Build a session without validation or probing. Prefer
    /// [`SessionRegistry::set_session`] for anything user-supplied.
    pub fn new(host: impl Into<String>, port: u16, token: Token) -> Self {
        Self {
            backend_host: host.into(),
            backend_port: port,
            token,
            created_at: SystemTime::now(),
        }
    }

    pub fn backend_host(&self) -> &str {
        &self.backend_host
    }

    pub fn backend_port(&self) -> u16 {
        self.backend_port
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// `host:port` suitable for a URI authority (IPv6 literals bracketed).
    pub fn authority(&self) -> String {
        let host = self.backend_host.as_str();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.backend_port)
        } else {
            format!("{}:{}", host, self.backend_port)
        }
    }

    /// Host without IPv6 brackets, as the resolver expects it.
    fn connect_host(&self) -> &str {
        self.backend_host
            .trim_start_matches('[')
            .trim_end_matches(']')
    }
}

/// Owner of the active session.
#[derive(Debug)]
pub struct SessionRegistry {
    current: RwLock<Option<Arc<Session>>>,
    probe_timeout: Duration,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            probe_timeout,
        }
    }

    /// The session new requests should be dispatched with.
    pub fn get_active_session(&self) -> Result<Arc<Session>, ProxyError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ProxyError::NoActiveSession)
    }

    /// True once any session has been installed.
    pub fn has_session(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Validate, probe and atomically install a new session.
    ///
    /// On any error the previous session stays authoritative.
    pub async fn set_session(
        &self,
        host: &str,
        port: u16,
        token: Token,
    ) -> Result<Arc<Session>, ProxyError> {
        validate(host, port, &token)?;
        let session = Session::new(host, port, token);
        self.probe(&session).await?;
        Ok(self.install(session))
    }

    /// Swap in an already validated session.
    fn install(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            guard.replace(Arc::clone(&session))
        };

        metrics::record_session_swap();
        match previous {
            Some(prev) => tracing::info!(
                previous = %prev.authority(),
                backend = %session.authority(),
                "Backend session rotated"
            ),
            None => tracing::info!(backend = %session.authority(), "Backend session installed"),
        }
        session
    }

    async fn probe(&self, session: &Session) -> Result<(), ProxyError> {
        let addr = session.authority();
        let target = (session.connect_host(), session.backend_port());
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!(backend = %addr, "Reachability probe succeeded");
                Ok(())
            }
            Ok(Err(e)) => Err(ProxyError::UnreachableBackend {
                addr,
                reason: e.to_string(),
            }),
            Err(_) => Err(ProxyError::UnreachableBackend {
                addr,
                reason: format!("connect timed out after {} ms", self.probe_timeout.as_millis()),
            }),
        }
    }
}

/// Reject malformed session input before any network activity.
pub fn validate(host: &str, port: u16, token: &Token) -> Result<(), ProxyError> {
    check_host(host).map_err(ProxyError::InvalidSession)?;
    if port == 0 {
        return Err(ProxyError::InvalidSession("port must be between 1 and 65535".into()));
    }
    if token.is_empty() {
        return Err(ProxyError::InvalidSession("token is empty".into()));
    }
    Ok(())
}
