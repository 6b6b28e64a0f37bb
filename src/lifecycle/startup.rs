//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the client-facing listener, failing fast on a port conflict
//! - Reclaim the port from its owner only when explicitly authorized
//! - Install the initial session, retrying while the backend comes up
//!
//! # Design Decisions
//! - Fail fast: a port conflict is fatal (exit code 2) unless reclaim is on
//! - Never terminate our own process, or a process we could not identify
//! - An unreachable backend at startup is not fatal; requests get 503 until
//!   the session bootstrap succeeds

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{ProxyError, StartupError};
use crate::lifecycle::port_owner::{self, PortOwner};
use crate::lifecycle::shutdown::triggered;
use crate::net::BoundedListener;
use crate::resilience::backoff::calculate_backoff;
use crate::session::{SessionRegistry, SessionSpec};

/// How long to keep retrying the bind after signalling the port owner.
const RECLAIM_WAIT: Duration = Duration::from_secs(5);
const RECLAIM_POLL: Duration = Duration::from_millis(100);

const BOOTSTRAP_BASE_MS: u64 = 250;
const BOOTSTRAP_MAX_MS: u64 = 10_000;

/// Bind `addr`, handling a port conflict per the reclaim policy.
pub async fn bind_listener(
    addr: SocketAddr,
    max_connections: usize,
    reclaim: bool,
) -> Result<BoundedListener, StartupError> {
    let err = match BoundedListener::bind(addr, max_connections).await {
        Ok(listener) => return Ok(listener),
        Err(e) => e,
    };

    if err.kind() != io::ErrorKind::AddrInUse {
        return Err(StartupError::Bind {
            addr: addr.to_string(),
            source: err,
        });
    }

    let port = addr.port();
    let owner = port_owner::find_listener(port);
    match (&owner, reclaim) {
        (Some(owner), true) if owner.pid != std::process::id() => {
            reclaim_port(owner);
            wait_for_port(addr, max_connections, port, Some(owner.clone())).await
        }
        (_, true) => {
            tracing::error!(
                port,
                owner = owner.as_ref().map(ToString::to_string).unwrap_or_else(|| "unknown".into()),
                "Port in use and its owner cannot be reclaimed"
            );
            Err(StartupError::PortInUse { port, owner })
        }
        (_, false) => {
            tracing::error!(
                port,
                owner = owner.as_ref().map(ToString::to_string).unwrap_or_else(|| "unknown".into()),
                "Port in use; set reclaim_port to terminate its owner"
            );
            Err(StartupError::PortInUse { port, owner })
        }
    }
}

/// Ask the owner to exit with SIGTERM.
#[cfg(unix)]
fn reclaim_port(owner: &PortOwner) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(owner.pid) else {
        tracing::warn!(owner = %owner, "Owner pid out of range; not signalling");
        return;
    };
    tracing::warn!(owner = %owner, "Reclaiming port: sending SIGTERM to owner");
    if let Err(errno) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::warn!(owner = %owner, error = %errno, "SIGTERM to port owner failed");
    }
}

#[cfg(not(unix))]
fn reclaim_port(owner: &PortOwner) {
    tracing::warn!(owner = %owner, "Port reclaim is not supported on this platform");
}

async fn wait_for_port(
    addr: SocketAddr,
    max_connections: usize,
    port: u16,
    owner: Option<PortOwner>,
) -> Result<BoundedListener, StartupError> {
    let deadline = tokio::time::Instant::now() + RECLAIM_WAIT;
    loop {
        match BoundedListener::bind(addr, max_connections).await {
            Ok(listener) => {
                tracing::info!(port, "Port reclaimed");
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if tokio::time::Instant::now() >= deadline {
                    tracing::error!(port, "Port still in use after reclaim attempt");
                    return Err(StartupError::PortInUse { port, owner });
                }
                tokio::time::sleep(RECLAIM_POLL).await;
            }
            Err(source) => {
                return Err(StartupError::Bind {
                    addr: addr.to_string(),
                    source,
                })
            }
        }
    }
}

/// Install the initial session, retrying with backoff while the backend is
/// unreachable. Stops early if `stop` fires or another source (session file,
/// admin API) installs a session first.
pub async fn bootstrap_session(
    registry: Arc<SessionRegistry>,
    spec: SessionSpec,
    mut stop: watch::Receiver<bool>,
) {
    let backend = format!("{}:{}", spec.host, spec.port);
    let mut attempt = 0;
    loop {
        match registry
            .set_session(&spec.host, spec.port, spec.token.clone())
            .await
        {
            Ok(_) => return,
            Err(ProxyError::UnreachableBackend { reason, .. }) => {
                attempt += 1;
                let delay = calculate_backoff(attempt, BOOTSTRAP_BASE_MS, BOOTSTRAP_MAX_MS);
                tracing::warn!(
                    backend = %backend,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    reason = %spec.token.scrub(&reason),
                    "Backend not reachable yet"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = triggered(&mut stop) => return,
                }
                if registry.has_session() {
                    tracing::debug!("Session installed by another source; bootstrap done");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(backend = %backend, error_class = e.class(), error = %e, "Initial session rejected");
                return;
            }
        }
    }
}
