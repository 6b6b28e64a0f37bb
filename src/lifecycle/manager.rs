//! Lifecycle manager: owns the listener's state machine and the drain.
//!
//! # Shutdown sequence
//! ```text
//! signal → Draining: stop accepting, let in-flight requests finish
//!        → grace elapsed? trip hard stop (in-flight get 503), abort server
//!        → Stopped
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::sync::{oneshot, watch};

use crate::config::validation::ValidationError;
use crate::config::{ConfigError, ProxyConfig};
use crate::error::StartupError;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::startup;
use crate::lifecycle::state::LifecycleState;
use crate::net::{BoundedListener, InFlightTracker};

/// After the hard stop trips, how long aborted handlers get to flush their 503.
const HARD_STOP_FLUSH: Duration = Duration::from_millis(250);

/// Handles the request path needs from the lifecycle.
#[derive(Debug, Clone)]
pub struct ServeHandles {
    pub tracker: InFlightTracker,
    pub hard_stop: watch::Receiver<bool>,
}

/// Drives `Unbound → Binding → Listening → Draining → Stopped`.
pub struct LifecycleManager {
    state: watch::Sender<LifecycleState>,
    listen_addr: SocketAddr,
    reclaim: bool,
    max_connections: usize,
    drain_timeout: Duration,
    draining: Shutdown,
    hard_stop: Shutdown,
    tracker: InFlightTracker,
}

impl LifecycleManager {
    pub fn new(config: &ProxyConfig) -> Result<Self, StartupError> {
        let listen_addr = config
            .listen_addr()
            .ok_or(ConfigError::Validation(vec![ValidationError::Missing("listen_port")]))?;
        let (state, _) = watch::channel(LifecycleState::Unbound);
        Ok(Self {
            state,
            listen_addr,
            reclaim: config.reclaim_port,
            max_connections: config.max_connections,
            drain_timeout: config.timeouts.drain(),
            draining: Shutdown::new(),
            hard_stop: Shutdown::new(),
            tracker: InFlightTracker::new(),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Fires when draining begins. Background tasks stop on it.
    pub fn draining(&self) -> watch::Receiver<bool> {
        self.draining.subscribe()
    }

    pub fn handles(&self) -> ServeHandles {
        ServeHandles {
            tracker: self.tracker.clone(),
            hard_stop: self.hard_stop.subscribe(),
        }
    }

    pub fn tracker(&self) -> &InFlightTracker {
        &self.tracker
    }

    /// Bind the client-facing port. Moves to `Listening`, or `Stopped` on failure.
    pub async fn bind(&self) -> Result<BoundedListener, StartupError> {
        self.transition(LifecycleState::Binding);
        match startup::bind_listener(self.listen_addr, self.max_connections, self.reclaim).await {
            Ok(listener) => {
                self.transition(LifecycleState::Listening);
                Ok(listener)
            }
            Err(e) => {
                self.transition(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    /// Serve `router` on `listener` until `shutdown` resolves, then drain.
    ///
    /// Returns once the lifecycle reaches `Stopped`. Exceeding the drain grace
    /// period is not an error.
    pub async fn serve<F>(
        &self,
        listener: BoundedListener,
        router: Router,
        shutdown: F,
    ) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send,
    {
        let (stop_accepting, stop_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        });
        let mut task = tokio::spawn(async move { server.await });

        tokio::pin!(shutdown);
        let exited_early = tokio::select! {
            result = &mut task => Some(result),
            _ = &mut shutdown => None,
        };
        if let Some(result) = exited_early {
            self.transition(LifecycleState::Stopped);
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(StartupError::Serve(e)),
                Err(join) => Err(StartupError::Serve(io::Error::other(join))),
            };
        }

        self.transition(LifecycleState::Draining);
        self.draining.trigger();
        let _ = stop_accepting.send(());
        tracing::info!(
            in_flight = self.tracker.active_count(),
            grace_ms = self.drain_timeout.as_millis() as u64,
            "Draining"
        );

        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => tracing::info!("Drain complete"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server error during drain"),
            Ok(Err(join)) => tracing::error!(error = %join, "Server task failed during drain"),
            Err(_) => {
                tracing::warn!(
                    in_flight = self.tracker.active_count(),
                    "Drain grace period elapsed; aborting in-flight requests"
                );
                self.hard_stop.trigger();
                let _ = tokio::time::timeout(HARD_STOP_FLUSH, self.tracker.wait_idle()).await;
                task.abort();
            }
        }

        self.transition(LifecycleState::Stopped);
        Ok(())
    }

    fn transition(&self, next: LifecycleState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "Ignoring illegal lifecycle transition");
            return;
        }
        self.state.send_replace(next);
        tracing::info!(from = %current, to = %next, "Lifecycle transition");
    }
}
