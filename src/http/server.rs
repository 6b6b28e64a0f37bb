//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, sensitive headers, request ID)
//! - Resolve the active session per request and hand off to the forwarder
//! - Convert per-request failures into JSON error responses
//! - Abort in-flight work when the drain grace period runs out

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{sensitive_headers::SetSensitiveRequestHeadersLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::Forwarder;
use crate::http::bridge::PendingRequest;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::lifecycle::shutdown::triggered;
use crate::lifecycle::ServeHandles;
use crate::net::InFlightTracker;
use crate::observability::metrics;
use crate::session::SessionRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub tracker: InFlightTracker,
    pub hard_stop: watch::Receiver<bool>,
}

/// Client-facing HTTP server of the proxy.
pub struct ProxyServer {
    router: Router,
    state: AppState,
}

impl ProxyServer {
    /// Create a new server forwarding through `registry`'s active session.
    pub fn new(config: &ProxyConfig, registry: Arc<SessionRegistry>, handles: ServeHandles) -> Self {
        let state = AppState {
            registry,
            forwarder: Arc::new(Forwarder::new(config)),
            tracker: handles.tracker,
            hard_stop: handles.hard_stop,
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetSensitiveRequestHeadersLayer::new([
                        header::AUTHORIZATION,
                        header::PROXY_AUTHORIZATION,
                    ]))
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Catch-all proxy handler.
/// Resolves the session, forwards, and maps failures to JSON errors.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let _in_flight = state.tracker.track();

    let request_id = request.request_id().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let session = match state.registry.get_active_session() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error_class = e.class(), "Rejecting request without a session");
            metrics::record_request(method.as_str(), e.status().as_u16(), start);
            return e.into_response();
        }
    };

    let pending = PendingRequest::from_inbound(request);
    let mut hard_stop = state.hard_stop.clone();
    let aborted = async move { triggered(&mut hard_stop).await };

    // Dropping the forward future (here, or when hyper drops this handler on
    // client disconnect) cancels the backend call and closes its connection.
    let outcome = tokio::select! {
        result = state.forwarder.forward(pending, Arc::clone(&session)) => result,
        _ = aborted => Err(ProxyError::ShuttingDown),
    };

    match outcome {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), start);
            response
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                backend = %session.authority(),
                error_class = e.class(),
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request failed"
            );
            metrics::record_backend_error(e.class());
            metrics::record_request(method.as_str(), e.status().as_u16(), start);
            e.into_response()
        }
    }
}
