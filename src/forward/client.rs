//! Backend HTTP client.
//!
//! The client speaks the backend's protocol natively (HTTP/1.1, or HTTP/2
//! with prior knowledge), which is what lets the bridge re-originate
//! requests instead of relaying bytes.

use std::time::Duration;

use axum::{body::Body, http::Request, http::Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client, Error as ClientError},
    rt::TokioExecutor,
};

use crate::config::BackendProtocol;

/// Thin wrapper over the hyper-util client configured for one protocol.
#[derive(Clone, Debug)]
pub struct BackendClient {
    inner: Client<HttpConnector, Body>,
    protocol: BackendProtocol,
}

impl BackendClient {
    pub fn new(protocol: BackendProtocol, connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        // No idle pooling: every attempt opens its own connection, so a
        // retry never lands on the socket that just failed, and dropping a
        // request future (client disconnect) closes its backend socket.
        let inner = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .retry_canceled_requests(false)
            .http2_only(protocol == BackendProtocol::Http2)
            .build(connector);

        Self { inner, protocol }
    }

    pub fn protocol(&self) -> BackendProtocol {
        self.protocol
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, ClientError> {
        self.inner.request(request).await
    }
}
