//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::serve::Listener;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, Uri, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use session_proxy::config::{BackendProtocol, ProxyConfig};
use session_proxy::error::StartupError;
use session_proxy::{LifecycleManager, ProxyServer, SessionRegistry, Token};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// What the backend saw.
#[derive(Debug)]
pub struct Captured {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// How the backend answers.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: &'static str,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub requests: mpsc::UnboundedReceiver<Captured>,
    /// Handlers currently running; drops to zero when a request is cancelled.
    pub active: Arc<AtomicUsize>,
}

impl MockBackend {
    pub async fn next_request(&mut self) -> Captured {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("backend saw no request")
            .expect("backend stopped")
    }

    /// Assert nothing else reaches the backend within a short window.
    pub async fn assert_no_more_requests(&mut self) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(self.requests.try_recv().is_err(), "backend saw an extra request");
    }

    pub fn active_handlers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Start a hyper backend speaking only `protocol` (HTTP/2 with prior knowledge,
/// or HTTP/1.1).
pub async fn start_backend(protocol: BackendProtocol, reply: Reply) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let active = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&active);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            let reply = reply.clone();
            let counter = Arc::clone(&counter);
            let service = service_fn(move |req: Request<Incoming>| {
                let tx = tx.clone();
                let reply = reply.clone();
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _guard = ActiveGuard(counter);

                    let (parts, body) = req.into_parts();
                    let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
                    let _ = tx.send(Captured {
                        method: parts.method,
                        uri: parts.uri,
                        version: parts.version,
                        headers: parts.headers,
                        body,
                    });
                    tokio::time::sleep(reply.delay).await;

                    let response = Response::builder()
                        .status(reply.status)
                        .header("content-type", "application/json")
                        .header("x-backend", "mock")
                        .body(Full::new(Bytes::from_static(reply.body.as_bytes())))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                }
            });

            let io = TokioIo::new(stream);
            match protocol {
                BackendProtocol::Http2 => {
                    tokio::spawn(async move {
                        let _ = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service)
                            .await;
                    });
                }
                BackendProtocol::Http1 => {
                    tokio::spawn(async move {
                        let _ = hyper::server::conn::http1::Builder::new()
                            .serve_connection(io, service)
                            .await;
                    });
                }
            }
        }
    });

    MockBackend {
        addr,
        requests: rx,
        active,
    }
}

/// A free port that nothing is listening on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn proxy_config(protocol: BackendProtocol) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listen_port = Some(0);
    config.backend.host = "127.0.0.1".into();
    config.backend.protocol = protocol;
    config.timeouts.request_ms = 5_000;
    config.timeouts.drain_ms = 2_000;
    config.timeouts.connect_ms = 500;
    config.timeouts.probe_ms = 500;
    config
}

/// An in-process proxy on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn set_session(&self, backend: SocketAddr, token: &str) {
        self.registry
            .set_session("127.0.0.1", backend.port(), Token::new(token))
            .await
            .unwrap();
    }

    /// Start draining, as a SIGTERM would.
    pub fn begin_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let registry = Arc::new(SessionRegistry::new(config.timeouts.probe()));
    let lifecycle = LifecycleManager::new(&config).unwrap();
    let listener = lifecycle.bind().await.unwrap();
    let addr = Listener::local_addr(&listener).unwrap();

    let server = ProxyServer::new(&config, Arc::clone(&registry), lifecycle.handles());
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        lifecycle
            .serve(listener, server.into_router(), async {
                let _ = rx.await;
            })
            .await
    });

    TestProxy {
        addr,
        registry,
        shutdown: Some(tx),
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
