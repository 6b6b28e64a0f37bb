//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! client connection (HTTP/1.1)
//!     → server.rs (Axum setup, middleware, session lookup)
//!     → request.rs (request ID)
//!     → bridge.rs (terminate inbound → PendingRequest)
//!     → [forwarder re-originates in backend protocol]
//!     → bridge.rs (backend response → client framing)
//!     → Send to client
//! ```

pub mod bridge;
pub mod request;
pub mod server;

pub use bridge::PendingRequest;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, ProxyServer};
