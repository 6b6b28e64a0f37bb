//! Backend request forwarding.
//!
//! # Data Flow
//! ```text
//! PendingRequest + Arc<Session>
//!     → body.rs (bounded reconstruction of the inbound body)
//!     → session credentials (fresh Authorization per request)
//!     → bridge (build outbound request in backend protocol)
//!     → client.rs (hyper-util client, HTTP/1.1 or HTTP/2)
//!     → bridge (translate response for the client)
//! ```

pub mod body;
pub mod client;
pub mod forwarder;

pub use client::BackendClient;
pub use forwarder::Forwarder;
