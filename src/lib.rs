//! Session proxy library.
//!
//! Bridges an HTTP/1.1 client to a backend whose address and credential are
//! only known at runtime, injecting `Authorization: Basic` on every request.

pub mod admin;
pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod session;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, StartupError};
pub use http::ProxyServer;
pub use lifecycle::{LifecycleManager, LifecycleState, Shutdown};
pub use session::{Session, SessionRegistry, Token};
