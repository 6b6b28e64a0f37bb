//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → Hand off to HTTP layer (axum::serve)
//!     → inflight.rs (per-request tracking for draining)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - The listener is bound once; a conflicting port fails fast

pub mod inflight;
pub mod listener;

pub use inflight::{InFlightGuard, InFlightTracker};
pub use listener::BoundedListener;
