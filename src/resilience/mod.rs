//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → forwarder enforces the request deadline (BackendTimeout on expiry)
//!     → On failure: retries.rs (connect failures only, one extra attempt)
//!
//! Startup session bootstrap:
//!     → backoff.rs (exponential delay + jitter between probes)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Retry is bounded to a single extra attempt to avoid retry storms

pub mod backoff;
pub mod retries;
