//! Retry policy for backend exchanges.
//!
//! # Responsibilities
//! - Classify backend failures (connect vs. mid-exchange)
//! - Allow exactly one extra attempt, on a fresh connection, and only when
//!   the request never reached the backend
//!
//! # Design Decisions
//! - A connect failure is safe to retry for any method: nothing was sent
//! - A reset after the request was written is never retried (could duplicate
//!   a non-idempotent call); it surfaces as 502
//! - The same session is reused for the second attempt

use hyper_util::client::legacy::Error as ClientError;

/// Total attempts per request: the original plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Coarse classification of a failed backend exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// TCP connect (or protocol handshake) failed; nothing reached the backend.
    Connect,
    /// The connection broke after the request was handed to it.
    Exchange,
}

impl FailureKind {
    pub fn classify(err: &ClientError) -> Self {
        if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Exchange
        }
    }
}

/// Whether a failed `attempt` (1-based) should be followed by another.
pub fn should_retry(attempt: u32, failure: FailureKind) -> bool {
    attempt < MAX_ATTEMPTS && failure == FailureKind::Connect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failure_retried_once() {
        assert!(should_retry(1, FailureKind::Connect));
        assert!(!should_retry(2, FailureKind::Connect));
    }

    #[test]
    fn exchange_failure_never_retried() {
        assert!(!should_retry(1, FailureKind::Exchange));
    }
}
