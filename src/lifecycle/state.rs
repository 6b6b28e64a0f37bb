//! Lifecycle state machine.
//!
//! ```text
//! Unbound → Binding → Listening → Draining → Stopped
//!              │          │
//!              └──────────┴──────────────────→ Stopped (bind failure / server error)
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Unbound,
    Binding,
    Listening,
    Draining,
    Stopped,
}

impl LifecycleState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unbound, Binding)
                | (Binding, Listening)
                | (Binding, Stopped)
                | (Listening, Draining)
                | (Listening, Stopped)
                | (Draining, Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unbound => "unbound",
            LifecycleState::Binding => "binding",
            LifecycleState::Listening => "listening",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [Unbound, Binding, Listening, Draining, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} → {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_going_back() {
        assert!(!Listening.can_transition_to(Binding));
        assert!(!Draining.can_transition_to(Listening));
        assert!(!Stopped.can_transition_to(Unbound));
        assert!(!Unbound.can_transition_to(Listening));
    }
}
