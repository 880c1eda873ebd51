//! Per-request lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single tool-use request within a turn
///
/// ```text
/// Pending -> Gating -> Running  -> Completed | Failed | Interrupted
///                   -> Rejected | Denied | Interrupted
/// Pending -> NotStarted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Queued, nothing evaluated yet
    Pending,

    /// Validating input and resolving permission
    Gating,

    /// Tool is executing
    Running,

    /// Input invalid or user said no
    Rejected,

    /// Categorically not allowed (e.g. no way to ask the user)
    Denied,

    /// Tool produced its result
    Completed,

    /// Tool raised an error
    Failed,

    /// Cancelled while in flight
    Interrupted,

    /// Cancelled before it was ever started
    NotStarted,
}

impl RequestState {
    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Rejected
                | RequestState::Denied
                | RequestState::Completed
                | RequestState::Failed
                | RequestState::Interrupted
                | RequestState::NotStarted
        )
    }

    /// Check if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Gating)
                | (Pending, NotStarted)
                | (Gating, Running)
                | (Gating, Rejected)
                | (Gating, Denied)
                | (Gating, Interrupted)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Interrupted)
        )
    }
}

impl Default for RequestState {
    fn default() -> Self {
        RequestState::Pending
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestState::Pending => "Pending",
            RequestState::Gating => "Gating",
            RequestState::Running => "Running",
            RequestState::Rejected => "Rejected",
            RequestState::Denied => "Denied",
            RequestState::Completed => "Completed",
            RequestState::Failed => "Failed",
            RequestState::Interrupted => "Interrupted",
            RequestState::NotStarted => "Not started",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RequestState::Completed.is_terminal());
        assert!(RequestState::NotStarted.is_terminal());
        assert!(RequestState::Denied.is_terminal());
        assert!(!RequestState::Pending.is_terminal());
        assert!(!RequestState::Gating.is_terminal());
        assert!(!RequestState::Running.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use RequestState::*;
        assert!(Pending.can_transition_to(Gating));
        assert!(Gating.can_transition_to(Running));
        assert!(Running.can_transition_to(Interrupted));
        assert!(Gating.can_transition_to(Interrupted));

        // No skipping the gate, no leaving a terminal state
        assert!(!Pending.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Running.can_transition_to(NotStarted));
        assert!(!Rejected.can_transition_to(Running));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RequestState::Pending.to_string(), "Pending");
        assert_eq!(RequestState::NotStarted.to_string(), "Not started");
    }
}
