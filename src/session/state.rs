use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Recognizing,
    Stopping,
    Disposed,
}

impl SessionState {
    /// Whether the controller may move from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Idle, Starting) => true,
            (Starting, Recognizing) | (Starting, Stopping) | (Starting, Idle) => true,
            (Recognizing, Stopping) => true,
            (Stopping, Idle) => true,
            _ => false,
        }
    }

    /// The engine may be producing events
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Recognizing | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Recognizing => "recognizing",
            SessionState::Stopping => "stopping",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Recognizing));
        assert!(Starting.can_transition_to(Stopping));
        assert!(Starting.can_transition_to(Idle));
        assert!(Recognizing.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Idle));
        assert!(Recognizing.can_transition_to(Disposed));
    }

    #[test]
    fn test_no_backward_or_absorbing_escape() {
        assert!(!Recognizing.can_transition_to(Starting));
        assert!(!Recognizing.can_transition_to(Idle));
        assert!(!Stopping.can_transition_to(Recognizing));
        assert!(!Idle.can_transition_to(Recognizing));
        assert!(!Disposed.can_transition_to(Idle));
        assert!(!Disposed.can_transition_to(Disposed));
    }
}
