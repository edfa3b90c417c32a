use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::recognition::SessionResult;

/// Event channels a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionStopped,
    SpeechStartDetected,
    SpeechEndDetected,
    /// Reason = Recognizing
    IntermediateResult,
    /// Reason = Recognized or NoMatch
    FinalResult,
    /// Reason = Canceled
    Canceled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::SessionStarted => "session_started",
            EventKind::SessionStopped => "session_stopped",
            EventKind::SpeechStartDetected => "speech_start_detected",
            EventKind::SpeechEndDetected => "speech_end_detected",
            EventKind::IntermediateResult => "intermediate_result",
            EventKind::FinalResult => "final_result",
            EventKind::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// An event published on a session's bus
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStarted { session_id: String },
    SessionStopped { session_id: String },
    SpeechStartDetected { session_id: String, offset: Duration },
    SpeechEndDetected { session_id: String, offset: Duration },
    Result(SessionResult),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SessionStarted { .. } => EventKind::SessionStarted,
            SessionEvent::SessionStopped { .. } => EventKind::SessionStopped,
            SessionEvent::SpeechStartDetected { .. } => EventKind::SpeechStartDetected,
            SessionEvent::SpeechEndDetected { .. } => EventKind::SpeechEndDetected,
            SessionEvent::Result(result) => result.reason().event_kind(),
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::SessionStarted { session_id }
            | SessionEvent::SessionStopped { session_id }
            | SessionEvent::SpeechStartDetected { session_id, .. }
            | SessionEvent::SpeechEndDetected { session_id, .. } => session_id,
            SessionEvent::Result(result) => &result.recognition().session_id,
        }
    }

    /// The recognition result carried by result events
    pub fn result(&self) -> Option<&SessionResult> {
        match self {
            SessionEvent::Result(result) => Some(result),
            _ => None,
        }
    }
}
