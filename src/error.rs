use thiserror::Error;

use crate::recognition::CancellationDetails;
use crate::session::SessionState;
use crate::task::OperationKind;

/// Errors returned by the public session API.
///
/// Engine-originated failures during an active session never surface here;
/// they are delivered to subscribers as a `Canceled` result instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// A required value was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid for the current session state.
    #[error("`{operation}` is not valid while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Another session operation is still outstanding.
    #[error("{active} operation is still outstanding")]
    Busy { active: OperationKind },

    /// Removal of a participant that is not a member.
    #[error("participant `{0}` not found")]
    NotFound(String),

    /// Recognition ended without a result.
    #[error("recognition canceled: {0}")]
    Canceled(CancellationDetails),

    /// The session was torn down.
    #[error("session has been disposed")]
    Disposed,
}

pub type SpeechResult<T> = std::result::Result<T, SpeechError>;
