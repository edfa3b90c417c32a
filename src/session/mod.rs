//! Recognition session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - The session state machine (Idle → Starting → Recognizing → Stopping)
//! - Engine start/stop through the session's task runner
//! - Named session parameters
//! - Conversation participants
//! - Session statistics and the recognized transcript
//! - Ordered, idempotent disposal

mod config;
mod controller;
mod disposal;
pub mod parameters;
mod state;
mod stats;

pub use config::{SessionConfig, SessionMode};
pub use controller::SessionController;
pub use disposal::DisposalGuard;
pub use parameters::{OutputFormat, Parameters};
pub use state::SessionState;
pub use stats::{ResultCounts, SessionStats, TranscriptSegment};
