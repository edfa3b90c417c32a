pub mod client;
pub mod messages;

pub use client::{control_subject, NatsEngine, TRANSCRIPT_SUBJECT};
pub use messages::{ControlAction, ControlMessage, SpeechMarker, TranscriptMessage, UtteranceCounter};
