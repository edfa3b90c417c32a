use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::events::EventKind;
use crate::translation::TranslationResult;

/// Why a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    /// Hypothesis for an utterance still in progress
    Recognizing,
    Recognized,
    NoMatch,
    Canceled,
}

impl ResultReason {
    /// Terminal results close their utterance
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResultReason::Recognizing)
    }

    pub fn event_kind(self) -> EventKind {
        match self {
            ResultReason::Recognizing => EventKind::IntermediateResult,
            ResultReason::Recognized | ResultReason::NoMatch => EventKind::FinalResult,
            ResultReason::Canceled => EventKind::Canceled,
        }
    }
}

impl fmt::Display for ResultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultReason::Recognizing => "recognizing",
            ResultReason::Recognized => "recognized",
            ResultReason::NoMatch => "no_match",
            ResultReason::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    Error,
    EndOfStream,
    UserRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationErrorCode {
    NoError,
    AuthenticationFailure,
    BadRequest,
    TooManyRequests,
    Forbidden,
    ConnectionFailure,
    ServiceTimeout,
    ServiceError,
    ServiceUnavailable,
    RuntimeError,
}

impl CancellationErrorCode {
    /// Parse the snake_case wire name used by remote engines
    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name.trim().to_ascii_lowercase().as_str() {
            "no_error" => Self::NoError,
            "authentication_failure" => Self::AuthenticationFailure,
            "bad_request" => Self::BadRequest,
            "too_many_requests" => Self::TooManyRequests,
            "forbidden" => Self::Forbidden,
            "connection_failure" => Self::ConnectionFailure,
            "service_timeout" => Self::ServiceTimeout,
            "service_error" => Self::ServiceError,
            "service_unavailable" => Self::ServiceUnavailable,
            "runtime_error" => Self::RuntimeError,
            _ => return None,
        };
        Some(code)
    }
}

/// Attached to every Canceled result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub reason: CancellationReason,
    pub code: CancellationErrorCode,
    pub error_details: String,
}

impl CancellationDetails {
    pub fn error(code: CancellationErrorCode, details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Error,
            code,
            error_details: details.into(),
        }
    }

    pub fn user_requested(details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::UserRequested,
            code: CancellationErrorCode::NoError,
            error_details: details.into(),
        }
    }

    pub fn end_of_stream() -> Self {
        Self {
            reason: CancellationReason::EndOfStream,
            code: CancellationErrorCode::NoError,
            error_details: String::new(),
        }
    }

    /// An engine that fails to start or run is treated as unreachable
    pub fn from_engine_error(error: &anyhow::Error) -> Self {
        Self::error(CancellationErrorCode::ConnectionFailure, format!("{:#}", error))
    }
}

impl fmt::Display for CancellationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:?})", self.reason, self.code)?;
        if !self.error_details.is_empty() {
            write!(f, ": {}", self.error_details)?;
        }
        Ok(())
    }
}

/// One classified recognition outcome. Shared, never mutated after delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub result_id: Uuid,
    pub session_id: String,
    pub utterance: u64,
    pub text: String,
    pub reason: ResultReason,
    #[serde(with = "duration_ms")]
    pub offset: Duration,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    /// Engine payload, kept only with `OutputFormat=detailed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationDetails>,
}

impl RecognitionResult {
    pub fn is_terminal(&self) -> bool {
        self.reason.is_terminal()
    }
}

/// What subscribers receive for result events
#[derive(Debug, Clone)]
pub enum SessionResult {
    Speech(Arc<RecognitionResult>),
    Translation(Arc<TranslationResult>),
}

impl SessionResult {
    pub fn recognition(&self) -> &RecognitionResult {
        match self {
            SessionResult::Speech(result) => result,
            SessionResult::Translation(result) => &result.recognition,
        }
    }

    pub fn reason(&self) -> ResultReason {
        self.recognition().reason
    }

    pub fn text(&self) -> &str {
        &self.recognition().text
    }

    pub fn cancellation(&self) -> Option<&CancellationDetails> {
        self.recognition().cancellation.as_ref()
    }

    pub fn translation(&self) -> Option<&TranslationResult> {
        match self {
            SessionResult::Translation(result) => Some(result),
            SessionResult::Speech(_) => None,
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_routing() {
        assert_eq!(ResultReason::Recognizing.event_kind(), EventKind::IntermediateResult);
        assert_eq!(ResultReason::Recognized.event_kind(), EventKind::FinalResult);
        assert_eq!(ResultReason::NoMatch.event_kind(), EventKind::FinalResult);
        assert_eq!(ResultReason::Canceled.event_kind(), EventKind::Canceled);
        assert!(!ResultReason::Recognizing.is_terminal());
        assert!(ResultReason::NoMatch.is_terminal());
    }

    #[test]
    fn test_error_code_names() {
        assert_eq!(
            CancellationErrorCode::from_name("Service_Timeout"),
            Some(CancellationErrorCode::ServiceTimeout)
        );
        assert_eq!(CancellationErrorCode::from_name("bogus"), None);
    }

    #[test]
    fn test_engine_error_details() {
        let details = CancellationDetails::from_engine_error(&anyhow::anyhow!("refused"));
        assert_eq!(details.reason, CancellationReason::Error);
        assert_eq!(details.code, CancellationErrorCode::ConnectionFailure);
        assert_eq!(details.to_string(), "Error (ConnectionFailure): refused");
    }
}
