use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SessionState;

/// Statistics about a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session object was created
    pub created_at: DateTime<Utc>,

    /// When the current (or last) run started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at` while running, else length of the last run
    pub duration_secs: f64,

    pub intermediate_results: u64,
    pub final_results: u64,
    pub no_match_results: u64,
    pub canceled_results: u64,

    /// Number of recognized segments in the transcript
    pub transcript_segments_count: usize,

    /// Handler errors and panics isolated by the event bus
    pub handler_failures: u64,
}

/// A single recognized utterance kept in the session transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Recognized text
    pub text: String,

    /// When this segment was delivered
    pub timestamp: DateTime<Utc>,

    /// Confidence score (0.0 to 1.0), if available
    pub confidence: Option<f32>,

    pub utterance: u64,

    /// Speaker attribution in conversation sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,

    /// Offset of the utterance from the start of the audio
    pub offset_ms: u64,

    pub duration_ms: u64,

    /// Translated text by target language
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translations: BTreeMap<String, String>,
}

/// Result counters kept by the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCounts {
    pub intermediate: u64,
    pub recognized: u64,
    pub no_match: u64,
    pub canceled: u64,
}
