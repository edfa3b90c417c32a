use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::result::{CancellationErrorCode, CancellationReason};
use super::sink::EngineSink;
use crate::participants::Participant;
use crate::translation::AudioSegment;

/// A hypothesis or final result as the engine reports it, before classification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub utterance: u64,
    pub text: String,
    pub offset: Duration,
    pub duration: Duration,
    pub confidence: Option<f32>,
    pub speaker_id: Option<String>,
    pub detailed_json: Option<String>,
    /// (language, text) pairs in whatever order the engine produced them
    pub translations: Vec<(String, String)>,
    /// (language, audio) pairs for synthesized translations
    pub synthesis: Vec<(String, AudioSegment)>,
}

impl RawResult {
    pub fn new(utterance: u64, text: impl Into<String>) -> Self {
        Self {
            utterance,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_timing(mut self, offset: Duration, duration: Duration) -> Self {
        self.offset = offset;
        self.duration = duration;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_speaker(mut self, speaker_id: impl Into<String>) -> Self {
        self.speaker_id = Some(speaker_id.into());
        self
    }

    pub fn with_detailed_json(mut self, json: impl Into<String>) -> Self {
        self.detailed_json = Some(json.into());
        self
    }

    pub fn with_translation(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.translations.push((language.into(), text.into()));
        self
    }

    pub fn with_synthesis(mut self, language: impl Into<String>, audio: AudioSegment) -> Self {
        self.synthesis.push((language.into(), audio));
        self
    }
}

/// Everything an engine can report into its sink
#[derive(Debug, Clone, PartialEq)]
pub enum RawEngineEvent {
    SpeechStartDetected { offset: Duration },
    SpeechEndDetected { offset: Duration },
    Intermediate(RawResult),
    Final(RawResult),
    Error {
        utterance: Option<u64>,
        reason: CancellationReason,
        code: CancellationErrorCode,
        details: String,
    },
}

/// What a session hands its engine on start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStartRequest {
    pub session_id: String,
    /// Snapshot of every session parameter at start time
    pub parameters: BTreeMap<String, String>,
    pub target_languages: Vec<String>,
    pub voice_name: Option<String>,
    pub participants: Vec<Participant>,
}

impl EngineStartRequest {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// The recognizer a session drives.
///
/// `start` returning `Ok` is the engine's acknowledgement; results flow into
/// the sink from the engine's own context afterwards. `stop` returning is the
/// acknowledgement that the engine will push nothing further.
#[async_trait]
pub trait RecognitionEngine: Send + Sync + 'static {
    /// Begin recognizing. Should return early once `cancel` fires.
    async fn start(
        &self,
        request: EngineStartRequest,
        sink: EngineSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    /// Free engine resources. Called once, during disposal.
    async fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Conversation roster changed while running
    fn participants_changed(&self, _participants: &[Participant]) {}

    /// Engine name for logging
    fn name(&self) -> &str;
}
