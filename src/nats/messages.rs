use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::participants::Participant;
use crate::recognition::{
    CancellationErrorCode, CancellationReason, EngineStartRequest, RawEngineEvent, RawResult,
};

/// What a control message asks the STT service to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
    UpdateParticipants,
}

/// Control message published to `stt.control.<session_id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub session_id: String,
    pub action: ControlAction,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
    pub timestamp: String, // RFC3339 timestamp
}

impl ControlMessage {
    fn new(session_id: &str, action: ControlAction) -> Self {
        Self {
            session_id: session_id.to_string(),
            action,
            parameters: BTreeMap::new(),
            target_languages: Vec::new(),
            voice_name: None,
            participants: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn start(request: &EngineStartRequest) -> Self {
        Self {
            parameters: request.parameters.clone(),
            target_languages: request.target_languages.clone(),
            voice_name: request.voice_name.clone(),
            participants: request.participants.clone(),
            ..Self::new(&request.session_id, ControlAction::Start)
        }
    }

    pub fn stop(session_id: &str) -> Self {
        Self::new(session_id, ControlAction::Stop)
    }

    pub fn update_participants(session_id: &str, participants: &[Participant]) -> Self {
        Self {
            participants: participants.to_vec(),
            ..Self::new(session_id, ControlAction::UpdateParticipants)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechMarker {
    SpeechStart,
    SpeechEnd,
}

/// Transcript message received from STT service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Utterance index; assigned locally when the service omits it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance: Option<u64>,
    #[serde(default)]
    pub offset_ms: u64,
    #[serde(default)]
    pub duration_ms: u64,
    /// Translated text by target language
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub end_of_stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<SpeechMarker>,
}

/// Numbers utterances for services that do not
#[derive(Debug)]
pub struct UtteranceCounter {
    next: u64,
    open: Option<u64>,
}

impl Default for UtteranceCounter {
    fn default() -> Self {
        Self { next: 1, open: None }
    }
}

impl UtteranceCounter {
    /// Partials stay on the open utterance; a final closes it
    pub fn assign(&mut self, explicit: Option<u64>, partial: bool) -> u64 {
        let utterance = explicit.or(self.open).unwrap_or(self.next);
        self.next = self.next.max(utterance + 1);
        self.open = if partial { Some(utterance) } else { None };
        utterance
    }
}

impl TranscriptMessage {
    /// Convert to the engine event the session pipeline understands.
    ///
    /// `raw_json` is kept as the detailed payload of results.
    pub fn into_engine_event(
        self,
        utterances: &mut UtteranceCounter,
        raw_json: Option<String>,
    ) -> RawEngineEvent {
        let offset = Duration::from_millis(self.offset_ms);

        match self.event {
            Some(SpeechMarker::SpeechStart) => return RawEngineEvent::SpeechStartDetected { offset },
            Some(SpeechMarker::SpeechEnd) => return RawEngineEvent::SpeechEndDetected { offset },
            None => {}
        }

        if self.error.is_some() || self.end_of_stream {
            let (reason, default_code) = match &self.error {
                Some(_) => (CancellationReason::Error, CancellationErrorCode::ServiceError),
                None => (CancellationReason::EndOfStream, CancellationErrorCode::NoError),
            };
            let code = self
                .error_code
                .as_deref()
                .and_then(CancellationErrorCode::from_name)
                .unwrap_or(default_code);
            return RawEngineEvent::Error {
                utterance: self.utterance,
                reason,
                code,
                details: self.error.unwrap_or_default(),
            };
        }

        let utterance = utterances.assign(self.utterance, self.partial);
        let raw = RawResult {
            utterance,
            text: self.text,
            offset,
            duration: Duration::from_millis(self.duration_ms),
            confidence: self.confidence,
            speaker_id: self.speaker_id,
            detailed_json: raw_json,
            translations: self.translations.into_iter().collect(),
            synthesis: Vec::new(),
        };

        if self.partial {
            RawEngineEvent::Intermediate(raw)
        } else {
            RawEngineEvent::Final(raw)
        }
    }
}
