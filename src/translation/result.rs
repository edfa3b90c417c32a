use serde::Serialize;
use std::ops::Deref;

use super::AudioSegment;
use crate::recognition::RecognitionResult;

/// Translation of one utterance into one target language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationEntry {
    pub language: String,
    pub text: String,
    /// Absent when synthesis was not requested or not available
    #[serde(skip)]
    pub audio: Option<AudioSegment>,
}

/// A recognition result together with every configured target language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    #[serde(flatten)]
    pub recognition: RecognitionResult,
    /// In configured target-language order
    pub entries: Vec<TranslationEntry>,
    #[serde(skip)]
    pub audio_requested: bool,
}

impl TranslationResult {
    pub fn translation(&self, language: &str) -> Option<&str> {
        self.entry(language).map(|e| e.text.as_str())
    }

    pub fn audio(&self, language: &str) -> Option<&AudioSegment> {
        self.entry(language).and_then(|e| e.audio.as_ref())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.language.as_str())
    }

    /// Audio was requested but at least one language came back without it
    pub fn is_partial_audio(&self) -> bool {
        self.audio_requested && self.entries.iter().any(|e| e.audio.is_none())
    }

    fn entry(&self, language: &str) -> Option<&TranslationEntry> {
        self.entries
            .iter()
            .find(|e| e.language.eq_ignore_ascii_case(language))
    }
}

impl Deref for TranslationResult {
    type Target = RecognitionResult;

    fn deref(&self) -> &RecognitionResult {
        &self.recognition
    }
}
