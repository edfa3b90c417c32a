use tracing::debug;

use super::{AudioSegment, TranslationEntry, TranslationResult};
use crate::error::{SpeechError, SpeechResult};
use crate::recognition::{RecognitionResult, ResultReason};

/// Expands one recognized utterance into a single `TranslationResult`
/// carrying every configured target language.
#[derive(Debug, Clone)]
pub struct TranslationMultiplexer {
    targets: Vec<String>,
}

impl TranslationMultiplexer {
    /// `targets` must be non-empty, free of blanks and duplicates
    pub fn new<I, S>(targets: I) -> SpeechResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validated: Vec<String> = Vec::new();
        for target in targets {
            let target = target.as_ref().trim();
            if target.is_empty() {
                return Err(SpeechError::InvalidArgument(
                    "target language must not be empty".to_string(),
                ));
            }
            if validated.iter().any(|t| t.eq_ignore_ascii_case(target)) {
                return Err(SpeechError::InvalidArgument(format!(
                    "duplicate target language `{}`",
                    target
                )));
            }
            validated.push(target.to_string());
        }

        if validated.is_empty() {
            return Err(SpeechError::InvalidArgument(
                "at least one target language is required".to_string(),
            ));
        }

        Ok(Self { targets: validated })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Build the result for one utterance.
    ///
    /// Entries follow the configured target order. A target the engine did
    /// not translate gets empty text; languages nobody asked for are ignored.
    /// Audio is only attached to final, recognized results and only when
    /// `audio_requested`; a language without synthesis simply has none.
    pub fn assemble(
        &self,
        recognition: RecognitionResult,
        mut translations: Vec<(String, String)>,
        mut synthesis: Vec<(String, AudioSegment)>,
        audio_requested: bool,
    ) -> TranslationResult {
        if recognition.reason == ResultReason::Canceled || recognition.reason == ResultReason::NoMatch {
            return TranslationResult {
                recognition,
                entries: Vec::new(),
                audio_requested,
            };
        }

        let attach_audio = audio_requested && recognition.reason == ResultReason::Recognized;

        let entries = self
            .targets
            .iter()
            .map(|language| {
                let text = take_language(&mut translations, language).unwrap_or_else(|| {
                    debug!(
                        "[{}] no {} translation for utterance {}",
                        recognition.session_id, language, recognition.utterance
                    );
                    String::new()
                });
                let audio = if attach_audio {
                    take_language(&mut synthesis, language)
                } else {
                    None
                };
                TranslationEntry {
                    language: language.clone(),
                    text,
                    audio,
                }
            })
            .collect();

        for (language, _) in &translations {
            debug!(
                "[{}] ignoring unrequested translation {}",
                recognition.session_id, language
            );
        }

        TranslationResult {
            recognition,
            entries,
            audio_requested,
        }
    }
}

fn take_language<T>(items: &mut Vec<(String, T)>, language: &str) -> Option<T> {
    let index = items
        .iter()
        .position(|(lang, _)| lang.eq_ignore_ascii_case(language))?;
    Some(items.remove(index).1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn recognition(reason: ResultReason) -> RecognitionResult {
        RecognitionResult {
            result_id: Uuid::new_v4(),
            session_id: "t".into(),
            utterance: 1,
            text: "good morning".into(),
            reason,
            offset: Duration::ZERO,
            duration: Duration::from_millis(900),
            confidence: None,
            speaker_id: None,
            detailed_json: None,
            cancellation: None,
        }
    }

    #[test]
    fn test_targets_are_validated() {
        assert!(TranslationMultiplexer::new(Vec::<String>::new()).is_err());
        assert!(TranslationMultiplexer::new(["de", " "]).is_err());
        assert!(TranslationMultiplexer::new(["de", "DE"]).is_err());
        assert_eq!(
            TranslationMultiplexer::new([" de ", "fr"]).unwrap().targets(),
            ["de", "fr"]
        );
    }

    #[test]
    fn test_entries_follow_configured_order() {
        let mux = TranslationMultiplexer::new(["de", "fr"]).unwrap();
        let result = mux.assemble(
            recognition(ResultReason::Recognized),
            vec![
                ("fr".into(), "bonjour".into()),
                ("it".into(), "buongiorno".into()),
                ("DE".into(), "guten Morgen".into()),
            ],
            Vec::new(),
            false,
        );

        assert_eq!(result.languages().collect::<Vec<_>>(), ["de", "fr"]);
        assert_eq!(result.translation("de"), Some("guten Morgen"));
        assert_eq!(result.translation("it"), None);
        assert!(!result.is_partial_audio());
    }

    #[test]
    fn test_missing_language_and_partial_audio() {
        let mux = TranslationMultiplexer::new(["de", "fr"]).unwrap();
        let audio = AudioSegment::new(16000, 1, vec![0; 160]);
        let result = mux.assemble(
            recognition(ResultReason::Recognized),
            vec![("de".into(), "guten Morgen".into())],
            vec![("de".into(), audio.clone())],
            true,
        );

        assert_eq!(result.translation("fr"), Some(""));
        assert_eq!(result.audio("de"), Some(&audio));
        assert!(result.audio("fr").is_none());
        assert!(result.is_partial_audio());
    }

    #[test]
    fn test_intermediate_results_carry_no_audio() {
        let mux = TranslationMultiplexer::new(["de"]).unwrap();
        let result = mux.assemble(
            recognition(ResultReason::Recognizing),
            vec![("de".into(), "guten".into())],
            vec![("de".into(), AudioSegment::new(16000, 1, vec![1]))],
            true,
        );

        assert_eq!(result.translation("de"), Some("guten"));
        assert!(result.audio("de").is_none());
    }
}
