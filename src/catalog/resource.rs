use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{SpeechError, SpeechResult};

bitflags! {
    /// Which language metadata categories to return
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LanguageResourceScope: u32 {
        const SPEECH = 0x01;
        const TEXT = 0x02;
        const TTS = 0x04;
    }
}

impl LanguageResourceScope {
    /// Parse a comma-separated list such as `speech,text` (also `voices`
    /// for `tts`). An empty list means every scope.
    pub fn parse_list(list: &str) -> SpeechResult<Self> {
        let mut scopes = Self::empty();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            scopes |= match name.to_ascii_lowercase().as_str() {
                "speech" => Self::SPEECH,
                "text" => Self::TEXT,
                "tts" | "voices" => Self::TTS,
                other => {
                    return Err(SpeechError::InvalidArgument(format!(
                        "unknown language resource scope `{}`",
                        other
                    )))
                }
            };
        }
        if scopes.is_empty() {
            scopes = Self::all();
        }
        Ok(scopes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechLanguage {
    /// Display name, localized to the requested locale
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLanguage {
    pub name: String,
    #[serde(default)]
    pub dir: TextDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceResource {
    pub display_name: String,
    pub gender: String,
    pub locale: String,
    pub language: String,
    pub language_name: String,
    pub region_name: String,
}

/// Available languages and voices, keyed by language tag (voices by id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageResource {
    #[serde(default)]
    pub speech: BTreeMap<String, SpeechLanguage>,
    #[serde(default)]
    pub text: BTreeMap<String, TextLanguage>,
    #[serde(default, rename = "tts")]
    pub voices: BTreeMap<String, VoiceResource>,
}

impl LanguageResource {
    /// Keep only the maps selected by `scopes`
    pub fn filtered(&self, scopes: LanguageResourceScope) -> LanguageResource {
        LanguageResource {
            speech: if scopes.contains(LanguageResourceScope::SPEECH) {
                self.speech.clone()
            } else {
                BTreeMap::new()
            },
            text: if scopes.contains(LanguageResourceScope::TEXT) {
                self.text.clone()
            } else {
                BTreeMap::new()
            },
            voices: if scopes.contains(LanguageResourceScope::TTS) {
                self.voices.clone()
            } else {
                BTreeMap::new()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.speech.is_empty() && self.text.is_empty() && self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_bits() {
        assert_eq!(LanguageResourceScope::SPEECH.bits(), 0x01);
        assert_eq!(LanguageResourceScope::TEXT.bits(), 0x02);
        assert_eq!(LanguageResourceScope::TTS.bits(), 0x04);
        assert_eq!(
            LanguageResourceScope::from_bits_truncate(0x03),
            LanguageResourceScope::SPEECH | LanguageResourceScope::TEXT
        );
    }

    #[test]
    fn test_parse_scope_list() {
        assert_eq!(
            LanguageResourceScope::parse_list("speech, TEXT").unwrap(),
            LanguageResourceScope::SPEECH | LanguageResourceScope::TEXT
        );
        assert_eq!(
            LanguageResourceScope::parse_list("voices").unwrap(),
            LanguageResourceScope::TTS
        );
        assert_eq!(
            LanguageResourceScope::parse_list("").unwrap(),
            LanguageResourceScope::all()
        );
        assert!(LanguageResourceScope::parse_list("speech,video").is_err());
    }

    #[test]
    fn test_voice_json_field_names() {
        let json = r#"{
            "displayName": "Katja",
            "gender": "Female",
            "locale": "de-DE",
            "language": "de",
            "languageName": "German",
            "regionName": "Germany"
        }"#;
        let voice: VoiceResource = serde_json::from_str(json).unwrap();
        assert_eq!(voice.display_name, "Katja");
        assert_eq!(voice.region_name, "Germany");
    }
}
