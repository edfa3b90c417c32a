use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::parameters::{
    OutputFormat, Parameters, DEPLOYMENT_ID, OUTPUT_FORMAT, RECOGNITION_LANGUAGE,
    TARGET_LANGUAGES, VOICE_NAME,
};
use crate::error::{SpeechError, SpeechResult};

/// What kind of recognition a session performs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMode {
    /// Plain speech-to-text
    #[default]
    Speech,
    /// Speech-to-text plus translation into every target language
    Translation {
        target_languages: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice_name: Option<String>,
    },
    /// Multi-participant transcription
    Conversation,
}

/// Configuration for a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-2025-10-28-standup")
    pub session_id: String,

    /// Source language (BCP-47 tag)
    /// Default: "en-US"
    pub recognition_language: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Custom model deployment, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,

    #[serde(default)]
    pub mode: SessionMode,

    /// Additional engine parameters passed through at start
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            recognition_language: "en-US".to_string(),
            output_format: OutputFormat::Simple,
            deployment_id: None,
            mode: SessionMode::Speech,
            parameters: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn speech(language: impl Into<String>) -> Self {
        Self {
            recognition_language: language.into(),
            ..Default::default()
        }
    }

    pub fn translation<I, S>(language: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recognition_language: language.into(),
            mode: SessionMode::Translation {
                target_languages: targets.into_iter().map(Into::into).collect(),
                voice_name: None,
            },
            ..Default::default()
        }
    }

    pub fn conversation(language: impl Into<String>) -> Self {
        Self {
            recognition_language: language.into(),
            mode: SessionMode::Conversation,
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Only meaningful in translation mode
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        if let SessionMode::Translation { voice_name, .. } = &mut self.mode {
            *voice_name = Some(voice.into());
        }
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Check construction preconditions
    pub fn validate(&self) -> SpeechResult<()> {
        if self.session_id.trim().is_empty() {
            return Err(SpeechError::InvalidArgument(
                "session id must not be empty".to_string(),
            ));
        }
        if self.recognition_language.trim().is_empty() {
            return Err(SpeechError::InvalidArgument(
                "recognition language must not be empty".to_string(),
            ));
        }
        if let SessionMode::Translation {
            target_languages, ..
        } = &self.mode
        {
            if target_languages.is_empty() {
                return Err(SpeechError::InvalidArgument(
                    "translation requires at least one target language".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn target_languages(&self) -> &[String] {
        match &self.mode {
            SessionMode::Translation {
                target_languages, ..
            } => target_languages,
            _ => &[],
        }
    }

    /// Initial named parameters for the session
    pub(crate) fn initial_parameters(&self) -> SpeechResult<Parameters> {
        let mut params = Parameters::new();
        for (name, value) in &self.parameters {
            params.set(name, value)?;
        }

        params.insert(RECOGNITION_LANGUAGE, self.recognition_language.trim());
        params.insert(OUTPUT_FORMAT, self.output_format.to_string());
        if let Some(deployment_id) = &self.deployment_id {
            params.insert(DEPLOYMENT_ID, deployment_id.trim());
        }
        if let SessionMode::Translation {
            target_languages,
            voice_name,
        } = &self.mode
        {
            params.insert(TARGET_LANGUAGES, target_languages.join(","));
            if let Some(voice) = voice_name {
                params.insert(VOICE_NAME, voice.trim());
            }
        }
        Ok(params)
    }
}
