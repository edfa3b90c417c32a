use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{SpeechError, SpeechResult};

/// Source language; fixed at creation
pub const RECOGNITION_LANGUAGE: &str = "RecognitionLanguage";
/// Custom model deployment
pub const DEPLOYMENT_ID: &str = "DeploymentId";
/// `simple` or `detailed`
pub const OUTPUT_FORMAT: &str = "OutputFormat";
/// Comma-separated translation targets; fixed at creation
pub const TARGET_LANGUAGES: &str = "TargetLanguages";
/// Synthesis voice for translated audio
pub const VOICE_NAME: &str = "VoiceName";

const READ_ONLY: [&str; 2] = [RECOGNITION_LANGUAGE, TARGET_LANGUAGES];

const KNOWN: [&str; 5] = [
    RECOGNITION_LANGUAGE,
    DEPLOYMENT_ID,
    OUTPUT_FORMAT,
    TARGET_LANGUAGES,
    VOICE_NAME,
];

/// Known names match in any case and map to their canonical spelling
fn canonical(name: &str) -> &str {
    KNOWN
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(name))
        .unwrap_or(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Simple,
    Detailed,
}

impl FromStr for OutputFormat {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(OutputFormat::Simple),
            "detailed" => Ok(OutputFormat::Detailed),
            other => Err(SpeechError::InvalidArgument(format!(
                "unknown output format `{}` (expected simple or detailed)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Simple => f.write_str("simple"),
            OutputFormat::Detailed => f.write_str("detailed"),
        }
    }
}

/// Named session parameters.
///
/// Values are stored as strings. Settable values take effect at the next
/// start; read-only ones are rejected in every state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(canonical(name)).map(String::as_str)
    }

    /// Caller-facing set: validates the name and value
    pub fn set(&mut self, name: &str, value: &str) -> SpeechResult<()> {
        let name = canonical(name.trim());
        if name.is_empty() {
            return Err(SpeechError::InvalidArgument(
                "parameter name must not be empty".to_string(),
            ));
        }
        if READ_ONLY.contains(&name) {
            return Err(SpeechError::InvalidArgument(format!(
                "parameter `{}` is read-only after creation",
                name
            )));
        }

        let value = match name {
            OUTPUT_FORMAT => value.parse::<OutputFormat>()?.to_string(),
            DEPLOYMENT_ID | VOICE_NAME => value.trim().to_string(),
            _ => value.to_string(),
        };

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Used while building a session; bypasses the read-only check
    pub(crate) fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(canonical(name).to_string(), value.into());
    }

    pub fn output_format(&self) -> OutputFormat {
        self.get(OUTPUT_FORMAT)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// Voice for translated audio; an empty value means none
    pub fn voice_name(&self) -> Option<&str> {
        self.get(VOICE_NAME).filter(|v| !v.is_empty())
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
