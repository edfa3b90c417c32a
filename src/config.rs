use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::OutputFormat;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Defaults for sessions created over HTTP
#[derive(Debug, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            output_format: OutputFormat::Simple,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    /// JSON file of language resources keyed by locale (`~` is expanded)
    pub path: String,
    #[serde(default = "default_language")]
    pub default_locale: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "config/languages.json".to_string(),
            default_locale: default_language(),
        }
    }
}

impl CatalogConfig {
    pub fn expanded_path(&self) -> Result<String> {
        let expanded = shellexpand::full(&self.path)
            .with_context(|| format!("Failed to expand catalog path: {}", self.path))?;
        Ok(expanded.into_owned())
    }
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to load config: {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}
