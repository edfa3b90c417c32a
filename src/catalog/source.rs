use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::LanguageResource;

/// Where language metadata comes from
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    /// Resources with names localized to `locale`, or `None` if the source
    /// has nothing for that locale
    async fn fetch(&self, locale: &str) -> Result<Option<LanguageResource>>;

    fn name(&self) -> &str;
}

/// In-memory resources keyed by locale
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    locales: HashMap<String, LanguageResource>,
}

impl StaticCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: &str, resource: LanguageResource) -> Self {
        self.locales.insert(locale.to_ascii_lowercase(), resource);
        self
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self, locale: &str) -> Result<Option<LanguageResource>> {
        Ok(self.locales.get(&locale.to_ascii_lowercase()).cloned())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// JSON document mapping locale → `LanguageResource`, re-read on every fetch
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self, locale: &str) -> Result<Option<LanguageResource>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read language catalog: {:?}", self.path))?;

        let locales: HashMap<String, LanguageResource> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse language catalog: {:?}", self.path))?;

        debug!("Loaded {} locales from {:?}", locales.len(), self.path);

        Ok(locales
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(locale))
            .map(|(_, resource)| resource))
    }

    fn name(&self) -> &str {
        "file"
    }
}
