use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CatalogSource, LanguageResource, LanguageResourceScope};

/// Cached language/voice metadata per locale.
///
/// Snapshots are replaced whole. Readers never wait on a refresh that is
/// already running: they get the last-known snapshot for their locale, or
/// the default locale's while their own is still loading.
pub struct LanguageResourceCatalog {
    source: Arc<dyn CatalogSource>,
    default_locale: String,
    snapshots: RwLock<HashMap<String, Arc<LanguageResource>>>,
    refresh_lock: Mutex<()>,
}

impl LanguageResourceCatalog {
    pub fn new(source: Arc<dyn CatalogSource>, default_locale: impl Into<String>) -> Self {
        Self {
            source,
            default_locale: normalize_locale(&default_locale.into()),
            snapshots: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Union of the maps selected by `scopes`, with names localized to
    /// `accept_language` when available and to the default locale otherwise.
    ///
    /// `accept_language` may be a bare tag (`de-DE`) or an HTTP
    /// Accept-Language value; only its first tag is used.
    pub async fn get_language_resource(
        &self,
        scopes: LanguageResourceScope,
        accept_language: Option<&str>,
    ) -> Result<LanguageResource> {
        let locale = self.requested_locale(accept_language);

        if let Some(snapshot) = self.snapshot(&locale) {
            return Ok(snapshot.filtered(scopes));
        }

        let _guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(snapshot) = self.snapshot(&self.default_locale) {
                    debug!(
                        "Catalog refresh in flight, serving {} snapshot for {}",
                        self.default_locale, locale
                    );
                    return Ok(snapshot.filtered(scopes));
                }
                // Nothing cached yet at all
                self.refresh_lock.lock().await
            }
        };

        // Filled by the refresh we may have waited for
        if let Some(snapshot) = self.snapshot(&locale) {
            return Ok(snapshot.filtered(scopes));
        }

        let snapshot = self.load(&locale).await?;
        Ok(snapshot.filtered(scopes))
    }

    /// Reload `accept_language`'s snapshot (default locale if `None`) from
    /// the source. Readers keep getting the old snapshot until it completes.
    pub async fn refresh(&self, accept_language: Option<&str>) -> Result<()> {
        let locale = self.requested_locale(accept_language);
        let _guard = self.refresh_lock.lock().await;
        self.load(&locale).await?;
        Ok(())
    }

    /// Locales with a cached snapshot
    pub fn cached_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.snapshots.read().keys().cloned().collect();
        locales.sort();
        locales
    }

    fn snapshot(&self, locale: &str) -> Option<Arc<LanguageResource>> {
        self.snapshots.read().get(locale).cloned()
    }

    fn requested_locale(&self, accept_language: Option<&str>) -> String {
        accept_language
            .map(normalize_locale)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.default_locale.clone())
    }

    /// Fetch with fallback: exact tag, primary subtag, default locale
    async fn load(&self, locale: &str) -> Result<Arc<LanguageResource>> {
        let mut candidates = vec![locale.to_string()];
        if let Some((primary, _)) = locale.split_once('-') {
            candidates.push(primary.to_string());
        }
        if !candidates.contains(&self.default_locale) {
            candidates.push(self.default_locale.clone());
        }

        for candidate in &candidates {
            let fetched = self
                .source
                .fetch(candidate)
                .await
                .with_context(|| {
                    format!(
                        "Failed to fetch {} resources from {}",
                        candidate,
                        self.source.name()
                    )
                })?;

            if let Some(resource) = fetched {
                if candidate != locale {
                    warn!("No language resources for {}, using {}", locale, candidate);
                }
                let snapshot = Arc::new(resource);
                self.snapshots
                    .write()
                    .insert(locale.to_string(), Arc::clone(&snapshot));
                info!(
                    "Cached language resources for {}: {} speech, {} text, {} voices",
                    locale,
                    snapshot.speech.len(),
                    snapshot.text.len(),
                    snapshot.voices.len()
                );
                return Ok(snapshot);
            }
        }

        anyhow::bail!(
            "{} source has no language resources for {} or {}",
            self.source.name(),
            locale,
            self.default_locale
        )
    }
}

/// First tag of an Accept-Language value, lowercased (`de-DE,de;q=0.9` → `de-de`)
fn normalize_locale(value: &str) -> String {
    value
        .split(',')
        .next()
        .and_then(|tag| tag.split(';').next())
        .map(|tag| tag.trim().replace('_', "-").to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("de-DE,de;q=0.9,en;q=0.8"), "de-de");
        assert_eq!(normalize_locale(" fr_CA "), "fr-ca");
        assert_eq!(normalize_locale("en;q=0.5"), "en");
        assert_eq!(normalize_locale(""), "");
    }
}
