use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::LanguageResourceCatalog;
use crate::nats::NatsEngine;
use crate::recognition::RecognitionEngine;
use crate::session::{OutputFormat, SessionConfig, SessionController};

/// Builds the engine each new session runs on
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    async fn create(&self, config: &SessionConfig) -> Result<Arc<dyn RecognitionEngine>>;
}

/// One `NatsEngine` per session over a shared connection
pub struct NatsEngineFactory {
    client: async_nats::Client,
}

impl NatsEngineFactory {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EngineFactory for NatsEngineFactory {
    async fn create(&self, _config: &SessionConfig) -> Result<Arc<dyn RecognitionEngine>> {
        Ok(Arc::new(NatsEngine::with_client(self.client.clone())))
    }
}

/// Applied to sessions whose request leaves them out
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub recognition_language: String,
    pub output_format: OutputFormat,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            recognition_language: "en-US".to_string(),
            output_format: OutputFormat::Simple,
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<SessionController>>>>,

    /// Ids claimed by a create that is still starting its session
    pub starting: Arc<Mutex<HashSet<String>>>,

    pub engines: Arc<dyn EngineFactory>,

    pub catalog: Arc<LanguageResourceCatalog>,

    pub defaults: SessionDefaults,
}

impl AppState {
    pub fn new(engines: Arc<dyn EngineFactory>, catalog: Arc<LanguageResourceCatalog>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            starting: Arc::new(Mutex::new(HashSet::new())),
            engines,
            catalog,
            defaults: SessionDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: SessionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Claim `session_id` for a new session. `None` if a live or starting
    /// session already holds it.
    pub async fn reserve(&self, session_id: &str) -> Option<Reservation> {
        let sessions = self.sessions.read().await;
        let mut starting = self.starting.lock();
        if sessions.contains_key(session_id) || !starting.insert(session_id.to_string()) {
            return None;
        }
        Some(Reservation {
            starting: Arc::clone(&self.starting),
            session_id: session_id.to_string(),
        })
    }
}

/// Holds a session id between reservation and registration; dropping it
/// frees the id
pub struct Reservation {
    starting: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.starting.lock().remove(&self.session_id);
    }
}
