// Shared helpers for integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use loqa_speech::{EventKind, SessionController, SessionEvent, SessionState};

pub const ALL_KINDS: [EventKind; 7] = [
    EventKind::SessionStarted,
    EventKind::SessionStopped,
    EventKind::SpeechStartDetected,
    EventKind::SpeechEndDetected,
    EventKind::IntermediateResult,
    EventKind::FinalResult,
    EventKind::Canceled,
];

/// Every event a session published, in dispatch order
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    pub fn attach(session: &SessionController) -> Result<Self> {
        let log = Self::default();
        for kind in ALL_KINDS {
            let events = Arc::clone(&log.events);
            session.connect(kind, move |event| {
                events.lock().push(event.clone());
                Ok(())
            })?;
        }
        Ok(log)
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(SessionEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(what: &str, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

pub async fn wait_for_state(session: &SessionController, state: SessionState) -> Result<()> {
    eventually(&format!("state {}", state), || session.state() == state).await
}
