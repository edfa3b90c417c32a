use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::engine::{EngineStartRequest, RawEngineEvent, RawResult, RecognitionEngine};
use super::result::{CancellationErrorCode, CancellationReason};
use super::sink::EngineSink;
use crate::participants::Participant;

#[derive(Default)]
struct ChannelState {
    sink: Mutex<Option<EngineSink>>,
    fail_next_start: Mutex<Option<String>>,
    hold_start: AtomicBool,
    release_start: Notify,
    last_request: Mutex<Option<EngineStartRequest>>,
    participants: Mutex<Vec<Participant>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    released: AtomicBool,
}

/// In-process engine whose results are pushed through an `EngineFeed`.
///
/// Useful when recognition happens somewhere the session cannot reach
/// directly, and in tests.
#[derive(Clone, Default)]
pub struct ChannelEngine {
    state: Arc<ChannelState>,
}

impl ChannelEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for pushing events into the running session
    pub fn feed(&self) -> EngineFeed {
        EngineFeed {
            state: Arc::clone(&self.state),
        }
    }

    /// Make the next `start` fail with `message`
    pub fn fail_next_start(&self, message: impl Into<String>) {
        *self.state.fail_next_start.lock() = Some(message.into());
    }

    /// Make `start` wait for `release_start` (or cancellation) before acking
    pub fn hold_start(&self) {
        self.state.hold_start.store(true, Ordering::SeqCst);
    }

    pub fn release_start(&self) {
        self.state.hold_start.store(false, Ordering::SeqCst);
        self.state.release_start.notify_waiters();
    }

    pub fn start_count(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<EngineStartRequest> {
        self.state.last_request.lock().clone()
    }

    /// Roster last reported through `participants_changed`
    pub fn participants(&self) -> Vec<Participant> {
        self.state.participants.lock().clone()
    }
}

#[async_trait]
impl RecognitionEngine for ChannelEngine {
    async fn start(
        &self,
        request: EngineStartRequest,
        sink: EngineSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.state.fail_next_start.lock().take() {
            anyhow::bail!(message);
        }

        while self.state.hold_start.load(Ordering::SeqCst) {
            let released = self.state.release_start.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if !self.state.hold_start.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = &mut released => {}
                _ = cancel.cancelled() => {
                    debug!("channel engine start cancelled for {}", request.session_id);
                    return Ok(());
                }
            }
        }

        info!("channel engine started for session {}", request.session_id);
        *self.state.participants.lock() = request.participants.clone();
        *self.state.last_request.lock() = Some(request);
        *self.state.sink.lock() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        if self.state.sink.lock().take().is_some() {
            info!("channel engine stopped");
        }
        Ok(())
    }

    async fn release(&self) -> anyhow::Result<()> {
        self.state.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn participants_changed(&self, participants: &[Participant]) {
        *self.state.participants.lock() = participants.to_vec();
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Pushes events into whatever session the `ChannelEngine` is running for.
///
/// Every method returns `false` when nothing accepted the event (the engine
/// is not running, or the session already closed its sink).
#[derive(Clone)]
pub struct EngineFeed {
    state: Arc<ChannelState>,
}

impl EngineFeed {
    pub fn push(&self, event: RawEngineEvent) -> bool {
        // Clone out so dispatch does not run under the engine lock
        let sink = self.state.sink.lock().clone();
        match sink {
            Some(sink) => sink.push(event),
            None => false,
        }
    }

    pub fn intermediate(&self, utterance: u64, text: &str) -> bool {
        self.push(RawEngineEvent::Intermediate(RawResult::new(utterance, text)))
    }

    pub fn final_text(&self, utterance: u64, text: &str) -> bool {
        self.push(RawEngineEvent::Final(RawResult::new(utterance, text)))
    }

    pub fn error(&self, code: CancellationErrorCode, details: &str) -> bool {
        self.push(RawEngineEvent::Error {
            utterance: None,
            reason: CancellationReason::Error,
            code,
            details: details.to_string(),
        })
    }

    pub fn speech_start(&self, offset: Duration) -> bool {
        self.push(RawEngineEvent::SpeechStartDetected { offset })
    }

    pub fn speech_end(&self, offset: Duration) -> bool {
        self.push(RawEngineEvent::SpeechEndDetected { offset })
    }

    pub fn is_running(&self) -> bool {
        self.state.sink.lock().is_some()
    }
}
