use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{SessionConfig, SessionMode};
use super::disposal::{self, Disposable, DisposalGuard};
use super::parameters::Parameters;
use super::state::SessionState;
use super::stats::{SessionStats, TranscriptSegment};
use crate::error::{SpeechError, SpeechResult};
use crate::events::{EventKind, SessionEvent, SessionEventBus, SubscriptionToken};
use crate::participants::{ParticipantChange, ParticipantIdentity, ParticipantRegistry};
use crate::recognition::{
    CancellationDetails, EngineSink, EngineStartRequest, RawEngineEvent, RecognitionEngine,
    ResultPipeline, ResultReason, RunSettings, SessionResult,
};
use crate::task::{OperationKind, TaskHandle, TaskRunner};
use crate::translation::TranslationMultiplexer;

#[derive(Debug, Default)]
struct RunTimes {
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

struct SessionInner {
    id: String,
    config: SessionConfig,
    state: Mutex<SessionState>,
    parameters: Mutex<Parameters>,
    bus: Arc<SessionEventBus>,
    runner: TaskRunner,
    pipeline: Arc<ResultPipeline>,
    participants: Option<ParticipantRegistry>,
    engine: Arc<dyn RecognitionEngine>,
    /// Sink handed to the engine for the current run
    sink: Mutex<Option<EngineSink>>,
    /// Waiting `recognize_once`, if any
    once_waiter: Mutex<Option<oneshot::Sender<SessionResult>>>,
    disposal: DisposalGuard,
    created_at: DateTime<Utc>,
    run_times: Mutex<RunTimes>,
    /// Bumped by every start; auto-stop only acts on the run it came from
    run_generation: AtomicU64,
    runtime: Handle,
}

/// A recognition session: lifecycle state machine and public API.
///
/// All engine work runs through the session's `TaskRunner`, so at most one
/// of start / stop / recognize_once is in flight at a time. Results reach
/// subscribers through the session's event bus on the engine's context.
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    /// Create an idle session. Must be called within a tokio runtime.
    pub fn new(config: SessionConfig, engine: Arc<dyn RecognitionEngine>) -> SpeechResult<Self> {
        config.validate()?;
        let parameters = config.initial_parameters()?;

        let multiplexer = match &config.mode {
            SessionMode::Translation {
                target_languages, ..
            } => Some(TranslationMultiplexer::new(target_languages)?),
            _ => None,
        };
        let participants = match config.mode {
            SessionMode::Conversation => Some(ParticipantRegistry::new()),
            _ => None,
        };

        let runtime = Handle::try_current().map_err(|_| {
            SpeechError::InvalidArgument("sessions must be created within a tokio runtime".into())
        })?;

        info!(
            "Creating recognition session: {} ({} engine)",
            config.session_id,
            engine.name()
        );

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let id = config.session_id.clone();
            let bus = Arc::new(SessionEventBus::new(id.clone()));
            let pipeline = Arc::new(ResultPipeline::new(id.clone(), Arc::clone(&bus), multiplexer));

            let weak = weak.clone();
            pipeline.set_terminal_hook(Arc::new(move |result: &SessionResult| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_terminal(result);
                }
            }));

            SessionInner {
                id: id.clone(),
                config,
                state: Mutex::new(SessionState::Idle),
                parameters: Mutex::new(parameters),
                bus,
                runner: TaskRunner::new(id),
                pipeline,
                participants,
                engine,
                sink: Mutex::new(None),
                once_waiter: Mutex::new(None),
                disposal: DisposalGuard::new(),
                created_at: Utc::now(),
                run_times: Mutex::new(RunTimes::default()),
                run_generation: AtomicU64::new(0),
                runtime,
            }
        });

        Ok(Self { inner })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Begin continuous recognition.
    ///
    /// Resolves once the engine acknowledges the start, not on the first
    /// result. If the engine refuses, subscribers get a Canceled result and
    /// SessionStopped, the session is Idle again and this returns `Canceled`.
    pub async fn start(&self) -> SpeechResult<()> {
        let handle = self
            .inner
            .submit_from_idle(OperationKind::Start, "start", |inner, cancel| async move {
                inner.run_start(cancel).await
            })
            .await?;
        handle.wait().await
    }

    /// Stop recognition. No result events are dispatched once this resolves.
    ///
    /// A start still in flight is cancelled and the session ends Idle.
    pub async fn stop(&self) -> SpeechResult<()> {
        let inner = &self.inner;
        inner.disposal.ensure_live()?;

        {
            let mut state = inner.state.lock();
            match *state {
                SessionState::Starting | SessionState::Recognizing => {
                    *state = SessionState::Stopping;
                }
                current => {
                    return Err(SpeechError::InvalidState {
                        operation: "stop",
                        state: current,
                    })
                }
            }
        }

        info!("Stopping recognition session: {}", inner.id);

        if let Some(kind) = inner.runner.cancel_active() {
            debug!("[{}] waiting for cancelled {} to finish", inner.id, kind);
        }
        inner.runner.wait_idle().await;

        if *inner.state.lock() != SessionState::Stopping {
            return Ok(());
        }

        let stopping = Arc::clone(inner);
        let handle = inner.runner.submit(OperationKind::Stop, move |_| async move {
            stopping.run_stop().await;
            Ok(())
        })?;
        handle.wait().await
    }

    /// Recognize a single utterance: start, wait for the first terminal
    /// result, stop, and return it.
    pub async fn recognize_once(&self) -> SpeechResult<SessionResult> {
        let handle = self
            .inner
            .submit_from_idle(
                OperationKind::RecognizeOnce,
                "recognize_once",
                |inner, cancel| async move { inner.run_once(cancel).await },
            )
            .await?;
        handle.wait().await
    }

    /// Subscribe to one kind of session event. Handlers run in
    /// registration order on the engine's context and must not block.
    pub fn connect<F>(&self, kind: EventKind, handler: F) -> SpeechResult<SubscriptionToken<EventKind>>
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.disposal.ensure_live()?;
        Ok(self.inner.bus.connect(kind, handler))
    }

    /// Returns `false` if the subscription was already gone
    pub fn disconnect(&self, token: &SubscriptionToken<EventKind>) -> bool {
        self.inner.bus.disconnect(token)
    }

    pub fn get_parameter(&self, name: &str) -> SpeechResult<Option<String>> {
        self.inner.disposal.ensure_live()?;
        Ok(self.inner.parameters.lock().get(name).map(str::to_string))
    }

    /// Store a parameter. While a run is active the value takes effect at
    /// the next start; read-only parameters are always rejected.
    pub fn set_parameter(&self, name: &str, value: &str) -> SpeechResult<()> {
        self.inner.disposal.ensure_live()?;
        self.inner.parameters.lock().set(name, value)?;

        let state = self.state();
        if state.is_active() {
            debug!(
                "[{}] parameter {} set while {}; applies at next start",
                self.inner.id, name, state
            );
        }
        Ok(())
    }

    /// Add or remove a conversation participant
    pub fn update_participant(
        &self,
        add: bool,
        who: impl Into<ParticipantIdentity>,
    ) -> SpeechResult<ParticipantChange> {
        let inner = &self.inner;
        inner.disposal.ensure_live()?;

        let Some(registry) = &inner.participants else {
            return Err(SpeechError::InvalidState {
                operation: "update_participant",
                state: self.state(),
            });
        };

        let change = registry.update_participant(add, who)?;
        if change.changed() {
            let state = self.state();
            if matches!(state, SessionState::Starting | SessionState::Recognizing) {
                inner.engine.participants_changed(&registry.participants());
            }
        }
        Ok(change)
    }

    /// Current conversation members in join order (empty outside conversation mode)
    pub fn participants(&self) -> Vec<crate::participants::Participant> {
        self.inner
            .participants
            .as_ref()
            .map(ParticipantRegistry::participants)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SessionStats {
        let inner = &self.inner;
        let state = self.state();
        let counts = inner.pipeline.counts();
        let times = inner.run_times.lock();

        let duration_secs = match (times.started_at, times.stopped_at) {
            (Some(started), _) if state.is_active() => {
                (Utc::now() - started).num_milliseconds() as f64 / 1000.0
            }
            (Some(started), Some(stopped)) if stopped >= started => {
                (stopped - started).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        };

        SessionStats {
            session_id: inner.id.clone(),
            state,
            created_at: inner.created_at,
            started_at: times.started_at,
            duration_secs,
            intermediate_results: counts.intermediate,
            final_results: counts.recognized,
            no_match_results: counts.no_match,
            canceled_results: counts.canceled,
            transcript_segments_count: inner.pipeline.transcript().len(),
            handler_failures: inner.pipeline.handler_failures(),
        }
    }

    /// Recognized utterances so far, oldest first
    pub fn transcript(&self) -> Vec<TranscriptSegment> {
        self.inner.pipeline.transcript()
    }

    /// Tear the session down. Safe to call more than once; every call
    /// returns after the teardown has finished.
    ///
    /// The teardown runs on its own task, so dropping this future does not
    /// leave the session half disposed.
    pub async fn dispose(&self) -> SpeechResult<()> {
        let inner = Arc::clone(&self.inner);
        let teardown = self
            .inner
            .runtime
            .spawn(async move { disposal::dispose(inner.as_ref()).await });
        if let Err(e) = teardown.await {
            error!("Teardown of session {} did not complete: {}", self.inner.id, e);
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        !self.inner.disposal.is_live()
    }
}

impl SessionInner {
    /// Claim the runner slot and move Idle → Starting in one step
    async fn submit_from_idle<T, F, Fut>(
        self: &Arc<Self>,
        kind: OperationKind,
        operation: &'static str,
        body: F,
    ) -> SpeechResult<TaskHandle<T>>
    where
        F: FnOnce(Arc<SessionInner>, CancellationToken) -> Fut,
        Fut: Future<Output = SpeechResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.disposal.ensure_live()?;
        self.require_state(SessionState::Idle, operation)?;

        // A stop that just reached Idle may still hold the slot
        self.runner.wait_idle().await;

        self.claim_start(kind, operation, body)
    }

    fn claim_start<T, F, Fut>(
        self: &Arc<Self>,
        kind: OperationKind,
        operation: &'static str,
        body: F,
    ) -> SpeechResult<TaskHandle<T>>
    where
        F: FnOnce(Arc<SessionInner>, CancellationToken) -> Fut,
        Fut: Future<Output = SpeechResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut state = self.state.lock();
        if *state != SessionState::Idle {
            return Err(SpeechError::InvalidState {
                operation,
                state: *state,
            });
        }

        let inner = Arc::clone(self);
        let handle = self.runner.submit(kind, move |cancel| body(inner, cancel))?;
        *state = SessionState::Starting;
        Ok(handle)
    }

    fn require_state(&self, expected: SessionState, operation: &'static str) -> SpeechResult<()> {
        let state = *self.state.lock();
        if state == expected {
            Ok(())
        } else {
            Err(SpeechError::InvalidState { operation, state })
        }
    }

    /// Move `from` → `to` if the session is still in `from`
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock();
        if *state == from && from.can_transition_to(to) {
            debug!("[{}] {} -> {}", self.id, from, to);
            *state = to;
            true
        } else {
            false
        }
    }

    fn start_request(&self) -> (EngineStartRequest, RunSettings) {
        let parameters = self.parameters.lock().clone();
        let voice_name = parameters.voice_name().map(str::to_string);
        let target_languages = self.config.target_languages().to_vec();

        let settings = RunSettings {
            output_format: parameters.output_format(),
            audio_requested: !target_languages.is_empty() && voice_name.is_some(),
        };
        let request = EngineStartRequest {
            session_id: self.id.clone(),
            parameters: parameters.snapshot(),
            target_languages,
            voice_name,
            participants: self
                .participants
                .as_ref()
                .map(ParticipantRegistry::participants)
                .unwrap_or_default(),
        };
        (request, settings)
    }

    async fn run_start(&self, cancel: CancellationToken) -> SpeechResult<()> {
        let (request, settings) = self.start_request();

        self.run_generation.fetch_add(1, Ordering::SeqCst);
        let sink = EngineSink::new(Arc::clone(&self.pipeline));
        self.pipeline.begin_run(settings);
        *self.sink.lock() = Some(sink.clone());
        self.run_times.lock().started_at = Some(Utc::now());

        info!(
            "Starting recognition session {} on {} engine",
            self.id,
            self.engine.name()
        );
        self.pipeline.publish(SessionEvent::SessionStarted {
            session_id: self.id.clone(),
        });

        let outcome = self.engine.start(request, sink.clone(), cancel.clone()).await;

        if cancel.is_cancelled() {
            // stop() owns the teardown from here
            debug!("[{}] start cancelled", self.id);
            return Err(SpeechError::Canceled(CancellationDetails::user_requested(
                "stopped before the engine acknowledged the start",
            )));
        }

        match outcome {
            Ok(()) => {
                if self.transition(SessionState::Starting, SessionState::Recognizing) {
                    info!("Recognition session {} is recognizing", self.id);
                    Ok(())
                } else {
                    Err(SpeechError::Canceled(CancellationDetails::user_requested(
                        "stopped before the engine acknowledged the start",
                    )))
                }
            }
            Err(e) => {
                error!("Engine {} failed to start: {:#}", self.engine.name(), e);
                let details = CancellationDetails::from_engine_error(&e);

                sink.push(RawEngineEvent::Error {
                    utterance: None,
                    reason: details.reason,
                    code: details.code,
                    details: details.error_details.clone(),
                });
                sink.close();
                sink.drain().await;
                self.sink.lock().take();
                self.once_waiter.lock().take();
                self.run_times.lock().stopped_at = Some(Utc::now());

                if self.transition(SessionState::Starting, SessionState::Idle) {
                    self.pipeline.publish(SessionEvent::SessionStopped {
                        session_id: self.id.clone(),
                    });
                }
                Err(SpeechError::Canceled(details))
            }
        }
    }

    async fn run_once(self: Arc<Self>, cancel: CancellationToken) -> SpeechResult<SessionResult> {
        let (tx, rx) = oneshot::channel();
        *self.once_waiter.lock() = Some(tx);

        self.run_start(cancel.clone()).await?;

        let result = tokio::select! {
            received = rx => received.ok(),
            _ = cancel.cancelled() => None,
        };

        match result {
            Some(result) => {
                if self.transition(SessionState::Recognizing, SessionState::Stopping) {
                    self.run_stop().await;
                }
                Ok(result)
            }
            None => Err(SpeechError::Canceled(CancellationDetails::user_requested(
                "session stopped before a result arrived",
            ))),
        }
    }

    async fn run_stop(&self) {
        if let Err(e) = self.engine.stop().await {
            warn!("Engine {} did not stop cleanly: {:#}", self.engine.name(), e);
        }

        let sink = self.sink.lock().take();
        if let Some(sink) = sink {
            sink.close();
            sink.drain().await;
        }
        self.once_waiter.lock().take();
        self.run_times.lock().stopped_at = Some(Utc::now());

        if self.transition(SessionState::Stopping, SessionState::Idle) {
            info!("Recognition session {} stopped", self.id);
            self.pipeline.publish(SessionEvent::SessionStopped {
                session_id: self.id.clone(),
            });
        }
    }

    /// Runs on the engine's context after a terminal result went out
    fn on_terminal(self: &Arc<Self>, result: &SessionResult) {
        if let Some(waiter) = self.once_waiter.lock().take() {
            let _ = waiter.send(result.clone());
        }

        if result.reason() == ResultReason::Canceled {
            let inner = Arc::clone(self);
            let generation = self.run_generation.load(Ordering::SeqCst);
            self.runtime
                .spawn(async move { inner.auto_stop(generation).await });
        }
    }

    /// Stop after a fatal cancellation, once the operation that delivered it
    /// has finished
    async fn auto_stop(self: Arc<Self>, generation: u64) {
        self.runner.wait_idle().await;

        if self.run_generation.load(Ordering::SeqCst) != generation {
            debug!("[{}] auto-stop skipped: a newer run started", self.id);
            return;
        }
        if !self.transition(SessionState::Recognizing, SessionState::Stopping) {
            return;
        }

        warn!("Recognition session {} canceled, stopping", self.id);
        let inner = Arc::clone(&self);
        match self.runner.submit(OperationKind::Stop, move |_| async move {
            inner.run_stop().await;
            Ok(())
        }) {
            Ok(handle) => {
                let _ = handle.wait().await;
            }
            Err(e) => debug!("[{}] auto-stop skipped: {}", self.id, e),
        }
    }
}

#[async_trait]
impl Disposable for SessionInner {
    fn guard(&self) -> &DisposalGuard {
        &self.disposal
    }

    fn label(&self) -> &str {
        &self.id
    }

    fn disconnect_handlers(&self) -> usize {
        self.bus.disconnect_all()
    }

    async fn quiesce(&self) {
        self.runner.close();
        self.runner.cancel_active();
        self.runner.wait_idle().await;

        let state = *self.state.lock();
        let sink = self.sink.lock().take();
        if state.is_active() || sink.is_some() {
            if let Err(e) = self.engine.stop().await {
                warn!("Engine {} did not stop cleanly: {:#}", self.engine.name(), e);
            }
        }
        if let Some(sink) = sink {
            sink.close();
            sink.drain().await;
        }
        self.once_waiter.lock().take();
    }

    async fn release_resources(&self) {
        if let Err(e) = self.engine.release().await {
            warn!("Engine {} release failed: {:#}", self.engine.name(), e);
        }
        if let Some(registry) = &self.participants {
            registry.clear();
        }
    }

    fn mark_disposed(&self) {
        *self.state.lock() = SessionState::Disposed;
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.disposal.is_live() {
            return;
        }

        warn!("Session {} dropped without dispose, tearing down", self.id);
        self.bus.disconnect_all();
        self.runner.close();
        self.runner.cancel_active();

        let was_active = self.state.get_mut().is_active();
        if let Some(sink) = self.sink.get_mut().take() {
            sink.close();
        }

        let engine = Arc::clone(&self.engine);
        self.runtime.spawn(async move {
            if was_active {
                if let Err(e) = engine.stop().await {
                    warn!("Engine {} did not stop cleanly: {:#}", engine.name(), e);
                }
            }
            if let Err(e) = engine.release().await {
                warn!("Engine {} release failed: {:#}", engine.name(), e);
            }
        });
    }
}
