use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::engine::{RawEngineEvent, RawResult};
use super::result::{CancellationDetails, RecognitionResult, ResultReason, SessionResult};
use crate::events::{SessionEvent, SessionEventBus};
use crate::session::{OutputFormat, ResultCounts, TranscriptSegment};
use crate::translation::{AudioSegment, TranslationMultiplexer};

/// Called after a terminal result has been dispatched
pub type TerminalHook = Arc<dyn Fn(&SessionResult) + Send + Sync>;

/// Per-run settings fixed when the session starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSettings {
    pub output_format: OutputFormat,
    /// Synthesized audio was requested (a voice is configured)
    pub audio_requested: bool,
}

#[derive(Debug, Default)]
struct UtteranceTracker {
    /// Highest utterance whose terminal result went out this run
    last_terminal: Option<u64>,
    /// Utterance currently producing hypotheses
    open: Option<u64>,
    /// Set once a Canceled result went out; everything after is dropped
    halted: bool,
}

impl UtteranceTracker {
    fn admit(&mut self, utterance: u64, terminal: bool) -> Admission {
        if self.halted {
            return Admission::Halted;
        }
        if let Some(last) = self.last_terminal {
            if utterance <= last {
                return Admission::AlreadyTerminated;
            }
        }
        if terminal {
            self.last_terminal = Some(utterance);
            if self.open == Some(utterance) {
                self.open = None;
            }
        } else {
            self.open = Some(utterance);
        }
        Admission::Accepted
    }

    fn cancel(&mut self, utterance: Option<u64>) -> Option<u64> {
        if self.halted {
            return None;
        }
        // An utterance that already got its terminal result cannot be canceled;
        // the cancellation lands on the open or next utterance instead
        let last_terminal = self.last_terminal;
        let utterance = utterance
            .filter(|u| last_terminal.map_or(true, |last| *u > last))
            .or(self.open)
            .unwrap_or_else(|| last_terminal.map_or(0, |last| last + 1));
        self.halted = true;
        self.open = None;
        self.last_terminal = Some(self.last_terminal.map_or(utterance, |last| last.max(utterance)));
        Some(utterance)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Admission {
    Accepted,
    AlreadyTerminated,
    Halted,
}

#[derive(Debug, Default)]
struct Counters {
    intermediate: AtomicU64,
    recognized: AtomicU64,
    no_match: AtomicU64,
    canceled: AtomicU64,
}

/// Turns raw engine callbacks into typed, ordered session events.
///
/// Runs on whatever context the engine pushes from. Classification and
/// admission hold a short lock; dispatch to subscribers runs unlocked.
pub struct ResultPipeline {
    session_id: String,
    bus: Arc<SessionEventBus>,
    multiplexer: Option<TranslationMultiplexer>,
    tracker: Mutex<UtteranceTracker>,
    settings: Mutex<RunSettings>,
    counters: Counters,
    transcript: Mutex<Vec<TranscriptSegment>>,
    terminal_hook: Mutex<Option<TerminalHook>>,
}

impl ResultPipeline {
    pub fn new(
        session_id: impl Into<String>,
        bus: Arc<SessionEventBus>,
        multiplexer: Option<TranslationMultiplexer>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            bus,
            multiplexer,
            tracker: Mutex::new(UtteranceTracker::default()),
            settings: Mutex::new(RunSettings::default()),
            counters: Counters::default(),
            transcript: Mutex::new(Vec::new()),
            terminal_hook: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_terminal_hook(&self, hook: TerminalHook) {
        *self.terminal_hook.lock() = Some(hook);
    }

    /// Reset utterance tracking for a new run
    pub fn begin_run(&self, settings: RunSettings) {
        *self.tracker.lock() = UtteranceTracker::default();
        *self.settings.lock() = settings;
        debug!("[{}] pipeline ready: {:?}", self.session_id, settings);
    }

    /// Publish a lifecycle event on the session bus
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.bus.dispatch(event.kind(), &event)
    }

    pub fn process(&self, event: RawEngineEvent) {
        match event {
            RawEngineEvent::SpeechStartDetected { offset } => {
                if self.tracker.lock().halted {
                    return;
                }
                self.publish(SessionEvent::SpeechStartDetected {
                    session_id: self.session_id.clone(),
                    offset,
                });
            }
            RawEngineEvent::SpeechEndDetected { offset } => {
                if self.tracker.lock().halted {
                    return;
                }
                self.publish(SessionEvent::SpeechEndDetected {
                    session_id: self.session_id.clone(),
                    offset,
                });
            }
            RawEngineEvent::Intermediate(raw) => {
                self.process_result(raw, ResultReason::Recognizing);
            }
            RawEngineEvent::Final(raw) => {
                let reason = if raw.text.trim().is_empty() {
                    ResultReason::NoMatch
                } else {
                    ResultReason::Recognized
                };
                self.process_result(raw, reason);
            }
            RawEngineEvent::Error {
                utterance,
                reason,
                code,
                details,
            } => {
                let Some(utterance) = self.tracker.lock().cancel(utterance) else {
                    debug!(
                        "[{}] dropping engine error after cancellation: {}",
                        self.session_id, details
                    );
                    return;
                };
                warn!(
                    "[{}] recognition canceled on utterance {}: {:?} {:?} {}",
                    self.session_id, utterance, reason, code, details
                );
                let cancellation = CancellationDetails {
                    reason,
                    code,
                    error_details: details,
                };
                let recognition = RecognitionResult {
                    result_id: Uuid::new_v4(),
                    session_id: self.session_id.clone(),
                    utterance,
                    text: String::new(),
                    reason: ResultReason::Canceled,
                    offset: Default::default(),
                    duration: Default::default(),
                    confidence: None,
                    speaker_id: None,
                    detailed_json: None,
                    cancellation: Some(cancellation),
                };
                let result = self.wrap(recognition, Vec::new(), Vec::new());
                self.deliver(result);
            }
        }
    }

    fn process_result(&self, raw: RawResult, reason: ResultReason) {
        let admission = self.tracker.lock().admit(raw.utterance, reason.is_terminal());
        match admission {
            Admission::Accepted => {}
            Admission::AlreadyTerminated => {
                warn!(
                    "[{}] dropping {} for utterance {}: already terminated",
                    self.session_id, reason, raw.utterance
                );
                return;
            }
            Admission::Halted => {
                debug!(
                    "[{}] dropping {} for utterance {} after cancellation",
                    self.session_id, reason, raw.utterance
                );
                return;
            }
        }

        let settings = *self.settings.lock();
        let detailed_json = match settings.output_format {
            OutputFormat::Detailed => raw.detailed_json,
            OutputFormat::Simple => None,
        };

        let recognition = RecognitionResult {
            result_id: Uuid::new_v4(),
            session_id: self.session_id.clone(),
            utterance: raw.utterance,
            text: raw.text,
            reason,
            offset: raw.offset,
            duration: raw.duration,
            confidence: raw.confidence,
            speaker_id: raw.speaker_id,
            detailed_json,
            cancellation: None,
        };
        let result = self.wrap(recognition, raw.translations, raw.synthesis);
        self.deliver(result);
    }

    fn wrap(
        &self,
        recognition: RecognitionResult,
        translations: Vec<(String, String)>,
        synthesis: Vec<(String, AudioSegment)>,
    ) -> SessionResult {
        match &self.multiplexer {
            Some(multiplexer) => {
                let audio_requested = self.settings.lock().audio_requested;
                SessionResult::Translation(Arc::new(multiplexer.assemble(
                    recognition,
                    translations,
                    synthesis,
                    audio_requested,
                )))
            }
            None => SessionResult::Speech(Arc::new(recognition)),
        }
    }

    fn deliver(&self, result: SessionResult) {
        let reason = result.reason();
        let counter = match reason {
            ResultReason::Recognizing => &self.counters.intermediate,
            ResultReason::Recognized => &self.counters.recognized,
            ResultReason::NoMatch => &self.counters.no_match,
            ResultReason::Canceled => &self.counters.canceled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if reason == ResultReason::Recognized {
            self.record_transcript(&result);
        }

        let delivered = self.publish(SessionEvent::Result(result.clone()));
        debug!(
            "[{}] {} utterance {} delivered to {} handler(s)",
            self.session_id,
            reason,
            result.recognition().utterance,
            delivered
        );

        if reason.is_terminal() {
            let hook = self.terminal_hook.lock().clone();
            if let Some(hook) = hook {
                hook(&result);
            }
        }
    }

    fn record_transcript(&self, result: &SessionResult) {
        let recognition = result.recognition();
        let translations = result
            .translation()
            .map(|t| {
                t.entries
                    .iter()
                    .map(|entry| (entry.language.clone(), entry.text.clone()))
                    .collect()
            })
            .unwrap_or_default();

        self.transcript.lock().push(TranscriptSegment {
            text: recognition.text.clone(),
            timestamp: Utc::now(),
            confidence: recognition.confidence,
            utterance: recognition.utterance,
            speaker_id: recognition.speaker_id.clone(),
            offset_ms: recognition.offset.as_millis() as u64,
            duration_ms: recognition.duration.as_millis() as u64,
            translations,
        });
    }

    pub fn counts(&self) -> ResultCounts {
        ResultCounts {
            intermediate: self.counters.intermediate.load(Ordering::Relaxed),
            recognized: self.counters.recognized.load(Ordering::Relaxed),
            no_match: self.counters.no_match.load(Ordering::Relaxed),
            canceled: self.counters.canceled.load(Ordering::Relaxed),
        }
    }

    pub fn transcript(&self) -> Vec<TranscriptSegment> {
        self.transcript.lock().clone()
    }

    pub fn handler_failures(&self) -> u64 {
        self.bus.handler_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::recognition::{CancellationErrorCode, CancellationReason};

    fn pipeline() -> (Arc<ResultPipeline>, Arc<Mutex<Vec<(ResultReason, u64, String)>>>) {
        let bus = Arc::new(SessionEventBus::new("s1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::IntermediateResult, EventKind::FinalResult, EventKind::Canceled] {
            let seen = Arc::clone(&seen);
            bus.connect(kind, move |event: &SessionEvent| {
                if let Some(result) = event.result() {
                    let r = result.recognition();
                    seen.lock().push((r.reason, r.utterance, r.text.clone()));
                }
                Ok(())
            });
        }
        let pipeline = Arc::new(ResultPipeline::new("s1", bus, None));
        pipeline.begin_run(RunSettings::default());
        (pipeline, seen)
    }

    fn error() -> RawEngineEvent {
        RawEngineEvent::Error {
            utterance: None,
            reason: CancellationReason::Error,
            code: CancellationErrorCode::ServiceError,
            details: "backend failed".into(),
        }
    }

    #[test]
    fn test_empty_final_is_no_match() {
        let (pipeline, seen) = pipeline();
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "   ")));

        assert_eq!(*seen.lock(), vec![(ResultReason::NoMatch, 1, "   ".to_string())]);
        assert!(pipeline.transcript().is_empty());
        assert_eq!(pipeline.counts().no_match, 1);
    }

    #[test]
    fn test_events_after_terminal_are_dropped() {
        let (pipeline, seen) = pipeline();
        pipeline.process(RawEngineEvent::Intermediate(RawResult::new(1, "hel")));
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "hello")));
        pipeline.process(RawEngineEvent::Intermediate(RawResult::new(1, "late")));
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "again")));
        pipeline.process(RawEngineEvent::Final(RawResult::new(2, "next")));

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, ResultReason::Recognizing);
        assert_eq!(seen[1], (ResultReason::Recognized, 1, "hello".to_string()));
        assert_eq!(seen[2], (ResultReason::Recognized, 2, "next".to_string()));
        assert_eq!(pipeline.transcript().len(), 2);
    }

    #[test]
    fn test_error_halts_until_next_run() {
        let (pipeline, seen) = pipeline();
        pipeline.process(RawEngineEvent::Intermediate(RawResult::new(4, "par")));
        pipeline.process(error());
        pipeline.process(RawEngineEvent::Final(RawResult::new(4, "partial")));
        pipeline.process(error());

        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1].0, ResultReason::Canceled);
            assert_eq!(seen[1].1, 4, "cancel attaches to the open utterance");
        }

        pipeline.begin_run(RunSettings::default());
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "fresh")));
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(pipeline.counts().canceled, 1);
    }

    #[test]
    fn test_error_for_finished_utterance_moves_to_next() {
        let (pipeline, seen) = pipeline();
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "hello")));
        pipeline.process(RawEngineEvent::Error {
            utterance: Some(1),
            reason: CancellationReason::Error,
            code: CancellationErrorCode::ServiceError,
            details: "backend failed".into(),
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (ResultReason::Recognized, 1, "hello".to_string()));
        assert_eq!(seen[1].0, ResultReason::Canceled);
        assert_eq!(seen[1].1, 2, "utterance 1 keeps its single terminal result");
    }

    #[test]
    fn test_error_for_finished_utterance_lands_on_open_one() {
        let (pipeline, seen) = pipeline();
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "hello")));
        pipeline.process(RawEngineEvent::Intermediate(RawResult::new(2, "wor")));
        pipeline.process(RawEngineEvent::Error {
            utterance: Some(1),
            reason: CancellationReason::EndOfStream,
            code: CancellationErrorCode::NoError,
            details: String::new(),
        });

        let terminals: Vec<u64> = seen
            .lock()
            .iter()
            .filter(|(reason, _, _)| reason.is_terminal())
            .map(|(_, utterance, _)| *utterance)
            .collect();
        assert_eq!(terminals, vec![1, 2]);
    }

    #[test]
    fn test_simple_format_strips_detail() {
        let bus = Arc::new(SessionEventBus::new("s1"));
        let details = Arc::new(Mutex::new(Vec::new()));
        {
            let details = Arc::clone(&details);
            bus.connect(EventKind::FinalResult, move |event: &SessionEvent| {
                if let Some(result) = event.result() {
                    details.lock().push(result.recognition().detailed_json.clone());
                }
                Ok(())
            });
        }
        let pipeline = ResultPipeline::new("s1", bus, None);

        pipeline.begin_run(RunSettings::default());
        pipeline.process(RawEngineEvent::Final(
            RawResult::new(1, "a").with_detailed_json("{\"n\":1}"),
        ));
        pipeline.begin_run(RunSettings {
            output_format: OutputFormat::Detailed,
            audio_requested: false,
        });
        pipeline.process(RawEngineEvent::Final(
            RawResult::new(1, "b").with_detailed_json("{\"n\":2}"),
        ));

        assert_eq!(*details.lock(), vec![None, Some("{\"n\":2}".to_string())]);
    }

    #[test]
    fn test_terminal_hook_sees_terminal_results_only() {
        let (pipeline, _seen) = pipeline();
        let hooked = Arc::new(Mutex::new(Vec::new()));
        {
            let hooked = Arc::clone(&hooked);
            pipeline.set_terminal_hook(Arc::new(move |result: &SessionResult| {
                hooked.lock().push(result.reason());
            }));
        }

        pipeline.process(RawEngineEvent::Intermediate(RawResult::new(1, "h")));
        pipeline.process(RawEngineEvent::Final(RawResult::new(1, "hi")));
        pipeline.process(error());

        assert_eq!(
            *hooked.lock(),
            vec![ResultReason::Recognized, ResultReason::Canceled]
        );
    }
}
