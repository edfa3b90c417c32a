use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use super::engine::RawEngineEvent;
use super::pipeline::ResultPipeline;

/// Admission gate for engine callbacks.
///
/// Every push holds an in-flight slot for the duration of its dispatch.
/// Once closed, new pushes are refused and `drain` resolves when the last
/// admitted push has finished.
#[derive(Debug)]
struct DispatchGate {
    open: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl DispatchGate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    fn enter(&self) -> Option<InFlight<'_>> {
        // Count first, then check: a concurrent close either sees us or we see it
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let slot = InFlight { gate: self };
        if self.open.load(Ordering::SeqCst) {
            Some(slot)
        } else {
            None
        }
    }

    fn close(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }

    async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlight<'a> {
    gate: &'a DispatchGate,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.drained.notify_waiters();
        }
    }
}

struct SinkShared {
    gate: DispatchGate,
    pipeline: Arc<ResultPipeline>,
}

/// The engine's callback context for one run.
///
/// Cheap to clone. Each start hands the engine a fresh sink; the session
/// closes it on stop, so a late push from a previous run is refused.
#[derive(Clone)]
pub struct EngineSink {
    shared: Arc<SinkShared>,
}

impl EngineSink {
    pub(crate) fn new(pipeline: Arc<ResultPipeline>) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                gate: DispatchGate::new(),
                pipeline,
            }),
        }
    }

    /// Deliver one engine event. Dispatch to subscribers happens on the
    /// calling context before this returns.
    ///
    /// Returns `false` if the sink was already closed and the event dropped.
    pub fn push(&self, event: RawEngineEvent) -> bool {
        let Some(_slot) = self.shared.gate.enter() else {
            debug!(
                "[{}] sink closed, dropping engine event",
                self.shared.pipeline.session_id()
            );
            return false;
        };
        self.shared.pipeline.process(event);
        true
    }

    pub fn is_open(&self) -> bool {
        self.shared.gate.open.load(Ordering::SeqCst)
    }

    /// Refuse further pushes. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        self.shared.gate.close()
    }

    /// Wait until every admitted push has finished dispatching
    pub(crate) async fn drain(&self) {
        self.shared.gate.drain().await
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.shared.gate.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_admitted_push() {
        let gate = Arc::new(DispatchGate::new());
        let slot_gate = Arc::clone(&gate);

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            let slot = slot_gate.enter();
            assert!(slot.is_some());
            entered_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(slot);
        });

        entered_rx.await.unwrap();
        assert!(gate.close());
        assert!(gate.enter().is_none(), "closed gate refuses new pushes");

        let drain = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.drain().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), drain)
            .await
            .unwrap()
            .unwrap();
        worker.join().unwrap();
        assert_eq!(gate.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drain_on_idle_gate_returns_immediately() {
        let gate = DispatchGate::new();
        gate.close();
        assert!(!gate.close());
        tokio::time::timeout(Duration::from_millis(100), gate.drain())
            .await
            .unwrap();
    }
}
