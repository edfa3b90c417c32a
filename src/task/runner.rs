use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{SpeechError, SpeechResult};
use crate::recognition::{CancellationDetails, CancellationErrorCode};

/// Session operations that go through the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Start,
    Stop,
    RecognizeOnce,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Start => f.write_str("start"),
            OperationKind::Stop => f.write_str("stop"),
            OperationKind::RecognizeOnce => f.write_str("recognize_once"),
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveOperation {
    kind: OperationKind,
    seq: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Slot {
    active: Option<ActiveOperation>,
    closed: bool,
}

/// Runs at most one session operation at a time
pub struct TaskRunner {
    label: String,
    slot: Arc<watch::Sender<Slot>>,
    next_seq: AtomicU64,
}

impl TaskRunner {
    pub fn new(label: impl Into<String>) -> Self {
        let (slot, _) = watch::channel(Slot::default());
        Self {
            label: label.into(),
            slot: Arc::new(slot),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Spawn `operation` on the current tokio runtime.
    ///
    /// The closure receives the operation's cancellation token; honouring it
    /// is up to the operation. Fails with `Busy` while another operation is
    /// outstanding and with `Disposed` once the runner is closed.
    pub fn submit<T, F, Fut>(&self, kind: OperationKind, operation: F) -> SpeechResult<TaskHandle<T>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = SpeechResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut rejection = None;

        self.slot.send_if_modified(|slot| {
            if slot.closed {
                rejection = Some(SpeechError::Disposed);
                return false;
            }
            if let Some(active) = &slot.active {
                rejection = Some(SpeechError::Busy { active: active.kind });
                return false;
            }
            slot.active = Some(ActiveOperation {
                kind,
                seq,
                cancel: cancel.clone(),
            });
            true
        });

        if let Some(error) = rejection {
            debug!("[{}] {} rejected: {}", self.label, kind, error);
            return Err(error);
        }

        debug!("[{}] {} submitted", self.label, kind);

        let release = SlotRelease {
            slot: Arc::clone(&self.slot),
            seq,
        };
        let future = operation(cancel.clone());
        let join = tokio::spawn(async move {
            let _release = release;
            future.await
        });

        Ok(TaskHandle { kind, cancel, join })
    }

    /// The operation currently outstanding, if any
    pub fn active(&self) -> Option<OperationKind> {
        self.slot.borrow().active.as_ref().map(|op| op.kind)
    }

    /// Signal the outstanding operation to abort. Does not wait.
    pub fn cancel_active(&self) -> Option<OperationKind> {
        let slot = self.slot.borrow();
        slot.active.as_ref().map(|op| {
            debug!("[{}] cancelling {}", self.label, op.kind);
            op.cancel.cancel();
            op.kind
        })
    }

    /// Resolve once no operation is outstanding
    pub async fn wait_idle(&self) {
        let mut rx = self.slot.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|slot| slot.active.is_none()).await;
    }

    /// Refuse every later submission with `Disposed`
    pub fn close(&self) {
        self.slot.send_modify(|slot| slot.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.slot.borrow().closed
    }
}

/// Frees the runner slot when the spawned operation ends, however it ends
struct SlotRelease {
    slot: Arc<watch::Sender<Slot>>,
    seq: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let seq = self.seq;
        self.slot.send_if_modified(|slot| {
            if slot.active.as_ref().map(|op| op.seq) == Some(seq) {
                slot.active = None;
                true
            } else {
                false
            }
        });
    }
}

/// Awaitable, cancellable handle to a submitted operation
pub struct TaskHandle<T> {
    kind: OperationKind,
    cancel: CancellationToken,
    join: JoinHandle<SpeechResult<T>>,
}

impl<T> TaskHandle<T> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Ask the operation to abort; it resolves once it acknowledges
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the operation's outcome
    pub async fn wait(self) -> SpeechResult<T> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                error!("{} operation terminated abnormally: {}", self.kind, e);
                Err(SpeechError::Canceled(CancellationDetails::error(
                    CancellationErrorCode::RuntimeError,
                    format!("{} operation terminated abnormally: {}", self.kind, e),
                )))
            }
        }
    }
}
