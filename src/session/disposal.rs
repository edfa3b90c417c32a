use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{SpeechError, SpeechResult};

const LIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// One-way live → disposing → disposed latch
#[derive(Debug, Default)]
pub struct DisposalGuard {
    phase: AtomicU8,
    finished: Notify,
}

impl DisposalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Disposed` once teardown has begun
    pub fn ensure_live(&self) -> SpeechResult<()> {
        if self.phase.load(Ordering::Acquire) == LIVE {
            Ok(())
        } else {
            Err(SpeechError::Disposed)
        }
    }

    pub fn is_live(&self) -> bool {
        self.phase.load(Ordering::Acquire) == LIVE
    }

    pub fn is_disposed(&self) -> bool {
        self.phase.load(Ordering::Acquire) == DISPOSED
    }

    /// Claim the teardown. Only the first caller gets `true`.
    fn begin(&self) -> bool {
        self.phase
            .compare_exchange(LIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.phase.store(DISPOSED, Ordering::Release);
        self.finished.notify_waiters();
    }

    /// Resolves once the teardown that claimed this guard has completed
    pub async fn wait_disposed(&self) {
        loop {
            let finished = self.finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            if self.is_disposed() {
                return;
            }
            finished.await;
        }
    }
}

/// The teardown steps of something guarded by a `DisposalGuard`
#[async_trait]
pub(crate) trait Disposable: Send + Sync {
    fn guard(&self) -> &DisposalGuard;

    fn label(&self) -> &str;

    /// Step 1: no handler receives anything after this
    fn disconnect_handlers(&self) -> usize;

    /// Step 2: cancel and await outstanding work, stop the engine if it is
    /// running and wait out any dispatch still in flight
    async fn quiesce(&self);

    /// Step 3
    async fn release_resources(&self);

    /// Step 4
    fn mark_disposed(&self);
}

/// Run the teardown in its fixed order. Returns `false` if another call
/// already claimed it; that call's teardown has finished by the time this
/// one returns.
pub(crate) async fn dispose<T: Disposable + ?Sized>(target: &T) -> bool {
    if !target.guard().begin() {
        debug!("[{}] already disposing, waiting for teardown", target.label());
        target.guard().wait_disposed().await;
        return false;
    }

    info!("Disposing session: {}", target.label());

    let disconnected = target.disconnect_handlers();
    debug!("[{}] disconnected {} handler(s)", target.label(), disconnected);

    target.quiesce().await;
    debug!("[{}] quiesced", target.label());

    target.release_resources().await;
    debug!("[{}] resources released", target.label());

    target.mark_disposed();
    target.guard().finish();

    info!("Session disposed: {}", target.label());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        guard: DisposalGuard,
        steps: Mutex<Vec<&'static str>>,
        slow_release: bool,
    }

    #[async_trait]
    impl Disposable for Recorder {
        fn guard(&self) -> &DisposalGuard {
            &self.guard
        }

        fn label(&self) -> &str {
            "recorder"
        }

        fn disconnect_handlers(&self) -> usize {
            self.steps.lock().push("disconnect");
            0
        }

        async fn quiesce(&self) {
            assert!(self.guard.ensure_live().is_err(), "ops refused while disposing");
            self.steps.lock().push("quiesce");
        }

        async fn release_resources(&self) {
            if self.slow_release {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.steps.lock().push("release");
        }

        fn mark_disposed(&self) {
            self.steps.lock().push("mark");
        }
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let target = Recorder::default();

        assert!(dispose(&target).await);
        assert_eq!(
            *target.steps.lock(),
            vec!["disconnect", "quiesce", "release", "mark"]
        );
        assert!(target.guard.is_disposed());
    }

    #[tokio::test]
    async fn test_second_dispose_is_silent() {
        let target = Recorder::default();

        assert!(dispose(&target).await);
        assert!(!dispose(&target).await);
        assert_eq!(target.steps.lock().len(), 4);
        assert_eq!(target.guard.ensure_live(), Err(SpeechError::Disposed));
    }

    #[tokio::test]
    async fn test_concurrent_dispose_waits_for_teardown() {
        let target = Arc::new(Recorder {
            slow_release: true,
            ..Default::default()
        });

        let first = {
            let target = Arc::clone(&target);
            tokio::spawn(async move { dispose(target.as_ref()).await })
        };
        while target.guard.is_live() {
            tokio::task::yield_now().await;
        }

        assert!(!dispose(target.as_ref()).await);
        assert!(target.guard.is_disposed());
        assert_eq!(target.steps.lock().last(), Some(&"mark"));
        assert!(first.await.unwrap());
    }
}
