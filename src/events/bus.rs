use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Subscriber callback. Runs on the dispatching context and must not block.
pub type Handler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Identifies one subscription for `disconnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken<K> {
    kind: K,
    id: u64,
}

impl<K: Copy> SubscriptionToken<K> {
    pub fn kind(&self) -> K {
        self.kind
    }
}

struct Subscription<E> {
    id: u64,
    connected: AtomicBool,
    handler: Handler<E>,
}

/// Ordered publish/subscribe registry
///
/// Subscriptions are only ever appended or flagged as disconnected while
/// a dispatch may be running. Dispatch iterates a snapshot of the list and
/// checks each `connected` flag right before invoking the handler, so a
/// disconnect never waits on a running dispatch and a disconnected handler
/// receives nothing further.
pub struct EventBus<K, E> {
    /// Used as the log label (the owning session id)
    label: String,
    subscriptions: RwLock<HashMap<K, Vec<Arc<Subscription<E>>>>>,
    next_id: AtomicU64,
    handler_failures: AtomicU64,
}

impl<K, E> EventBus<K, E>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Append a handler for `kind`. Handlers run in registration order.
    pub fn connect<F>(&self, kind: K, handler: F) -> SubscriptionToken<K>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            id,
            connected: AtomicBool::new(true),
            handler: Arc::new(handler),
        });

        let mut subscriptions = self.subscriptions.write();
        let list = subscriptions.entry(kind).or_default();
        // Running dispatches hold their own snapshot, so compaction is safe here
        list.retain(|s| s.connected.load(Ordering::Acquire));
        list.push(subscription);

        debug!("[{}] handler {} connected to {:?}", self.label, id, kind);

        SubscriptionToken { kind, id }
    }

    /// Stop further deliveries to a subscription.
    ///
    /// Returns `false` if the token was already disconnected or unknown.
    pub fn disconnect(&self, token: &SubscriptionToken<K>) -> bool {
        let subscriptions = self.subscriptions.read();
        let Some(list) = subscriptions.get(&token.kind) else {
            return false;
        };

        match list.iter().find(|s| s.id == token.id) {
            Some(subscription) => {
                let was_connected = subscription.connected.swap(false, Ordering::AcqRel);
                if was_connected {
                    debug!("[{}] handler {} disconnected", self.label, token.id);
                }
                was_connected
            }
            None => false,
        }
    }

    /// Disconnect every subscription of every kind. Returns how many were live.
    pub fn disconnect_all(&self) -> usize {
        let subscriptions = self.subscriptions.read();
        subscriptions
            .values()
            .flatten()
            .filter(|s| s.connected.swap(false, Ordering::AcqRel))
            .count()
    }

    /// Deliver `event` to every connected handler for `kind`, in order.
    ///
    /// Handler errors and panics are logged and counted; they never stop
    /// delivery to the remaining handlers. Returns the number of handlers
    /// that completed successfully.
    pub fn dispatch(&self, kind: K, event: &E) -> usize {
        let snapshot: Vec<Arc<Subscription<E>>> = match self.subscriptions.read().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for subscription in snapshot {
            if !subscription.connected.load(Ordering::Acquire) {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "[{}] handler {} failed on {:?}: {:#}",
                        self.label, subscription.id, kind, e
                    );
                }
                Err(payload) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "[{}] handler {} panicked on {:?}: {}",
                        self.label,
                        subscription.id,
                        kind,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        delivered
    }

    /// Number of connected handlers for `kind`
    pub fn subscriber_count(&self, kind: K) -> usize {
        self.subscriptions
            .read()
            .get(&kind)
            .map_or(0, |list| {
                list.iter()
                    .filter(|s| s.connected.load(Ordering::Acquire))
                    .count()
            })
    }

    /// Total handler errors and panics isolated so far
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
