//! Typed event delivery for recognition sessions
//!
//! This module provides:
//! - `EventBus`: an ordered publish/subscribe registry with per-subscription
//!   liveness flags
//! - `EventKind` / `SessionEvent`: the events a session publishes

mod bus;
mod kinds;

pub use bus::{EventBus, Handler, SubscriptionToken};
pub use kinds::{EventKind, SessionEvent};

/// The bus type every session owns.
pub type SessionEventBus = EventBus<EventKind, SessionEvent>;
