//! Background execution of session operations
//!
//! `TaskRunner` runs engine calls on a tokio task, hands back an awaitable
//! and cancellable `TaskHandle`, and allows one outstanding operation per
//! session.

mod runner;

pub use runner::{OperationKind, TaskHandle, TaskRunner};
