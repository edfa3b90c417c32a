//! HTTP API server for external control
//!
//! This module provides a REST API for controlling recognition sessions:
//! - POST /sessions - Create and start a session
//! - POST /sessions/:id/stop - Stop recognition
//! - DELETE /sessions/:id - Dispose a session
//! - GET /sessions/:id/status - Query session statistics
//! - GET /sessions/:id/transcript - Get the recognized transcript
//! - POST /sessions/:id/participants - Add or remove a conversation participant
//! - GET /languages - Available languages and voices
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, EngineFactory, NatsEngineFactory, Reservation, SessionDefaults};
