//! Recognition results and the engine boundary
//!
//! This module provides:
//! - `RecognitionResult` / `SessionResult`: classified, immutable results
//! - `RecognitionEngine`: the trait an external recognizer implements
//! - `EngineSink`: the callback context an engine pushes raw events into
//! - `ResultPipeline`: raw engine events → typed session events
//! - `ChannelEngine`: an in-process engine fed through an `EngineFeed`

mod channel;
mod engine;
mod pipeline;
mod result;
mod sink;

pub use channel::{ChannelEngine, EngineFeed};
pub use engine::{EngineStartRequest, RawEngineEvent, RawResult, RecognitionEngine};
pub use pipeline::{ResultPipeline, RunSettings, TerminalHook};
pub use result::{
    CancellationDetails, CancellationErrorCode, CancellationReason, RecognitionResult,
    ResultReason, SessionResult,
};
pub use sink::EngineSink;
