pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod nats;
pub mod participants;
pub mod recognition;
pub mod session;
pub mod task;
pub mod translation;

pub use catalog::{LanguageResource, LanguageResourceCatalog, LanguageResourceScope};
pub use config::Config;
pub use error::{SpeechError, SpeechResult};
pub use events::{EventKind, SessionEvent, SubscriptionToken};
pub use http::{create_router, AppState};
pub use nats::{ControlMessage, NatsEngine, TranscriptMessage};
pub use participants::{Participant, ParticipantChange, ParticipantRegistry};
pub use recognition::{
    CancellationDetails, ChannelEngine, EngineFeed, RecognitionEngine, RecognitionResult,
    ResultReason, SessionResult,
};
pub use session::{SessionConfig, SessionController, SessionMode, SessionState, SessionStats, TranscriptSegment};
pub use translation::{TranslationMultiplexer, TranslationResult};
