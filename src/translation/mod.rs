//! Translation fan-out
//!
//! A translation session produces one `TranslationResult` per utterance with
//! an entry for every configured target language, plus synthesized audio per
//! language when a voice was requested.

mod audio;
mod multiplexer;
mod result;

pub use audio::AudioSegment;
pub use multiplexer::TranslationMultiplexer;
pub use result::{TranslationEntry, TranslationResult};

// Target and voice lookup for translation callers
pub use crate::catalog::{LanguageResource, LanguageResourceCatalog, LanguageResourceScope};
