//! Language and voice resource catalogue
//!
//! This module provides:
//! - `LanguageResourceScope`: speech / text / TTS bit flags
//! - `LanguageResource`: the three keyed resource maps
//! - `CatalogSource`: where resources come from (static or JSON file)
//! - `LanguageResourceCatalog`: per-locale snapshot cache that never blocks
//!   readers on a refresh in flight

mod cache;
mod resource;
mod source;

pub use cache::LanguageResourceCatalog;
pub use resource::{
    LanguageResource, LanguageResourceScope, SpeechLanguage, TextDirection, TextLanguage,
    VoiceResource,
};
pub use source::{CatalogSource, FileCatalogSource, StaticCatalogSource};
