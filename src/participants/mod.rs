//! Conversation participants
//!
//! A participant is identified by its trimmed user id, whether it is passed
//! as a full `Participant` or as a plain user-id string.

mod registry;

pub use registry::{Membership, Participant, ParticipantChange, ParticipantIdentity, ParticipantRegistry};
