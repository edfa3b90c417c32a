use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SpeechError, SpeechResult};

/// A person attached to a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    /// Opaque enrollment data for speaker attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_signature: Option<String>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            preferred_language: None,
            voice_signature: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_preferred_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = Some(language.into());
        self
    }

    pub fn with_voice_signature(mut self, signature: impl Into<String>) -> Self {
        self.voice_signature = Some(signature.into());
        self
    }
}

/// Either form a caller may identify a participant by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantIdentity {
    Participant(Participant),
    UserId(String),
}

impl ParticipantIdentity {
    /// Registry key: the trimmed user id
    pub fn key(&self) -> &str {
        match self {
            ParticipantIdentity::Participant(p) => p.user_id.trim(),
            ParticipantIdentity::UserId(id) => id.trim(),
        }
    }

    fn into_participant(self) -> Participant {
        match self {
            ParticipantIdentity::Participant(mut p) => {
                p.user_id = p.user_id.trim().to_string();
                p
            }
            ParticipantIdentity::UserId(id) => Participant::new(id.trim()),
        }
    }
}

impl From<Participant> for ParticipantIdentity {
    fn from(participant: Participant) -> Self {
        ParticipantIdentity::Participant(participant)
    }
}

impl From<&Participant> for ParticipantIdentity {
    fn from(participant: &Participant) -> Self {
        ParticipantIdentity::Participant(participant.clone())
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(user_id: &str) -> Self {
        ParticipantIdentity::UserId(user_id.to_string())
    }
}

impl From<String> for ParticipantIdentity {
    fn from(user_id: String) -> Self {
        ParticipantIdentity::UserId(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Added,
    Removed,
}

/// Outcome of `update_participant`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantChange {
    Added,
    Removed,
    /// Already a member; nothing changed
    Unchanged,
}

impl ParticipantChange {
    pub fn changed(self) -> bool {
        self != ParticipantChange::Unchanged
    }
}

#[derive(Debug)]
struct Entry {
    participant: Participant,
    membership: Membership,
}

/// Membership of a conversation session, kept in join order
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (`add = true`) or remove a participant.
    ///
    /// Adding a current member is a successful no-op. Removing someone who
    /// is not a member fails with `NotFound`. Re-adding a removed member
    /// restores it with the new data.
    pub fn update_participant(
        &self,
        add: bool,
        who: impl Into<ParticipantIdentity>,
    ) -> SpeechResult<ParticipantChange> {
        let who = who.into();
        let key = who.key().to_string();
        if key.is_empty() {
            return Err(SpeechError::InvalidArgument(
                "participant user id must not be empty".to_string(),
            ));
        }

        let mut entries = self.entries.lock();
        let existing = entries.iter().position(|e| e.participant.user_id == key);

        let change = match (add, existing) {
            (true, Some(index)) if entries[index].membership == Membership::Added => {
                ParticipantChange::Unchanged
            }
            (true, Some(index)) => {
                // Rejoin goes to the back of the join order
                entries.remove(index);
                entries.push(Entry {
                    participant: who.into_participant(),
                    membership: Membership::Added,
                });
                ParticipantChange::Added
            }
            (true, None) => {
                entries.push(Entry {
                    participant: who.into_participant(),
                    membership: Membership::Added,
                });
                ParticipantChange::Added
            }
            (false, Some(index)) if entries[index].membership == Membership::Added => {
                entries[index].membership = Membership::Removed;
                ParticipantChange::Removed
            }
            (false, _) => return Err(SpeechError::NotFound(key)),
        };

        debug!("Participant {}: {:?}", key, change);
        Ok(change)
    }

    /// Current members in join order
    pub fn participants(&self) -> Vec<Participant> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.membership == Membership::Added)
            .map(|e| e.participant.clone())
            .collect()
    }

    pub fn membership(&self, user_id: &str) -> Option<Membership> {
        let key = user_id.trim();
        self.entries
            .lock()
            .iter()
            .find(|e| e.participant.user_id == key)
            .map(|e| e.membership)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.membership(user_id) == Some(Membership::Added)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.membership == Membership::Added)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_forms_share_a_key() {
        let registry = ParticipantRegistry::new();

        let added = registry
            .update_participant(true, Participant::new("alice").with_display_name("Alice"))
            .unwrap();
        assert_eq!(added, ParticipantChange::Added);

        let again = registry.update_participant(true, " alice ").unwrap();
        assert_eq!(again, ParticipantChange::Unchanged);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.participants()[0].display_name.as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn test_remove_non_member_is_not_found() {
        let registry = ParticipantRegistry::new();
        let err = registry.update_participant(false, "bob").unwrap_err();
        assert_eq!(err, SpeechError::NotFound("bob".to_string()));

        registry.update_participant(true, "bob").unwrap();
        assert_eq!(
            registry.update_participant(false, "bob").unwrap(),
            ParticipantChange::Removed
        );
        assert!(registry.update_participant(false, "bob").is_err());
        assert_eq!(registry.membership("bob"), Some(Membership::Removed));
    }

    #[test]
    fn test_rejoin_keeps_join_order() {
        let registry = ParticipantRegistry::new();
        registry.update_participant(true, "a").unwrap();
        registry.update_participant(true, "b").unwrap();
        registry.update_participant(false, "a").unwrap();
        registry
            .update_participant(true, Participant::new("a").with_preferred_language("de"))
            .unwrap();

        let ids: Vec<String> = registry.participants().into_iter().map(|p| p.user_id).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(
            registry.participants()[1].preferred_language.as_deref(),
            Some("de")
        );
    }

    #[test]
    fn test_empty_identity_rejected() {
        let registry = ParticipantRegistry::new();
        assert!(matches!(
            registry.update_participant(true, "   "),
            Err(SpeechError::InvalidArgument(_))
        ));
    }
}
