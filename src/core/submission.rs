use crate::core::hash::PhotoHashes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned submission id. Immutable, and the canonical ordering key
/// for everything that has to be reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub i64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Participant identity (the Telegram user id for bot registrations).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registration as handed over by the bot, before screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub identity: Identity,
    pub name: String,
    pub phone_number: String,
    pub username: Option<String>,
    pub campaign: String,
    pub photo_path: String,
    pub submitted_at: DateTime<Utc>,
}

/// Hashes of an already accepted submission, as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorSubmission {
    pub id: SubmissionId,
    pub identity: Identity,
    pub hashes: PhotoHashes,
}
