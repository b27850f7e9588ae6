//! Verifiable winner draw.
//!
//! The drawn index is `SHA-256(seed || 0x00 || canonical entries) mod n`, where
//! the canonical entry list is ordered by submission id and serialized as one
//! `"{id}:{identity}\n"` line per entry. Anyone holding the disclosed seed and
//! the eligible list can recompute the result with standard tools.

use crate::core::submission::{Identity, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Format of timestamp-derived seeds (one seed per hour).
pub const TIMESTAMP_SEED_FORMAT: &str = "%Y-%m-%d-%H";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("No eligible entries to draw from")]
    NoEntries,

    #[error("Submission {id} appears more than once in the eligible set")]
    DuplicateEntry { id: SubmissionId },

    #[error("Seed value must not be empty")]
    EmptySeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedSource {
    /// Hash of a recent public blockchain block.
    BlockHash,
    Timestamp,
    /// Value supplied by the administrator running the draw.
    Nonce,
}

impl SeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedSource::BlockHash => "block-hash",
            SeedSource::Timestamp => "timestamp",
            SeedSource::Nonce => "nonce",
        }
    }
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Seed disclosed together with the draw result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMaterial {
    pub source: SeedSource,
    pub value: String,
}

impl SeedMaterial {
    pub fn block_hash(hash: impl Into<String>) -> Self {
        Self {
            source: SeedSource::BlockHash,
            value: hash.into().trim().to_string(),
        }
    }

    pub fn nonce(nonce: impl Into<String>) -> Self {
        Self {
            source: SeedSource::Nonce,
            value: nonce.into(),
        }
    }

    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self {
            source: SeedSource::Timestamp,
            value: at.format(TIMESTAMP_SEED_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleEntry {
    pub id: SubmissionId,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerSelection {
    pub seed: SeedMaterial,
    /// Hex SHA-256 of the draw input.
    pub digest: String,
    pub eligible_count: usize,
    /// Position of the winner in the canonical order.
    pub index: usize,
    pub winner: EligibleEntry,
    /// The canonical eligible list the draw was made from.
    pub entries: Vec<EligibleEntry>,
}

/// Sort by submission id and reject repeated ids.
pub fn canonicalize(entries: &[EligibleEntry]) -> Result<Vec<EligibleEntry>, DrawError> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|entry| entry.id);
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].id == pair[1].id) {
        return Err(DrawError::DuplicateEntry { id: pair[0].id });
    }
    Ok(sorted)
}

fn canonical_bytes(sorted: &[EligibleEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(format!("{}:{}\n", entry.id, entry.identity).as_bytes());
    }
    out
}

/// Big-endian digest modulo `n`.
fn reduce(digest: &[u8], n: usize) -> usize {
    let n = n as u128;
    let remainder = digest
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + u128::from(*byte)) % n);
    remainder as usize
}

pub fn select_winner(
    entries: &[EligibleEntry],
    seed: &SeedMaterial,
) -> Result<WinnerSelection, DrawError> {
    if seed.value.is_empty() {
        return Err(DrawError::EmptySeed);
    }
    if entries.is_empty() {
        return Err(DrawError::NoEntries);
    }
    let sorted = canonicalize(entries)?;

    let mut hasher = Sha256::new();
    hasher.update(seed.value.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_bytes(&sorted));
    let digest = hasher.finalize();

    let index = reduce(&digest, sorted.len());
    Ok(WinnerSelection {
        seed: seed.clone(),
        digest: hex::encode(digest),
        eligible_count: sorted.len(),
        index,
        winner: sorted[index].clone(),
        entries: sorted,
    })
}

/// Recompute a recorded draw from its disclosed seed and eligible list.
pub fn verify_selection(entries: &[EligibleEntry], selection: &WinnerSelection) -> bool {
    match select_winner(entries, &selection.seed) {
        Ok(recomputed) => {
            recomputed.digest == selection.digest
                && recomputed.index == selection.index
                && recomputed.winner == selection.winner
        }
        Err(_) => false,
    }
}
