use crate::core::hash::PhotoHashes;
use crate::core::randomizer::WinnerSelection;
use crate::core::scoring::{RiskAssessment, RiskLevel};
use crate::core::submission::{Identity, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub identity: Identity,
    pub name: String,
    pub phone_number: String,
    pub username: Option<String>,
    pub campaign: String,
    pub photo_path: String,
    pub hashes: PhotoHashes,
    pub submitted_at: DateTime<Utc>,
    pub review_status: ReviewStatus,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub is_winner: bool,
    pub assessment: Option<StoredAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssessment {
    pub assessment: RiskAssessment,
    pub assessed_at: DateTime<Utc>,
}

/// Audit row left behind by an explicit re-assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reassessment {
    pub submission_id: SubmissionId,
    pub previous_score: u8,
    pub previous_level: RiskLevel,
    pub new_score: u8,
    pub new_level: RiskLevel,
    pub reason: String,
    pub reassessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRecord {
    pub id: String,
    pub campaign: Option<String>,
    pub selection: WinnerSelection,
    pub drawn_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub level: Option<RiskLevel>,
    pub status: Option<ReviewStatus>,
    pub campaign: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionStats {
    pub total: i64,
    pub unassessed: i64,
    pub manual_review: i64,
    pub winners: i64,
    pub by_level: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
}

// Enums for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Blocked,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<String> for ReviewStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "approved" => ReviewStatus::Approved,
            "rejected" => ReviewStatus::Rejected,
            "blocked" => ReviewStatus::Blocked,
            _ => ReviewStatus::Pending,
        }
    }
}

impl From<ReviewStatus> for String {
    fn from(status: ReviewStatus) -> Self {
        status.as_str().to_string()
    }
}
