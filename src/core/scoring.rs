use crate::config::{ConfigError, FraudConfig};
use crate::core::burst::BurstSignal;
use crate::core::duplicate::DuplicateSignal;
use crate::core::photo::PhotoIssue;
use crate::core::submission::Identity;
use crate::core::validation::FieldValidity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const MAX_RISK_SCORE: u8 = 100;

/// Names of everything that can contribute points. These are the keys of the
/// weight table and the `signal` field of every detail entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    DuplicateExact,
    DuplicateNear,
    RepeatPhoto,
    Burst,
    GlobalBurst,
    DuplicateIdentity,
    DuplicatePhone,
    PhotoQuality,
    ExifAnomaly,
    InvalidPhone,
    InvalidName,
    InvalidUsername,
}

impl SignalKind {
    pub const ALL: [SignalKind; 12] = [
        SignalKind::DuplicateExact,
        SignalKind::DuplicateNear,
        SignalKind::RepeatPhoto,
        SignalKind::Burst,
        SignalKind::GlobalBurst,
        SignalKind::DuplicateIdentity,
        SignalKind::DuplicatePhone,
        SignalKind::PhotoQuality,
        SignalKind::ExifAnomaly,
        SignalKind::InvalidPhone,
        SignalKind::InvalidName,
        SignalKind::InvalidUsername,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::DuplicateExact => "duplicate-exact",
            SignalKind::DuplicateNear => "duplicate-near",
            SignalKind::RepeatPhoto => "repeat-photo",
            SignalKind::Burst => "burst",
            SignalKind::GlobalBurst => "global-burst",
            SignalKind::DuplicateIdentity => "duplicate-identity",
            SignalKind::DuplicatePhone => "duplicate-phone",
            SignalKind::PhotoQuality => "photo-quality",
            SignalKind::ExifAnomaly => "exif-anomaly",
            SignalKind::InvalidPhone => "invalid-phone",
            SignalKind::InvalidName => "invalid-name",
            SignalKind::InvalidUsername => "invalid-username",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBand {
    pub level: RiskLevel,
    pub min_score: u8,
}

/// Detector output handed to the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    Duplicate(DuplicateSignal),
    Burst(BurstSignal),
    GlobalBurst(BurstSignal),
    DuplicateIdentity { identity: Identity },
    /// The phone number is already registered under another identity.
    DuplicatePhone { phone: String },
    PhotoQuality { issues: Vec<PhotoIssue> },
    /// Metadata anomalies. Always sends the submission to manual review.
    ExifAnomaly { issues: Vec<PhotoIssue> },
    /// A detector that could not run. Scored as zero but always reported.
    Skipped { signal: SignalKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDetail {
    pub signal: SignalKind,
    pub points: u32,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub details: Vec<RiskDetail>,
    pub manual_review_required: bool,
}

impl RiskAssessment {
    pub fn has_signal(&self, signal: SignalKind) -> bool {
        self.details.iter().any(|d| d.signal == signal)
    }
}

/// Table-driven risk scorer.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    weights: BTreeMap<SignalKind, u32>,
    levels: Vec<LevelBand>,
    near_match_threshold: u32,
}

impl RiskScorer {
    pub fn new(config: &FraudConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            weights: config.weights.clone(),
            levels: config.levels.clone(),
            near_match_threshold: config.near_match_threshold,
        })
    }

    fn weight(&self, signal: SignalKind) -> u32 {
        self.weights.get(&signal).copied().unwrap_or(0)
    }

    /// Points for a near duplicate, scaled down linearly with distance.
    fn near_points(&self, distance: u32) -> u32 {
        let threshold = u64::from(self.near_match_threshold.max(1));
        let closeness = threshold.saturating_sub(u64::from(distance));
        let points = u64::from(self.weight(SignalKind::DuplicateNear))
            .saturating_mul(closeness)
            .div_ceil(threshold);
        u32::try_from(points).unwrap_or(u32::MAX)
    }

    pub fn level_for(&self, score: u8) -> RiskLevel {
        self.levels
            .iter()
            .rev()
            .find(|band| band.min_score <= score)
            .map(|band| band.level)
            .unwrap_or(RiskLevel::Low)
    }

    pub fn score(&self, signals: &[Signal], fields: &FieldValidity) -> RiskAssessment {
        let mut details = Vec::new();
        let mut manual_review_required = false;

        for signal in signals {
            match signal {
                Signal::Duplicate(duplicate) => {
                    if duplicate.is_exact() {
                        let ids: Vec<String> = duplicate
                            .cross_identity_matches()
                            .map(|m| format!("#{} ({})", m.id, m.identity))
                            .collect();
                        details.push(RiskDetail {
                            signal: SignalKind::DuplicateExact,
                            points: self.weight(SignalKind::DuplicateExact),
                            note: format!("same photo as {}", ids.join(", ")),
                        });
                    }
                    if duplicate.is_repeat() {
                        let ids: Vec<String> =
                            duplicate.own_matches().map(|m| format!("#{}", m.id)).collect();
                        details.push(RiskDetail {
                            signal: SignalKind::RepeatPhoto,
                            points: self.weight(SignalKind::RepeatPhoto),
                            note: format!("photo already submitted as {}", ids.join(", ")),
                        });
                    }
                    if let Some(near) = &duplicate.near_match {
                        details.push(RiskDetail {
                            signal: SignalKind::DuplicateNear,
                            points: self.near_points(near.distance),
                            note: format!(
                                "similar to #{} ({}), distance {}",
                                near.matched.id, near.matched.identity, near.distance
                            ),
                        });
                    }
                }
                Signal::Burst(burst) => details.push(RiskDetail {
                    signal: SignalKind::Burst,
                    points: self.weight(SignalKind::Burst),
                    note: burst_note(burst),
                }),
                Signal::GlobalBurst(burst) => details.push(RiskDetail {
                    signal: SignalKind::GlobalBurst,
                    points: self.weight(SignalKind::GlobalBurst),
                    note: burst_note(burst),
                }),
                Signal::DuplicateIdentity { identity } => details.push(RiskDetail {
                    signal: SignalKind::DuplicateIdentity,
                    points: self.weight(SignalKind::DuplicateIdentity),
                    note: format!("identity {identity} already registered"),
                }),
                Signal::DuplicatePhone { phone } => details.push(RiskDetail {
                    signal: SignalKind::DuplicatePhone,
                    points: self.weight(SignalKind::DuplicatePhone),
                    note: format!("phone {phone} already used by another identity"),
                }),
                Signal::PhotoQuality { issues } => details.push(RiskDetail {
                    signal: SignalKind::PhotoQuality,
                    points: self.weight(SignalKind::PhotoQuality),
                    note: issue_note(issues),
                }),
                Signal::ExifAnomaly { issues } => {
                    manual_review_required = true;
                    details.push(RiskDetail {
                        signal: SignalKind::ExifAnomaly,
                        points: self.weight(SignalKind::ExifAnomaly),
                        note: issue_note(issues),
                    });
                }
                Signal::Skipped { signal, reason } => {
                    manual_review_required = true;
                    details.push(RiskDetail {
                        signal: *signal,
                        points: 0,
                        note: format!("not checked: {reason}"),
                    });
                }
            }
        }

        let field_checks = [
            (fields.phone_valid, SignalKind::InvalidPhone, "malformed phone number"),
            (fields.name_valid, SignalKind::InvalidName, "name too short"),
            (fields.username_valid, SignalKind::InvalidUsername, "username too short"),
        ];
        for (valid, signal, note) in field_checks {
            if !valid {
                details.push(RiskDetail {
                    signal,
                    points: self.weight(signal),
                    note: note.to_string(),
                });
            }
        }

        let total: u32 = details.iter().fold(0, |acc, d| acc.saturating_add(d.points));
        let score = total.min(u32::from(MAX_RISK_SCORE)) as u8;

        RiskAssessment {
            score,
            level: self.level_for(score),
            details,
            manual_review_required,
        }
    }
}

fn issue_note(issues: &[PhotoIssue]) -> String {
    let parts: Vec<String> = issues.iter().map(ToString::to_string).collect();
    parts.join(", ")
}

fn burst_note(burst: &BurstSignal) -> String {
    format!(
        "{} submissions for '{}' within {}s (limit {})",
        burst.peak_count, burst.key, burst.window.window_secs, burst.window.limit
    )
}
