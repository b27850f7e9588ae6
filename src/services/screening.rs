use crate::config::{ConfigError, FraudConfig};
use crate::core::burst::BurstDetector;
use crate::core::duplicate::DuplicateDetector;
use crate::core::hash::{compute_content_hash, hash_image, PhotoHashes};
use crate::core::photo::{inspect_image, PhotoPolicy};
use crate::core::scoring::{RiskAssessment, RiskScorer, Signal, SignalKind};
use crate::core::submission::{NewSubmission, PriorSubmission};
use crate::core::validation::FieldValidity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of historical data the caller loaded for one screening.
#[derive(Debug, Clone, Default)]
pub struct ScreeningContext {
    /// Every stored submission, ordered by id.
    pub prior: Vec<PriorSubmission>,
    /// Recent submission times of the same identity.
    pub identity_timestamps: Vec<DateTime<Utc>>,
    /// Recent submission times across the whole campaign.
    pub campaign_timestamps: Vec<DateTime<Utc>>,
    pub identity_already_registered: bool,
    /// Another identity already registered the same phone digits.
    pub phone_already_registered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    pub hashes: PhotoHashes,
    pub assessment: RiskAssessment,
}

/// Runs every detector over a new registration and scores the result.
pub struct ScreeningService {
    duplicates: DuplicateDetector,
    burst: BurstDetector,
    global_burst: BurstDetector,
    photo_policy: PhotoPolicy,
    scorer: RiskScorer,
}

impl ScreeningService {
    pub fn new(config: &FraudConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            scorer: RiskScorer::new(config)?,
            duplicates: DuplicateDetector::new(config.near_match_threshold),
            burst: BurstDetector::new(config.burst),
            global_burst: BurstDetector::new(config.global_burst),
            photo_policy: config.photo,
        })
    }

    pub fn burst_detector(&self) -> &BurstDetector {
        &self.burst
    }

    pub fn global_burst_detector(&self) -> &BurstDetector {
        &self.global_burst
    }

    pub fn screen(
        &self,
        submission: &NewSubmission,
        photo_bytes: &[u8],
        context: &ScreeningContext,
    ) -> Screening {
        let mut signals = Vec::new();

        let exact = compute_content_hash(photo_bytes);
        let hashes = match image::load_from_memory(photo_bytes) {
            Ok(img) => {
                let inspection = inspect_image(&img, photo_bytes);
                let quality = inspection.quality_issues(&self.photo_policy);
                if !quality.is_empty() {
                    signals.push(Signal::PhotoQuality { issues: quality });
                }
                let metadata = inspection.metadata_issues(&self.photo_policy);
                if !metadata.is_empty() {
                    signals.push(Signal::ExifAnomaly { issues: metadata });
                }
                PhotoHashes {
                    exact,
                    perceptual: Some(hash_image(&img)),
                }
            }
            Err(e) => {
                log::warn!(
                    "Photo of {} could not be decoded, near-duplicate and quality checks skipped: {}",
                    submission.identity,
                    e
                );
                for signal in [SignalKind::DuplicateNear, SignalKind::PhotoQuality] {
                    signals.push(Signal::Skipped {
                        signal,
                        reason: format!("photo could not be decoded ({e})"),
                    });
                }
                PhotoHashes {
                    exact,
                    perceptual: None,
                }
            }
        };

        if let Some(duplicate) =
            self.duplicates
                .detect(&submission.identity, &hashes, &context.prior)
        {
            log::info!(
                "Duplicate photo for {}: {} exact, near={:?}",
                submission.identity,
                duplicate.exact_matches.len(),
                duplicate.near_match.as_ref().map(|n| n.distance)
            );
            signals.push(Signal::Duplicate(duplicate));
        }

        // The submission being screened counts towards its own window
        let mut identity_times = context.identity_timestamps.clone();
        identity_times.push(submission.submitted_at);
        if let Some(burst) = self
            .burst
            .inspect(submission.identity.as_str(), &identity_times)
        {
            signals.push(Signal::Burst(burst));
        }

        let mut campaign_times = context.campaign_timestamps.clone();
        campaign_times.push(submission.submitted_at);
        let campaign_key = format!("campaign:{}", submission.campaign);
        if let Some(burst) = self.global_burst.inspect(&campaign_key, &campaign_times) {
            signals.push(Signal::GlobalBurst(burst));
        }

        if context.identity_already_registered {
            signals.push(Signal::DuplicateIdentity {
                identity: submission.identity.clone(),
            });
        }
        if context.phone_already_registered {
            signals.push(Signal::DuplicatePhone {
                phone: submission.phone_number.clone(),
            });
        }

        let fields = FieldValidity::check(
            &submission.name,
            &submission.phone_number,
            submission.username.as_deref(),
        );
        let assessment = self.scorer.score(&signals, &fields);

        log::debug!(
            "Screened {}: score={} level={} signals={}",
            submission.identity,
            assessment.score,
            assessment.level,
            assessment.details.len()
        );

        Screening { hashes, assessment }
    }
}
