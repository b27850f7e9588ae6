use crate::config::{ConfigError, FraudConfig};
use crate::core::hash::compute_content_hash;
use crate::core::submission::{NewSubmission, SubmissionId};
use crate::database::models::{Reassessment, SubmissionRecord};
use crate::database::repositories::SubmissionRepository;
use crate::database::{Database, DatabaseError};
use crate::services::screening::{Screening, ScreeningContext, ScreeningService};
use chrono::{DateTime, Utc};

/// Screens registrations against the store and persists the outcome.
pub struct RegistrationService<'a> {
    db: &'a Database,
    screening: ScreeningService,
}

impl<'a> RegistrationService<'a> {
    pub fn new(db: &'a Database, config: &FraudConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            db,
            screening: ScreeningService::new(config)?,
        })
    }

    fn submissions(&self) -> SubmissionRepository<'a> {
        SubmissionRepository::new(self.db)
    }

    /// Load everything the detectors need for a submission arriving now.
    pub fn context_for(&self, submission: &NewSubmission) -> Result<ScreeningContext, DatabaseError> {
        let repo = self.submissions();
        let at = submission.submitted_at;
        Ok(ScreeningContext {
            prior: repo.prior_hashes()?,
            identity_timestamps: repo.identity_timestamps(
                &submission.identity,
                self.screening.burst_detector().lookback_from(at),
            )?,
            campaign_timestamps: repo.campaign_timestamps(
                &submission.campaign,
                self.screening.global_burst_detector().lookback_from(at),
            )?,
            identity_already_registered: repo.identity_exists(&submission.identity)?,
            phone_already_registered: repo.phone_exists(
                &submission.phone_number,
                &submission.identity,
                None,
            )?,
        })
    }

    pub fn preview(
        &self,
        submission: &NewSubmission,
        photo_bytes: &[u8],
    ) -> Result<Screening, DatabaseError> {
        let context = self.context_for(submission)?;
        Ok(self.screening.screen(submission, photo_bytes, &context))
    }

    /// Screen a new submission and store it with its assessment.
    pub fn register(
        &self,
        submission: &NewSubmission,
        photo_bytes: &[u8],
    ) -> Result<SubmissionRecord, DatabaseError> {
        let screening = self.preview(submission, photo_bytes)?;
        if screening.assessment.manual_review_required {
            log::warn!(
                "Submission from {} needs manual review",
                submission.identity
            );
        }
        self.submissions()
            .register(submission, &screening.hashes, &screening.assessment)
    }

    /// Recompute the assessment of a stored submission under the current
    /// policy. Only data that existed when it was submitted is considered.
    pub fn rescore(
        &self,
        id: SubmissionId,
        photo_bytes: &[u8],
        reason: &str,
    ) -> Result<(Screening, Reassessment), DatabaseError> {
        let repo = self.submissions();
        let record = repo.find_by_id(id)?;

        let actual = compute_content_hash(photo_bytes);
        if actual != record.hashes.exact {
            return Err(DatabaseError::InvalidValue(format!(
                "photo of submission {} changed since it was stored ({} != {})",
                id, actual, record.hashes.exact
            )));
        }

        let submission = NewSubmission {
            identity: record.identity.clone(),
            name: record.name.clone(),
            phone_number: record.phone_number.clone(),
            username: record.username.clone(),
            campaign: record.campaign.clone(),
            photo_path: record.photo_path.clone(),
            submitted_at: record.submitted_at,
        };

        let prior: Vec<_> = repo
            .prior_hashes()?
            .into_iter()
            .filter(|prior| prior.id < id)
            .collect();
        let at = record.submitted_at;
        let context = ScreeningContext {
            identity_already_registered: prior.iter().any(|p| p.identity == record.identity),
            phone_already_registered: repo.phone_exists(
                &record.phone_number,
                &record.identity,
                Some(id),
            )?,
            identity_timestamps: history_before(
                repo.identity_timestamps(
                    &record.identity,
                    self.screening.burst_detector().lookback_from(at),
                )?,
                at,
            ),
            campaign_timestamps: history_before(
                repo.campaign_timestamps(
                    &record.campaign,
                    self.screening.global_burst_detector().lookback_from(at),
                )?,
                at,
            ),
            prior,
        };

        let screening = self.screening.screen(&submission, photo_bytes, &context);
        let audit = repo.reassess(id, &screening.assessment, reason)?;
        Ok((screening, audit))
    }
}

/// Timestamps up to `at`, minus the one belonging to the submission itself.
fn history_before(mut timestamps: Vec<DateTime<Utc>>, at: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    timestamps.retain(|t| *t <= at);
    if let Some(own) = timestamps.iter().position(|t| *t == at) {
        timestamps.remove(own);
    }
    timestamps
}
