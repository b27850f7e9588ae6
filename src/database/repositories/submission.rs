use super::Repository;
use crate::core::hash::{ContentHash, PerceptualHash, PhotoHashes};
use crate::core::randomizer::EligibleEntry;
use crate::core::scoring::{RiskAssessment, RiskDetail, RiskLevel};
use crate::core::submission::{Identity, NewSubmission, PriorSubmission, SubmissionId};
use crate::core::validation::normalize_phone;
use crate::database::models::{
    Reassessment, ReviewStatus, StoredAssessment, SubmissionFilter, SubmissionRecord,
    SubmissionStats,
};
use crate::database::{format_time, parse_time, Database, DatabaseError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_SUBMISSION: &str = "
    SELECT s.id, s.identity, s.name, s.phone_number, s.username, s.campaign, s.photo_path,
           s.photo_hash, s.photo_phash, s.submitted_at, s.review_status, s.review_note,
           s.reviewed_at, s.is_winner,
           a.risk_score, a.risk_level, a.risk_details, a.manual_review_required, a.assessed_at
    FROM submissions s
    LEFT JOIN risk_assessments a ON a.submission_id = s.id";

/// Column values as stored; converted into a [`SubmissionRecord`] after the
/// statement has finished so conversion errors keep their own type.
struct RawSubmission {
    id: i64,
    identity: String,
    name: String,
    phone_number: String,
    username: Option<String>,
    campaign: String,
    photo_path: String,
    photo_hash: String,
    photo_phash: Option<String>,
    submitted_at: String,
    review_status: String,
    review_note: Option<String>,
    reviewed_at: Option<String>,
    is_winner: bool,
    risk_score: Option<i64>,
    risk_level: Option<String>,
    risk_details: Option<String>,
    manual_review_required: Option<bool>,
    assessed_at: Option<String>,
}

impl RawSubmission {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            identity: row.get(1)?,
            name: row.get(2)?,
            phone_number: row.get(3)?,
            username: row.get(4)?,
            campaign: row.get(5)?,
            photo_path: row.get(6)?,
            photo_hash: row.get(7)?,
            photo_phash: row.get(8)?,
            submitted_at: row.get(9)?,
            review_status: row.get(10)?,
            review_note: row.get(11)?,
            reviewed_at: row.get(12)?,
            is_winner: row.get(13)?,
            risk_score: row.get(14)?,
            risk_level: row.get(15)?,
            risk_details: row.get(16)?,
            manual_review_required: row.get(17)?,
            assessed_at: row.get(18)?,
        })
    }

    fn into_record(self) -> Result<SubmissionRecord, DatabaseError> {
        let assessment = match (self.risk_score, self.risk_level, self.risk_details, self.assessed_at) {
            (Some(score), Some(level), Some(details), Some(assessed_at)) => {
                let details: Vec<RiskDetail> = serde_json::from_str(&details)?;
                Some(StoredAssessment {
                    assessment: RiskAssessment {
                        score: score_from_column(score)?,
                        level: parse_level(&level)?,
                        details,
                        manual_review_required: self.manual_review_required.unwrap_or(false),
                    },
                    assessed_at: parse_time(&assessed_at)?,
                })
            }
            _ => None,
        };

        Ok(SubmissionRecord {
            id: SubmissionId(self.id),
            identity: Identity::new(self.identity),
            name: self.name,
            phone_number: self.phone_number,
            username: self.username,
            campaign: self.campaign,
            photo_path: self.photo_path,
            hashes: PhotoHashes {
                exact: ContentHash::parse(&self.photo_hash)?,
                perceptual: self
                    .photo_phash
                    .as_deref()
                    .map(PerceptualHash::parse)
                    .transpose()?,
            },
            submitted_at: parse_time(&self.submitted_at)?,
            review_status: ReviewStatus::from(self.review_status),
            review_note: self.review_note,
            reviewed_at: self.reviewed_at.as_deref().map(parse_time).transpose()?,
            is_winner: self.is_winner,
            assessment,
        })
    }
}

fn parse_level(value: &str) -> Result<RiskLevel, DatabaseError> {
    value.parse().map_err(DatabaseError::InvalidValue)
}

fn score_from_column(value: i64) -> Result<u8, DatabaseError> {
    u8::try_from(value)
        .ok()
        .filter(|score| *score <= 100)
        .ok_or_else(|| DatabaseError::InvalidValue(format!("risk score {}", value)))
}

pub struct SubmissionRepository<'a> {
    db: &'a Database,
}

impl Repository for SubmissionRepository<'_> {
    fn database(&self) -> &Database {
        self.db
    }
}

impl<'a> SubmissionRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        submission: &NewSubmission,
        hashes: &PhotoHashes,
    ) -> Result<SubmissionId, DatabaseError> {
        insert_submission(self.connection(), submission, hashes)
    }

    /// Store a submission together with its first assessment, atomically, so
    /// no submission is ever visible without one.
    pub fn register(
        &self,
        submission: &NewSubmission,
        hashes: &PhotoHashes,
        assessment: &RiskAssessment,
    ) -> Result<SubmissionRecord, DatabaseError> {
        let tx = self.connection().unchecked_transaction()?;
        let id = insert_submission(&tx, submission, hashes)?;
        insert_assessment(&tx, id, assessment, Utc::now())?;
        tx.commit()?;

        log::info!(
            "Registered submission {} for {} (risk {} {})",
            id,
            submission.identity,
            assessment.score,
            assessment.level
        );
        self.find_by_id(id)
    }

    pub fn find_by_id(&self, id: SubmissionId) -> Result<SubmissionRecord, DatabaseError> {
        let sql = format!("{} WHERE s.id = ?1", SELECT_SUBMISSION);
        let raw = self
            .connection()
            .query_row(&sql, [id.0], RawSubmission::from_row)
            .optional()?
            .ok_or_else(|| DatabaseError::NotFound {
                what: format!("submission {}", id),
            })?;
        raw.into_record()
    }

    pub fn list(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, DatabaseError> {
        let sql = format!(
            "{} WHERE (?1 IS NULL OR a.risk_level = ?1)
                 AND (?2 IS NULL OR s.review_status = ?2)
                 AND (?3 IS NULL OR s.campaign = ?3)
             ORDER BY s.id",
            SELECT_SUBMISSION
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let raws = stmt
            .query_map(
                params![
                    filter.level.map(|l| l.as_str()),
                    filter.status.map(|s| s.as_str()),
                    filter.campaign.as_deref()
                ],
                RawSubmission::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawSubmission::into_record).collect()
    }

    /// Hash index for duplicate detection, ordered by submission id.
    pub fn prior_hashes(&self) -> Result<Vec<PriorSubmission>, DatabaseError> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, identity, photo_hash, photo_phash FROM submissions ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, identity, exact, phash)| {
                Ok(PriorSubmission {
                    id: SubmissionId(id),
                    identity: Identity::new(identity),
                    hashes: PhotoHashes {
                        exact: ContentHash::parse(&exact)?,
                        perceptual: phash.as_deref().map(PerceptualHash::parse).transpose()?,
                    },
                })
            })
            .collect()
    }

    pub fn identity_timestamps(
        &self,
        identity: &Identity,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        self.timestamps(
            "SELECT submitted_at FROM submissions
             WHERE identity = ?1 AND submitted_at >= ?2 ORDER BY submitted_at",
            identity.as_str(),
            since,
        )
    }

    pub fn campaign_timestamps(
        &self,
        campaign: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        self.timestamps(
            "SELECT submitted_at FROM submissions
             WHERE campaign = ?1 AND submitted_at >= ?2 ORDER BY submitted_at",
            campaign,
            since,
        )
    }

    fn timestamps(
        &self,
        sql: &str,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        let mut stmt = self.connection().prepare(sql)?;
        let raw = stmt
            .query_map(params![key, format_time(since)], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter().map(|value| parse_time(value)).collect()
    }

    pub fn identity_exists(&self, identity: &Identity) -> Result<bool, DatabaseError> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM submissions WHERE identity = ?1",
            [identity.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether an identity other than `excluding` registered the same phone
    /// digits. `before` limits the search to lower ids, for rescoring.
    pub fn phone_exists(
        &self,
        phone_number: &str,
        excluding: &Identity,
        before: Option<SubmissionId>,
    ) -> Result<bool, DatabaseError> {
        let digits = normalize_phone(phone_number);
        if digits.is_empty() {
            return Ok(false);
        }
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM submissions
             WHERE phone_digits = ?1 AND identity != ?2 AND (?3 IS NULL OR id < ?3)",
            params![digits, excluding.as_str(), before.map(|id| id.0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// First assessment of a submission. Refuses to overwrite an existing one.
    pub fn record_assessment(
        &self,
        id: SubmissionId,
        assessment: &RiskAssessment,
    ) -> Result<(), DatabaseError> {
        if self.load_assessment(id)?.is_some() {
            return Err(DatabaseError::AlreadyAssessed { id });
        }
        self.find_by_id(id)?;
        insert_assessment(self.connection(), id, assessment, Utc::now())
    }

    fn load_assessment(&self, id: SubmissionId) -> Result<Option<RiskAssessment>, DatabaseError> {
        let row = self
            .connection()
            .query_row(
                "SELECT risk_score, risk_level, risk_details, manual_review_required
                 FROM risk_assessments WHERE submission_id = ?1",
                [id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(score, level, details, manual_review_required)| {
            Ok(RiskAssessment {
                score: score_from_column(score)?,
                level: parse_level(&level)?,
                details: serde_json::from_str(&details)?,
                manual_review_required,
            })
        })
        .transpose()
    }

    /// Replace an assessment on explicit admin request, leaving an audit row.
    pub fn reassess(
        &self,
        id: SubmissionId,
        assessment: &RiskAssessment,
        reason: &str,
    ) -> Result<Reassessment, DatabaseError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DatabaseError::InvalidValue(
                "a re-assessment needs a reason".to_string(),
            ));
        }
        let previous = self
            .load_assessment(id)?
            .ok_or(DatabaseError::NotAssessed { id })?;

        let now = Utc::now();
        let audit = Reassessment {
            submission_id: id,
            previous_score: previous.score,
            previous_level: previous.level,
            new_score: assessment.score,
            new_level: assessment.level,
            reason: reason.to_string(),
            reassessed_at: now,
        };

        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO reassessments (submission_id, previous_score, previous_level,
                new_score, new_level, reason, reassessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.0,
                audit.previous_score,
                audit.previous_level.as_str(),
                audit.new_score,
                audit.new_level.as_str(),
                audit.reason,
                format_time(now)
            ],
        )?;
        tx.execute(
            "UPDATE risk_assessments
             SET risk_score = ?2, risk_level = ?3, risk_details = ?4,
                 manual_review_required = ?5, assessed_at = ?6
             WHERE submission_id = ?1",
            params![
                id.0,
                assessment.score,
                assessment.level.as_str(),
                serde_json::to_string(&assessment.details)?,
                assessment.manual_review_required,
                format_time(now)
            ],
        )?;
        tx.commit()?;

        log::info!(
            "Re-assessed submission {}: {} {} -> {} {} ({})",
            id,
            audit.previous_score,
            audit.previous_level,
            audit.new_score,
            audit.new_level,
            audit.reason
        );
        Ok(audit)
    }

    pub fn reassessments(&self, id: SubmissionId) -> Result<Vec<Reassessment>, DatabaseError> {
        let mut stmt = self.connection().prepare(
            "SELECT previous_score, previous_level, new_score, new_level, reason, reassessed_at
             FROM reassessments WHERE submission_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([id.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(prev_score, prev_level, new_score, new_level, reason, at)| {
                Ok(Reassessment {
                    submission_id: id,
                    previous_score: score_from_column(prev_score)?,
                    previous_level: parse_level(&prev_level)?,
                    new_score: score_from_column(new_score)?,
                    new_level: parse_level(&new_level)?,
                    reason,
                    reassessed_at: parse_time(&at)?,
                })
            })
            .collect()
    }

    /// Admin review decision. Approval requires a stored assessment.
    pub fn set_review(
        &self,
        id: SubmissionId,
        status: ReviewStatus,
        note: Option<&str>,
    ) -> Result<SubmissionRecord, DatabaseError> {
        let record = self.find_by_id(id)?;
        if status == ReviewStatus::Approved && record.assessment.is_none() {
            return Err(DatabaseError::NotAssessed { id });
        }

        self.connection().execute(
            "UPDATE submissions SET review_status = ?2, review_note = ?3, reviewed_at = ?4
             WHERE id = ?1",
            params![id.0, status.as_str(), note, format_time(Utc::now())],
        )?;
        log::info!("Submission {} marked {}", id, status);
        self.find_by_id(id)
    }

    /// Approved, assessed submissions in canonical (id) order.
    pub fn eligible_entries(&self, campaign: Option<&str>) -> Result<Vec<EligibleEntry>, DatabaseError> {
        let mut stmt = self.connection().prepare(
            "SELECT s.id, s.identity FROM submissions s
             JOIN risk_assessments a ON a.submission_id = s.id
             WHERE s.review_status = 'approved'
               AND (?1 IS NULL OR s.campaign = ?1)
             ORDER BY s.id",
        )?;
        let entries = stmt
            .query_map([campaign], |row| {
                Ok(EligibleEntry {
                    id: SubmissionId(row.get(0)?),
                    identity: Identity::new(row.get::<_, String>(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn stats(&self) -> Result<SubmissionStats, DatabaseError> {
        let conn = self.connection();
        let mut stats = SubmissionStats {
            total: conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?,
            unassessed: conn.query_row(
                "SELECT COUNT(*) FROM submissions s
                 LEFT JOIN risk_assessments a ON a.submission_id = s.id
                 WHERE a.submission_id IS NULL",
                [],
                |row| row.get(0),
            )?,
            manual_review: conn.query_row(
                "SELECT COUNT(*) FROM risk_assessments WHERE manual_review_required = 1",
                [],
                |row| row.get(0),
            )?,
            winners: conn.query_row(
                "SELECT COUNT(*) FROM submissions WHERE is_winner = 1",
                [],
                |row| row.get(0),
            )?,
            ..SubmissionStats::default()
        };

        let mut stmt =
            conn.prepare("SELECT risk_level, COUNT(*) FROM risk_assessments GROUP BY risk_level")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (level, count) = row?;
            stats.by_level.insert(level, count);
        }

        let mut stmt =
            conn.prepare("SELECT review_status, COUNT(*) FROM submissions GROUP BY review_status")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (status, count) = row?;
            stats.by_status.insert(status, count);
        }

        Ok(stats)
    }
}

fn insert_submission(
    conn: &Connection,
    submission: &NewSubmission,
    hashes: &PhotoHashes,
) -> Result<SubmissionId, DatabaseError> {
    conn.execute(
        "INSERT INTO submissions (identity, name, phone_number, phone_digits, username, campaign,
            photo_path, photo_hash, photo_phash, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            submission.identity.as_str(),
            submission.name,
            submission.phone_number,
            normalize_phone(&submission.phone_number),
            submission.username,
            submission.campaign,
            submission.photo_path,
            hashes.exact.as_str(),
            hashes.perceptual.as_ref().map(|p| p.to_hex()),
            format_time(submission.submitted_at)
        ],
    )?;
    Ok(SubmissionId(conn.last_insert_rowid()))
}

fn insert_assessment(
    conn: &Connection,
    id: SubmissionId,
    assessment: &RiskAssessment,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO risk_assessments (submission_id, risk_score, risk_level, risk_details,
            manual_review_required, assessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.0,
            assessment.score,
            assessment.level.as_str(),
            serde_json::to_string(&assessment.details)?,
            assessment.manual_review_required,
            format_time(at)
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::hash::compute_content_hash;
    use crate::core::scoring::SignalKind;
    use chrono::{Duration, TimeZone};

    pub(crate) fn new_submission(identity: &str, minutes: i64) -> NewSubmission {
        NewSubmission {
            identity: Identity::new(identity),
            name: "Alexey".to_string(),
            phone_number: "+375339015915".to_string(),
            username: Some("alex".to_string()),
            campaign: "smile_500".to_string(),
            photo_path: format!("photos/{identity}.jpg"),
            submitted_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    pub(crate) fn hashes(seed: &str) -> PhotoHashes {
        PhotoHashes {
            exact: compute_content_hash(seed.as_bytes()),
            perceptual: Some(PerceptualHash::parse("0f0f0f0f0f0f0f0f").unwrap()),
        }
    }

    pub(crate) fn low_risk() -> RiskAssessment {
        RiskAssessment {
            score: 0,
            level: RiskLevel::Low,
            details: vec![],
            manual_review_required: false,
        }
    }

    fn high_risk() -> RiskAssessment {
        RiskAssessment {
            score: 80,
            level: RiskLevel::High,
            details: vec![RiskDetail {
                signal: SignalKind::DuplicateExact,
                points: 80,
                note: "same photo as #1 (100)".to_string(),
            }],
            manual_review_required: false,
        }
    }

    #[test]
    fn test_register_and_find() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);

        let record = repo
            .register(&new_submission("100", 0), &hashes("a"), &high_risk())
            .unwrap();
        assert_eq!(record.id, SubmissionId(1));
        assert_eq!(record.review_status, ReviewStatus::Pending);
        assert_eq!(record.hashes, hashes("a"));
        let stored = record.assessment.unwrap();
        assert_eq!(stored.assessment, high_risk());
    }

    #[test]
    fn test_missing_submission() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        assert!(matches!(
            repo.find_by_id(SubmissionId(42)),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_assessment_is_recorded_once() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        let id = repo.create(&new_submission("100", 0), &hashes("a")).unwrap();

        repo.record_assessment(id, &low_risk()).unwrap();
        assert!(matches!(
            repo.record_assessment(id, &high_risk()),
            Err(DatabaseError::AlreadyAssessed { .. })
        ));
        assert_eq!(repo.find_by_id(id).unwrap().assessment.unwrap().assessment, low_risk());
    }

    #[test]
    fn test_reassess_leaves_audit_trail() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        let id = repo
            .register(&new_submission("100", 0), &hashes("a"), &low_risk())
            .unwrap()
            .id;

        assert!(matches!(
            repo.reassess(id, &high_risk(), "  "),
            Err(DatabaseError::InvalidValue(_))
        ));

        let audit = repo.reassess(id, &high_risk(), "policy retuned").unwrap();
        assert_eq!(audit.previous_level, RiskLevel::Low);
        assert_eq!(audit.new_level, RiskLevel::High);

        let current = repo.find_by_id(id).unwrap().assessment.unwrap().assessment;
        assert_eq!(current, high_risk());
        let trail = repo.reassessments(id).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].reason, "policy retuned");
    }

    #[test]
    fn test_reassess_requires_existing_assessment() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        let id = repo.create(&new_submission("100", 0), &hashes("a")).unwrap();
        assert!(matches!(
            repo.reassess(id, &low_risk(), "why not"),
            Err(DatabaseError::NotAssessed { .. })
        ));
    }

    #[test]
    fn test_approval_requires_assessment() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        let id = repo.create(&new_submission("100", 0), &hashes("a")).unwrap();

        assert!(matches!(
            repo.set_review(id, ReviewStatus::Approved, None),
            Err(DatabaseError::NotAssessed { .. })
        ));
        // Blocking does not need one
        let blocked = repo.set_review(id, ReviewStatus::Blocked, Some("spam")).unwrap();
        assert_eq!(blocked.review_status, ReviewStatus::Blocked);
        assert_eq!(blocked.review_note.as_deref(), Some("spam"));
        assert!(blocked.reviewed_at.is_some());
    }

    #[test]
    fn test_eligible_entries_are_approved_and_ordered() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        for i in 0..4 {
            let id = repo
                .register(&new_submission(&format!("{}", 100 + i), i), &hashes(&i.to_string()), &low_risk())
                .unwrap()
                .id;
            if i != 2 {
                repo.set_review(id, ReviewStatus::Approved, None).unwrap();
            }
        }
        let mut other = new_submission("999", 10);
        other.campaign = "sub_1500".to_string();
        let other_id = repo.register(&other, &hashes("x"), &low_risk()).unwrap().id;
        repo.set_review(other_id, ReviewStatus::Approved, None).unwrap();

        let ids: Vec<i64> = repo
            .eligible_entries(Some("smile_500"))
            .unwrap()
            .iter()
            .map(|e| e.id.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(repo.eligible_entries(None).unwrap().len(), 4);
    }

    #[test]
    fn test_prior_hashes_and_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        repo.register(&new_submission("100", 0), &hashes("a"), &low_risk()).unwrap();
        repo.register(&new_submission("100", 5), &hashes("b"), &low_risk()).unwrap();
        repo.register(&new_submission("200", 6), &hashes("c"), &low_risk()).unwrap();

        let prior = repo.prior_hashes().unwrap();
        assert_eq!(prior.len(), 3);
        assert_eq!(prior[0].id, SubmissionId(1));
        assert_eq!(prior[2].identity, Identity::new("200"));

        let since = new_submission("x", 1).submitted_at;
        assert_eq!(repo.identity_timestamps(&Identity::new("100"), since).unwrap().len(), 1);
        assert_eq!(repo.campaign_timestamps("smile_500", since).unwrap().len(), 2);
        assert!(repo.identity_exists(&Identity::new("200")).unwrap());
        assert!(!repo.identity_exists(&Identity::new("300")).unwrap());
    }

    #[test]
    fn test_phone_exists_matches_digits_of_other_identities() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        let mut first = new_submission("100", 0);
        first.phone_number = "+375 (33) 901-59-15".to_string();
        let first = repo.register(&first, &hashes("a"), &low_risk()).unwrap();
        repo.register(&new_submission("200", 1), &hashes("b"), &low_risk()).unwrap();

        let phone = "375339015915";
        assert!(repo.phone_exists(phone, &Identity::new("300"), None).unwrap());
        assert!(repo.phone_exists(phone, &Identity::new("100"), None).unwrap());
        // Only "100" registered before id 2, and it is excluded
        assert!(!repo
            .phone_exists(phone, &Identity::new("100"), Some(SubmissionId(2)))
            .unwrap());
        assert!(!repo
            .phone_exists(phone, &Identity::new("300"), Some(first.id))
            .unwrap());
        assert!(!repo.phone_exists("+1 555 0100", &Identity::new("300"), None).unwrap());
        assert!(!repo.phone_exists("n/a", &Identity::new("300"), None).unwrap());
    }

    #[test]
    fn test_list_filters_and_stats() {
        let db = Database::open_in_memory().unwrap();
        let repo = SubmissionRepository::new(&db);
        repo.register(&new_submission("100", 0), &hashes("a"), &low_risk()).unwrap();
        repo.register(&new_submission("200", 1), &hashes("a"), &high_risk()).unwrap();
        repo.create(&new_submission("300", 2), &hashes("c")).unwrap();

        let high = repo
            .list(&SubmissionFilter {
                level: Some(RiskLevel::High),
                ..SubmissionFilter::default()
            })
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].identity, Identity::new("200"));
        assert_eq!(repo.list(&SubmissionFilter::default()).unwrap().len(), 3);

        let stats = repo.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unassessed, 1);
        assert_eq!(stats.by_level.get("high"), Some(&1));
        assert_eq!(stats.by_status.get("pending"), Some(&3));
    }
}
