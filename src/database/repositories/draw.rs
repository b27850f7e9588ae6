use super::Repository;
use crate::core::randomizer::{EligibleEntry, SeedMaterial, SeedSource, WinnerSelection};
use crate::database::models::DrawRecord;
use crate::database::{format_time, parse_time, Database, DatabaseError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const SELECT_DRAW: &str = "
    SELECT id, campaign, seed_source, seed_value, digest, eligible_count, winner_index,
           entries, drawn_at
    FROM draws";

struct RawDraw {
    id: String,
    campaign: Option<String>,
    seed_source: String,
    seed_value: String,
    digest: String,
    eligible_count: i64,
    winner_index: i64,
    entries: String,
    drawn_at: String,
}

impl RawDraw {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            campaign: row.get(1)?,
            seed_source: row.get(2)?,
            seed_value: row.get(3)?,
            digest: row.get(4)?,
            eligible_count: row.get(5)?,
            winner_index: row.get(6)?,
            entries: row.get(7)?,
            drawn_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<DrawRecord, DatabaseError> {
        let source = match self.seed_source.as_str() {
            "block-hash" => SeedSource::BlockHash,
            "timestamp" => SeedSource::Timestamp,
            "nonce" => SeedSource::Nonce,
            other => {
                return Err(DatabaseError::InvalidValue(format!("seed source '{}'", other)));
            }
        };
        let entries: Vec<EligibleEntry> = serde_json::from_str(&self.entries)?;
        let index = usize::try_from(self.winner_index)
            .ok()
            .filter(|index| *index < entries.len())
            .ok_or_else(|| DatabaseError::InvalidValue(format!("winner index {}", self.winner_index)))?;
        let eligible_count = usize::try_from(self.eligible_count)
            .map_err(|_| DatabaseError::InvalidValue(format!("eligible count {}", self.eligible_count)))?;

        Ok(DrawRecord {
            id: self.id,
            campaign: self.campaign,
            selection: WinnerSelection {
                seed: SeedMaterial {
                    source,
                    value: self.seed_value,
                },
                digest: self.digest,
                eligible_count,
                index,
                winner: entries[index].clone(),
                entries,
            },
            drawn_at: parse_time(&self.drawn_at)?,
        })
    }
}

pub struct DrawRepository<'a> {
    db: &'a Database,
}

impl Repository for DrawRepository<'_> {
    fn database(&self) -> &Database {
        self.db
    }
}

impl<'a> DrawRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a draw with its full eligible list and flag the winner.
    pub fn record(
        &self,
        campaign: Option<&str>,
        selection: &WinnerSelection,
    ) -> Result<DrawRecord, DatabaseError> {
        let id = format!("drw_{}", Uuid::new_v4().simple());
        let drawn_at = Utc::now();

        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO draws (id, campaign, seed_source, seed_value, digest, eligible_count,
                winner_index, winner_id, entries, drawn_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                campaign,
                selection.seed.source.as_str(),
                selection.seed.value,
                selection.digest,
                selection.eligible_count as i64,
                selection.index as i64,
                selection.winner.id.0,
                serde_json::to_string(&selection.entries)?,
                format_time(drawn_at)
            ],
        )?;
        let updated = tx.execute(
            "UPDATE submissions SET is_winner = 1 WHERE id = ?1",
            [selection.winner.id.0],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                what: format!("submission {}", selection.winner.id),
            });
        }
        tx.commit()?;

        log::info!(
            "Recorded draw {}: winner {} ({} of {} entries)",
            id,
            selection.winner.id,
            selection.index,
            selection.eligible_count
        );
        self.find_by_id(&id)
    }

    pub fn find_by_id(&self, id: &str) -> Result<DrawRecord, DatabaseError> {
        let sql = format!("{} WHERE id = ?1", SELECT_DRAW);
        self.connection()
            .query_row(&sql, [id], RawDraw::from_row)
            .optional()?
            .ok_or_else(|| DatabaseError::NotFound {
                what: format!("draw {}", id),
            })?
            .into_record()
    }

    /// All draws, newest first.
    pub fn list(&self) -> Result<Vec<DrawRecord>, DatabaseError> {
        let sql = format!("{} ORDER BY drawn_at DESC, id", SELECT_DRAW);
        let mut stmt = self.connection().prepare(&sql)?;
        let raws = stmt
            .query_map([], RawDraw::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawDraw::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::randomizer::{select_winner, verify_selection};
    use crate::database::models::ReviewStatus;
    use crate::database::repositories::submission::tests::{hashes, low_risk, new_submission};
    use crate::database::repositories::SubmissionRepository;

    fn seeded(db: &Database, count: i64) -> Vec<EligibleEntry> {
        let submissions = SubmissionRepository::new(db);
        for i in 0..count {
            let id = submissions
                .register(
                    &new_submission(&format!("{}", 100 + i), i),
                    &hashes(&i.to_string()),
                    &low_risk(),
                )
                .unwrap()
                .id;
            submissions.set_review(id, ReviewStatus::Approved, None).unwrap();
        }
        submissions.eligible_entries(None).unwrap()
    }

    #[test]
    fn test_record_and_reload_draw() {
        let db = Database::open_in_memory().unwrap();
        let entries = seeded(&db, 5);
        let selection = select_winner(&entries, &SeedMaterial::nonce("spring-final")).unwrap();

        let draws = DrawRepository::new(&db);
        let record = draws.record(Some("smile_500"), &selection).unwrap();
        assert!(record.id.starts_with("drw_"));
        assert_eq!(record.selection, selection);
        assert_eq!(record.campaign.as_deref(), Some("smile_500"));

        let reloaded = draws.find_by_id(&record.id).unwrap();
        assert!(verify_selection(&reloaded.selection.entries, &reloaded.selection));
        assert_eq!(draws.list().unwrap().len(), 1);

        let winner = SubmissionRepository::new(&db)
            .find_by_id(selection.winner.id)
            .unwrap();
        assert!(winner.is_winner);
    }

    #[test]
    fn test_unknown_draw() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            DrawRepository::new(&db).find_by_id("drw_missing"),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
