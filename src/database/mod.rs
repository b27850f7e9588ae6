pub mod models;
pub mod repositories;
pub mod schema;

use crate::core::hash::HashError;
use crate::core::randomizer::DrawError;
use crate::core::submission::SubmissionId;
use crate::core::validation::normalize_phone;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored hash is invalid: {0}")]
    Hash(#[from] HashError),

    #[error("Draw error: {0}")]
    Draw(#[from] DrawError),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Submission {id} has no risk assessment")]
    NotAssessed { id: SubmissionId },

    #[error("Submission {id} is already assessed; use an explicit re-assessment")]
    AlreadyAssessed { id: SubmissionId },

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Single SQLite connection holding submissions, assessments and draws.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > schema::SCHEMA_VERSION {
        return Err(DatabaseError::Migration(format!(
            "Database version {} is newer than supported {}",
            current,
            schema::SCHEMA_VERSION
        )));
    }

    if current < 1 {
        log::info!("Initializing database schema v1");
        conn.execute_batch(schema::SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if current < 2 {
        log::info!("Migrating database schema to v2");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(schema::SCHEMA_V2)?;
        backfill_phone_digits(&tx)?;
        tx.pragma_update(None, "user_version", 2)?;
        tx.commit()?;
    }

    Ok(())
}

fn backfill_phone_digits(conn: &Connection) -> Result<(), DatabaseError> {
    let rows = {
        let mut stmt = conn.prepare("SELECT id, phone_number FROM submissions")?;
        stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };
    let mut update = conn.prepare("UPDATE submissions SET phone_digits = ?1 WHERE id = ?2")?;
    for (id, phone_number) in &rows {
        update.execute(rusqlite::params![normalize_phone(phone_number), id])?;
    }
    if !rows.is_empty() {
        log::info!("Backfilled phone digits for {} submissions", rows.len());
    }
    Ok(())
}

/// Fixed-width UTC timestamps so that string order is time order.
pub(crate) fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidValue(format!("timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_database_connection() {
        let temp_dir = tempdir().unwrap();
        let db = Database::open(&temp_dir.path().join("test.db")).unwrap();

        let result: i32 = db
            .connection()
            .query_row("SELECT 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(result, 1);
    }

    #[test]
    fn test_schema_version_is_set() {
        let db = Database::open_in_memory().unwrap();
        let version: u32 = db
            .connection()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_v1_database_is_migrated_with_phone_digits() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("v1.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(schema::SCHEMA_V1).unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
            conn.execute(
                "INSERT INTO submissions (identity, name, phone_number, campaign,
                    photo_path, photo_hash, submitted_at)
                 VALUES ('1', 'Alexey', '+375 (33) 901-59-15', 'smile_500', 'p.jpg', 'h', 'now')",
                [],
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let digits: String = db
            .connection()
            .query_row("SELECT phone_digits FROM submissions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(digits, "375339015915");
        let version: u32 = db
            .connection()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_newer_database_is_refused() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION + 1)
                .unwrap();
        }
        assert!(matches!(
            Database::open(&path),
            Err(DatabaseError::Migration(_))
        ));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("test.db");
        {
            let db = Database::open(&path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO submissions (identity, name, phone_number, campaign,
                        photo_path, photo_hash, submitted_at)
                     VALUES ('1', 'Alexey', '+375339015915', 'smile_500', 'p.jpg', 'h', 'now')",
                    [],
                )
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_time_format_sorts_lexicographically() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(format_time(early) < format_time(late));
        assert_eq!(parse_time(&format_time(late)).unwrap(), late);
    }
}
