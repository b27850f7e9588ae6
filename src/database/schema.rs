/// Schema version stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 2;

pub const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    name TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    username TEXT,
    campaign TEXT NOT NULL,
    photo_path TEXT NOT NULL,
    photo_hash TEXT NOT NULL,
    photo_phash TEXT,
    submitted_at TEXT NOT NULL,
    review_status TEXT NOT NULL DEFAULT 'pending',
    review_note TEXT,
    reviewed_at TEXT,
    is_winner INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_submissions_identity ON submissions(identity, submitted_at);
CREATE INDEX IF NOT EXISTS idx_submissions_photo_hash ON submissions(photo_hash);
CREATE INDEX IF NOT EXISTS idx_submissions_campaign ON submissions(campaign, submitted_at);

CREATE TABLE IF NOT EXISTS risk_assessments (
    submission_id INTEGER PRIMARY KEY REFERENCES submissions(id) ON DELETE CASCADE,
    risk_score INTEGER NOT NULL,
    risk_level TEXT NOT NULL,
    risk_details TEXT NOT NULL,
    manual_review_required INTEGER NOT NULL,
    assessed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reassessments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    previous_score INTEGER NOT NULL,
    previous_level TEXT NOT NULL,
    new_score INTEGER NOT NULL,
    new_level TEXT NOT NULL,
    reason TEXT NOT NULL,
    reassessed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS draws (
    id TEXT PRIMARY KEY,
    campaign TEXT,
    seed_source TEXT NOT NULL,
    seed_value TEXT NOT NULL,
    digest TEXT NOT NULL,
    eligible_count INTEGER NOT NULL,
    winner_index INTEGER NOT NULL,
    winner_id INTEGER NOT NULL REFERENCES submissions(id),
    entries TEXT NOT NULL,
    drawn_at TEXT NOT NULL
);
";

/// Normalised phone digits for cross-identity phone matching. Existing rows
/// are backfilled by the migration code.
pub const SCHEMA_V2: &str = "
ALTER TABLE submissions ADD COLUMN phone_digits TEXT;

CREATE INDEX IF NOT EXISTS idx_submissions_phone_digits ON submissions(phone_digits);
";
