//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for the local SQLite database.
pub const SCHEMA: &str = r#"
-- Scheduling state per item (no identity column: owned by the device)
CREATE TABLE IF NOT EXISTS schedule_entries (
    item_key TEXT PRIMARY KEY,
    category INTEGER NOT NULL DEFAULT 0,
    repetition_count INTEGER NOT NULL DEFAULT 0,
    last_reviewed_at TEXT,
    next_review_at TEXT
);

-- Append-only category history
CREATE TABLE IF NOT EXISTS history_records (
    id TEXT PRIMARY KEY,
    item_key TEXT NOT NULL,
    old_category INTEGER,
    new_category INTEGER NOT NULL,
    changed_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_schedule_entries_next ON schedule_entries(next_review_at);
CREATE INDEX IF NOT EXISTS idx_history_records_item ON history_records(item_key);
CREATE INDEX IF NOT EXISTS idx_history_records_synced ON history_records(synced);
"#;
