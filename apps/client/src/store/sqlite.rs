//! SQLite implementation of the local store.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use review_core::types::repetition_count_from;
use review_core::{Difficulty, HistoryRecord, ItemKey, ScheduleEntry};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use super::error::StoreError;
use super::schema::{SCHEMA, SCHEMA_VERSION};
use super::{HistoryRepository, Result, ScheduleRepository};

/// Device-local store backed by SQLite.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Open database at path. A file that cannot be initialized is moved
    /// aside and replaced by an empty database.
    pub fn open_or_recreate<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(err) if path.exists() => {
                let aside = path.with_extension("corrupt");
                warn!(
                    path = %path.display(),
                    error = %err,
                    "local store unreadable, starting fresh"
                );
                std::fs::rename(path, &aside)?;
                Self::open(path)
            }
            Err(err) => Err(err),
        }
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn prefix_clause(prefix: Option<&str>) -> &'static str {
        match prefix {
            Some(_) => "WHERE substr(item_key, 1, length(?1)) = ?1",
            None => "",
        }
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad instant {value:?}: {e}")))
}

fn parse_optional_instant(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_instant).transpose()
}

/// Raw row as stored, before validation.
struct EntryRow {
    item_key: String,
    category: i64,
    repetition_count: i64,
    last_reviewed_at: Option<String>,
    next_review_at: Option<String>,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            item_key: row.get(0)?,
            category: row.get(1)?,
            repetition_count: row.get(2)?,
            last_reviewed_at: row.get(3)?,
            next_review_at: row.get(4)?,
        })
    }

    fn into_entry(self) -> Result<ScheduleEntry> {
        let repetition_count = repetition_count_from(self.repetition_count)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let entry = ScheduleEntry {
            item_key: ItemKey::new(self.item_key),
            category: Difficulty::from_value(self.category).unwrap_or_default(),
            repetition_count,
            last_reviewed_at: parse_optional_instant(self.last_reviewed_at)?,
            next_review_at: parse_optional_instant(self.next_review_at)?,
        };
        entry
            .validate()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        Ok(entry)
    }
}

struct HistoryRow {
    id: String,
    item_key: String,
    old_category: Option<i64>,
    new_category: i64,
    changed_at: String,
}

impl HistoryRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_key: row.get(1)?,
            old_category: row.get(2)?,
            new_category: row.get(3)?,
            changed_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<HistoryRecord> {
        Ok(HistoryRecord {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StoreError::InvalidData(format!("bad history id: {e}")))?,
            item_key: ItemKey::new(self.item_key),
            old_category: self
                .old_category
                .map(|v| Difficulty::from_value(v).unwrap_or_default()),
            new_category: Difficulty::from_value(self.new_category).unwrap_or_default(),
            changed_at: parse_instant(&self.changed_at)?,
        })
    }

    fn into_valid_record(self) -> Option<HistoryRecord> {
        let id = self.id.clone();
        match self.into_record() {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(id = %id, error = %err, "ignoring malformed history row");
                None
            }
        }
    }
}

impl ScheduleRepository for SqliteStore {
    fn get_entry(&self, key: &ItemKey) -> Result<Option<ScheduleEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT item_key, category, repetition_count, last_reviewed_at, next_review_at
                 FROM schedule_entries WHERE item_key = ?1",
                params![key.as_str()],
                EntryRow::from_row,
            )
            .optional()?;

        match row.map(EntryRow::into_entry) {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(err)) => {
                warn!(item_key = %key, error = %err, "ignoring malformed schedule row");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn upsert_entry(&self, entry: &ScheduleEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO schedule_entries
                (item_key, category, repetition_count, last_reviewed_at, next_review_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.item_key.as_str(),
                entry.category.to_value(),
                entry.repetition_count,
                entry.last_reviewed_at.map(format_instant),
                entry.next_review_at.map(format_instant),
            ],
        )?;
        Ok(())
    }

    fn upsert_entries(&self, entries: &[ScheduleEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for entry in entries {
            self.upsert_entry(entry)?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    fn list_entries(&self) -> Result<Vec<ScheduleEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_key, category, repetition_count, last_reviewed_at, next_review_at
             FROM schedule_entries ORDER BY item_key",
        )?;

        let rows = stmt
            .query_map([], EntryRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let item_key = row.item_key.clone();
            match row.into_entry() {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(%item_key, error = %err, "ignoring malformed schedule row"),
            }
        }
        Ok(entries)
    }

    fn delete_entry(&self, key: &ItemKey) -> Result<bool> {
        let count = self.conn.execute(
            "DELETE FROM schedule_entries WHERE item_key = ?1",
            params![key.as_str()],
        )?;
        Ok(count > 0)
    }

    fn delete_entries(&self, prefix: Option<&str>) -> Result<usize> {
        let sql = format!(
            "DELETE FROM schedule_entries {}",
            Self::prefix_clause(prefix)
        );
        let count = match prefix {
            Some(p) => self.conn.execute(&sql, params![p])?,
            None => self.conn.execute(&sql, [])?,
        };
        Ok(count)
    }
}

impl HistoryRepository for SqliteStore {
    fn append_history(&self, record: &HistoryRecord, synced: bool) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO history_records
                (id, item_key, old_category, new_category, changed_at, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.item_key.as_str(),
                record.old_category.map(Difficulty::to_value),
                record.new_category.to_value(),
                format_instant(record.changed_at),
                synced,
            ],
        )?;
        Ok(())
    }

    fn list_history(
        &self,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = match item {
            Some(key) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, item_key, old_category, new_category, changed_at
                     FROM history_records WHERE item_key = ?1
                     ORDER BY changed_at DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![key.as_str(), limit], HistoryRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, item_key, old_category, new_category, changed_at
                     FROM history_records ORDER BY changed_at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], HistoryRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(rows
            .into_iter()
            .filter_map(HistoryRow::into_valid_record)
            .collect())
    }

    fn pending_history(&self) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_key, old_category, new_category, changed_at
             FROM history_records WHERE synced = 0 ORDER BY changed_at",
        )?;
        let rows = stmt
            .query_map([], HistoryRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(HistoryRow::into_valid_record)
            .collect())
    }

    fn mark_history_synced(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE history_records SET synced = 1 WHERE id IN ({})",
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(ids.iter().map(|id| id.to_string())))?;
        Ok(())
    }

    fn clear_history(&self, prefix: Option<&str>) -> Result<usize> {
        let sql = format!(
            "DELETE FROM history_records {}",
            Self::prefix_clause(prefix)
        );
        let count = match prefix {
            Some(p) => self.conn.execute(&sql, params![p])?,
            None => self.conn.execute(&sql, [])?,
        };
        Ok(count)
    }
}
