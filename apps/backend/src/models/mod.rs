//! Database models and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub use review_core::{
    repetition_count_from, Difficulty, HistoryRecord, ItemKey, ScheduleEntry, ScheduleError,
};

// === Database Entity Types ===

/// Session resolved from a bearer token
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub token: String,
    pub identity_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Schedule entry stored in PostgreSQL
#[derive(Debug, Clone, FromRow)]
pub struct DbScheduleEntry {
    pub identity_id: String,
    pub item_key: String,
    pub category: i16,
    pub repetition_count: i32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DbScheduleEntry {
    /// Convert to API entry type
    pub fn to_entry(&self) -> Result<ScheduleEntry, ScheduleError> {
        Ok(ScheduleEntry {
            item_key: ItemKey::new(self.item_key.clone()),
            category: Difficulty::try_from(i64::from(self.category))?,
            repetition_count: repetition_count_from(i64::from(self.repetition_count))?,
            last_reviewed_at: self.last_reviewed_at,
            next_review_at: self.next_review_at,
        })
    }
}

/// History record stored in PostgreSQL
#[derive(Debug, Clone, FromRow)]
pub struct DbHistoryRecord {
    pub id: Uuid,
    pub identity_id: String,
    pub item_key: String,
    pub old_category: Option<i16>,
    pub new_category: i16,
    pub changed_at: DateTime<Utc>,
}

impl DbHistoryRecord {
    pub fn to_record(&self) -> Result<HistoryRecord, ScheduleError> {
        Ok(HistoryRecord {
            id: self.id,
            item_key: ItemKey::new(self.item_key.clone()),
            old_category: self
                .old_category
                .map(|c| Difficulty::try_from(i64::from(c)))
                .transpose()?,
            new_category: Difficulty::try_from(i64::from(self.new_category))?,
            changed_at: self.changed_at,
        })
    }
}

// === API Request/Response Types ===

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub due_from: Option<DateTime<Utc>>,
    pub due_until: Option<DateTime<Utc>>,
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PrefixQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub item_key: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleListResponse {
    pub entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendHistoryRequest {
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendHistoryResponse {
    pub inserted_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryListResponse {
    pub records: Vec<HistoryRecord>,
}
