//! Core types for review scheduling.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScheduleError};

/// Kind of studied item, encoded as a key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Lesson,
    Word,
}

impl ItemKind {
    /// Namespace prefix carried by every key of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Lesson => "lesson:",
            Self::Word => "word:",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Word => "word",
        }
    }
}

/// Opaque identifier of a studied item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Wrap a raw key as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key for a lesson, e.g. "lesson:french/greetings".
    pub fn lesson(path: &str) -> Self {
        Self(format!(
            "{}{}",
            ItemKind::Lesson.prefix(),
            path.trim().trim_matches('/')
        ))
    }

    /// Key for a vocabulary word, normalized to trimmed lowercase.
    pub fn word(word: &str) -> Self {
        Self(format!(
            "{}{}",
            ItemKind::Word.prefix(),
            word.trim().to_lowercase()
        ))
    }

    /// Kind resolved from the prefix. Unprefixed keys count as words.
    pub fn kind(&self) -> ItemKind {
        if self.0.starts_with(ItemKind::Lesson.prefix()) {
            ItemKind::Lesson
        } else {
            ItemKind::Word
        }
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Difficulty rating selecting the interval sequence of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    NotRated,
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::NotRated
    }
}

impl Difficulty {
    /// Stored integer value (0-3).
    pub fn to_value(self) -> u8 {
        match self {
            Self::NotRated => 0,
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }

    /// Create from stored integer value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::NotRated),
            1 => Some(Self::Easy),
            2 => Some(Self::Medium),
            3 => Some(Self::Hard),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRated => "not_rated",
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = ScheduleError;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_value(value).ok_or(ScheduleError::InvalidCategory(value))
    }
}

/// Convert a stored repetition counter, rejecting negatives.
pub fn repetition_count_from(raw: i64) -> Result<u32> {
    if raw < 0 {
        return Err(ScheduleError::NegativeRepetitionCount(raw));
    }
    Ok(u32::try_from(raw).unwrap_or(u32::MAX))
}

/// Scheduling state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub item_key: ItemKey,
    pub category: Difficulty,
    pub repetition_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_review_at: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    /// Entry that has never been reviewed.
    pub fn new(item_key: ItemKey, category: Difficulty) -> Self {
        Self {
            item_key,
            category,
            repetition_count: 0,
            last_reviewed_at: None,
            next_review_at: None,
        }
    }

    /// Due at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|next| next <= now)
    }

    /// Due strictly after `now` and no later than `until`.
    pub fn is_due_between(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.next_review_at
            .is_some_and(|next| next > now && next <= until)
    }

    /// Check `next_review_at >= last_reviewed_at` and that a reviewed
    /// entry always has a next review.
    pub fn validate(&self) -> Result<()> {
        match (self.last_reviewed_at, self.next_review_at) {
            (Some(last), Some(next)) if next < last => {
                Err(ScheduleError::InconsistentSchedule(self.item_key.to_string()))
            }
            (Some(_), None) => Err(ScheduleError::InconsistentSchedule(
                self.item_key.to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Append-only record of a category change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub item_key: ItemKey,
    #[serde(default)]
    pub old_category: Option<Difficulty>,
    pub new_category: Difficulty,
    pub changed_at: DateTime<Utc>,
}

/// `at` truncated to the microsecond precision both stores keep, so a
/// local copy compares equal to the same entry read back from the server.
pub fn stored_instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

impl HistoryRecord {
    pub fn new(
        item_key: ItemKey,
        old_category: Option<Difficulty>,
        new_category: Difficulty,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_key,
            old_category,
            new_category,
            changed_at: stored_instant(changed_at),
        }
    }
}
