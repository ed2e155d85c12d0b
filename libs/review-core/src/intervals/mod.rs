//! Interval tables driving review spacing.

pub mod lesson;
pub mod word;

use chrono::{DateTime, Duration, Utc};

use crate::types::{Difficulty, ItemKind};

/// Ordered interval sequences, one per category.
pub trait IntervalTable: Send + Sync {
    /// Table identifier.
    fn name(&self) -> &'static str;

    /// Interval sequence in minutes for a category.
    fn sequence_minutes(&self, category: Difficulty) -> &'static [i64];

    /// Whether the category selects a different sequence.
    fn category_sensitive(&self) -> bool;

    /// Interval for the given repetition. Counts past the end of the
    /// sequence saturate at its last entry.
    fn interval(&self, category: Difficulty, repetition_count: u32) -> Duration {
        let sequence = self.sequence_minutes(category);
        let index = (repetition_count as usize).min(sequence.len().saturating_sub(1));
        sequence
            .get(index)
            .map(|minutes| Duration::minutes(*minutes))
            .unwrap_or_else(Duration::zero)
    }
}

static LESSON_TABLE: lesson::LessonIntervals = lesson::LessonIntervals;
static WORD_TABLE: word::WordIntervals = word::WordIntervals;

/// Table governing items of a kind.
pub fn interval_table_for(kind: ItemKind) -> &'static dyn IntervalTable {
    match kind {
        ItemKind::Lesson => &LESSON_TABLE,
        ItemKind::Word => &WORD_TABLE,
    }
}

/// Next-due instant for an item reviewed at `now`.
pub fn next_due(
    table: &dyn IntervalTable,
    category: Difficulty,
    repetition_count: u32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    now + table.interval(category, repetition_count)
}
