//! Fixed day sequence used for lesson completion.

use super::IntervalTable;
use crate::types::Difficulty;

const DAY: i64 = 24 * 60;

/// Lesson intervals in days.
pub const LESSON_INTERVAL_DAYS: [i64; 7] = [1, 3, 7, 14, 30, 60, 90];

const LESSON_INTERVAL_MINUTES: [i64; 7] = [
    LESSON_INTERVAL_DAYS[0] * DAY,
    LESSON_INTERVAL_DAYS[1] * DAY,
    LESSON_INTERVAL_DAYS[2] * DAY,
    LESSON_INTERVAL_DAYS[3] * DAY,
    LESSON_INTERVAL_DAYS[4] * DAY,
    LESSON_INTERVAL_DAYS[5] * DAY,
    LESSON_INTERVAL_DAYS[6] * DAY,
];

/// One sequence for every category.
#[derive(Debug, Clone, Copy, Default)]
pub struct LessonIntervals;

impl IntervalTable for LessonIntervals {
    fn name(&self) -> &'static str {
        "lesson"
    }

    fn sequence_minutes(&self, _category: Difficulty) -> &'static [i64] {
        &LESSON_INTERVAL_MINUTES
    }

    fn category_sensitive(&self) -> bool {
        false
    }
}
