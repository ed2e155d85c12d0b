//! Difficulty-sensitive sequences used for vocabulary words.
//!
//! Unrated and hard words come back quickly; easy words are spaced out
//! over months.

use super::IntervalTable;
use crate::types::Difficulty;

const HOUR: i64 = 60;
const DAY: i64 = 24 * HOUR;

const NOT_RATED: [i64; 6] = [HOUR, 4 * HOUR, 12 * HOUR, DAY, 3 * DAY, 7 * DAY];
const HARD: [i64; 6] = [4 * HOUR, 12 * HOUR, DAY, 3 * DAY, 7 * DAY, 14 * DAY];
const MEDIUM: [i64; 6] = [DAY, 3 * DAY, 7 * DAY, 14 * DAY, 30 * DAY, 60 * DAY];
const EASY: [i64; 6] = [3 * DAY, 7 * DAY, 14 * DAY, 30 * DAY, 90 * DAY, 180 * DAY];

#[derive(Debug, Clone, Copy, Default)]
pub struct WordIntervals;

impl IntervalTable for WordIntervals {
    fn name(&self) -> &'static str {
        "word"
    }

    fn sequence_minutes(&self, category: Difficulty) -> &'static [i64] {
        match category {
            Difficulty::NotRated => &NOT_RATED,
            Difficulty::Hard => &HARD,
            Difficulty::Medium => &MEDIUM,
            Difficulty::Easy => &EASY,
        }
    }

    fn category_sensitive(&self) -> bool {
        true
    }
}
