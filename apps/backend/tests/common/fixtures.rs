//! Test fixtures and factory functions for creating test data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use review_backend::models::{Difficulty, HistoryRecord, ItemKey, ScheduleEntry};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Entry reviewed at `t0()` and due `due_in` later.
pub fn entry(key: ItemKey, category: Difficulty, repetition_count: u32, due_in: Duration) -> ScheduleEntry {
    ScheduleEntry {
        item_key: key,
        category,
        repetition_count,
        last_reviewed_at: Some(t0()),
        next_review_at: Some(t0() + due_in),
    }
}

/// Raw JSON body with `next_review_at` before `last_reviewed_at`.
pub fn inverted_entry_body(key: &str) -> Value {
    json!({
        "item_key": key,
        "category": "hard",
        "repetition_count": 1,
        "last_reviewed_at": t0(),
        "next_review_at": t0() - Duration::hours(1),
    })
}

pub fn history(key: ItemKey, old: Option<Difficulty>, new: Difficulty, minutes: i64) -> HistoryRecord {
    HistoryRecord::new(key, old, new, t0() + Duration::minutes(minutes))
}
