//! Schedule calculator: derives the next entry state for a mutation.

use chrono::{DateTime, Utc};

use crate::intervals::{interval_table_for, next_due};
use crate::types::{stored_instant, Difficulty, ItemKey, ScheduleEntry};

/// State after completing a review of `item_key` at `now`.
///
/// The prior repetition count indexes the interval sequence and is then
/// incremented. On a category-sensitive table, a category different from
/// the stored one restarts the sequence at zero.
pub fn schedule_review(
    prior: Option<&ScheduleEntry>,
    item_key: &ItemKey,
    category: Difficulty,
    now: DateTime<Utc>,
) -> ScheduleEntry {
    let now = stored_instant(now);
    let table = interval_table_for(item_key.kind());
    let repetition = match prior {
        Some(entry) if !table.category_sensitive() || entry.category == category => {
            entry.repetition_count
        }
        _ => 0,
    };

    ScheduleEntry {
        item_key: item_key.clone(),
        category,
        repetition_count: repetition.saturating_add(1),
        last_reviewed_at: Some(now),
        next_review_at: Some(next_due(table, category, repetition, now)),
    }
}

/// State after re-rating `item_key` at `now`: the sequence restarts.
pub fn schedule_restart(item_key: &ItemKey, category: Difficulty, now: DateTime<Utc>) -> ScheduleEntry {
    let now = stored_instant(now);
    let table = interval_table_for(item_key.kind());
    ScheduleEntry {
        item_key: item_key.clone(),
        category,
        repetition_count: 0,
        last_reviewed_at: Some(now),
        next_review_at: Some(next_due(table, category, 0, now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap()
    }

    #[test]
    fn instants_are_kept_to_the_microsecond() {
        let at = t0() + Duration::nanoseconds(1_234_567);
        let kept = t0() + Duration::microseconds(1_234);
        let key = ItemKey::word("pluie");

        let reviewed = schedule_review(None, &key, Difficulty::Hard, at);
        assert_eq!(reviewed.last_reviewed_at, Some(kept));
        assert_eq!(reviewed.next_review_at, Some(kept + Duration::hours(4)));

        let restarted = schedule_restart(&key, Difficulty::Easy, at);
        assert_eq!(restarted.last_reviewed_at, Some(kept));
    }

    #[test]
    fn first_lesson_review_is_due_next_day() {
        let key = ItemKey::lesson("spanish/numbers");
        let entry = schedule_review(None, &key, Difficulty::NotRated, t0());

        assert_eq!(entry.repetition_count, 1);
        assert_eq!(entry.last_reviewed_at, Some(t0()));
        assert_eq!(entry.next_review_at, Some(t0() + Duration::days(1)));
    }

    #[test]
    fn second_lesson_review_is_three_days_later() {
        let key = ItemKey::lesson("spanish/numbers");
        let first = schedule_review(None, &key, Difficulty::NotRated, t0());
        let again = t0() + Duration::days(1);
        let second = schedule_review(Some(&first), &key, Difficulty::NotRated, again);

        assert_eq!(second.repetition_count, 2);
        assert_eq!(second.next_review_at, Some(t0() + Duration::days(4)));
    }

    #[test]
    fn lesson_ignores_category_changes() {
        let key = ItemKey::lesson("spanish/numbers");
        let first = schedule_review(None, &key, Difficulty::NotRated, t0());
        let second = schedule_review(Some(&first), &key, Difficulty::Hard, t0());
        assert_eq!(second.repetition_count, 2);
    }

    #[test]
    fn easy_word_then_rerated_hard_restarts() {
        let key = ItemKey::word("perro");
        let easy = schedule_review(None, &key, Difficulty::Easy, t0());
        assert_eq!(easy.next_review_at, Some(t0() + Duration::days(3)));

        let changed_at = t0() + Duration::hours(2);
        let hard = schedule_restart(&key, Difficulty::Hard, changed_at);
        assert_eq!(hard.repetition_count, 0);
        assert_eq!(hard.next_review_at, Some(changed_at + Duration::hours(4)));
    }

    #[test]
    fn review_with_new_category_uses_first_interval() {
        let key = ItemKey::word("gato");
        let mut entry = schedule_review(None, &key, Difficulty::Easy, t0());
        entry = schedule_review(Some(&entry), &key, Difficulty::Easy, t0());
        assert_eq!(entry.repetition_count, 2);

        let switched = schedule_review(Some(&entry), &key, Difficulty::Medium, t0());
        assert_eq!(switched.repetition_count, 1);
        assert_eq!(switched.next_review_at, Some(t0() + Duration::days(1)));
    }

    #[test]
    fn scheduled_entries_are_never_inverted() {
        let key = ItemKey::word("casa");
        let mut entry: Option<ScheduleEntry> = None;
        for step in 0..20 {
            let now = t0() + Duration::hours(step);
            let next = schedule_review(entry.as_ref(), &key, Difficulty::Medium, now);
            assert!(next.validate().is_ok());
            assert!(next.next_review_at > next.last_reviewed_at);
            entry = Some(next);
        }
    }
}
