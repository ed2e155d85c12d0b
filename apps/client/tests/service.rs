//! Schedule service behaviour: mutations, queries, reset and soft failures.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;
use review_client::store::{HistoryRepository, ScheduleRepository};
use review_client::{
    shared, ClientConfig, DueFilter, IdentityHandle, MemoryRemoteStore, ReconcileOutcome,
    ScheduleService, ServiceError, SqliteStore, ViewSource,
};
use review_core::{Difficulty, ItemKey, ItemKind, ScheduleError};

use common::{learner, start, Harness};

#[tokio::test]
async fn lesson_reviews_follow_fixed_sequence() {
    let h = Harness::new();
    let key = ItemKey::lesson("spanish/greetings");

    let first = h.service.record_review(&key, Difficulty::NotRated).await.unwrap();
    assert_eq!(first.next_review_at, Some(start() + ChronoDuration::days(1)));

    h.clock.advance(ChronoDuration::days(1));
    let second = h.service.record_review(&key, Difficulty::NotRated).await.unwrap();
    assert_eq!(
        second.next_review_at,
        Some(start() + ChronoDuration::days(1) + ChronoDuration::days(3))
    );
    assert_eq!(second.repetition_count, 2);
}

#[tokio::test]
async fn rerating_a_word_restarts_its_schedule() {
    let h = Harness::new();
    let key = ItemKey::word("pomme");

    let easy = h.service.record_review(&key, Difficulty::Easy).await.unwrap();
    assert_eq!(easy.next_review_at, Some(start() + ChronoDuration::days(3)));

    h.clock.advance(ChronoDuration::hours(30));
    let changed_at = start() + ChronoDuration::hours(30);
    let hard = h.service.set_category(&key, Difficulty::Hard).await.unwrap();
    assert_eq!(hard.repetition_count, 0);
    assert_eq!(hard.next_review_at, Some(changed_at + ChronoDuration::hours(4)));

    let history = h.service.history(Some(&key), None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].old_category, Some(Difficulty::Easy));
    assert_eq!(history[0].new_category, Difficulty::Hard);
    assert_eq!(history[1].old_category, None);
}

#[tokio::test]
async fn same_category_review_does_not_add_history() {
    let h = Harness::new();
    let key = ItemKey::word("table");

    h.service.record_review(&key, Difficulty::Medium).await.unwrap();
    h.clock.advance(ChronoDuration::days(1));
    h.service.record_review(&key, Difficulty::Medium).await.unwrap();
    h.service.set_category(&key, Difficulty::Medium).await.unwrap();

    assert_eq!(h.service.history(Some(&key), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn fresh_schedule_is_never_immediately_due() {
    let h = Harness::new();
    for category in [
        Difficulty::NotRated,
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
    ] {
        let key = ItemKey::word(category.as_str());
        h.service.set_category(&key, category).await.unwrap();
    }

    let due = h.service.due_within(ChronoDuration::zero(), &DueFilter::All).await;
    assert!(due.is_empty());
    assert!(h.service.due_now(&DueFilter::All).await.is_empty());
}

#[tokio::test]
async fn due_lists_are_ordered_soonest_first() {
    let h = Harness::new();
    let hard = ItemKey::word("dur");
    let not_rated = ItemKey::word("neuf");
    let lesson = ItemKey::lesson("intro");

    h.service.record_review(&hard, Difficulty::Hard).await.unwrap(); // +4h
    h.service.record_review(&not_rated, Difficulty::NotRated).await.unwrap(); // +1h
    h.service.record_review(&lesson, Difficulty::NotRated).await.unwrap(); // +1d

    let upcoming = h.service.due_within(ChronoDuration::hours(5), &DueFilter::All).await;
    let keys: Vec<_> = upcoming.iter().map(|e| e.item_key.clone()).collect();
    assert_eq!(keys, vec![not_rated.clone(), hard.clone()]);

    h.clock.advance(ChronoDuration::days(2));
    let due = h.service.due_now(&DueFilter::All).await;
    let keys: Vec<_> = due.iter().map(|e| e.item_key.clone()).collect();
    assert_eq!(keys, vec![not_rated.clone(), hard.clone(), lesson.clone()]);

    let lessons = h.service.due_now(&DueFilter::Kind(ItemKind::Lesson)).await;
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].item_key, lesson);

    let picked = DueFilter::Keys([hard.clone()].into_iter().collect());
    assert_eq!(h.service.due_now(&picked).await.len(), 1);
}

#[tokio::test]
async fn reset_by_kind_leaves_other_kind() {
    let h = Harness::new();
    h.sign_in().await;
    let lesson = ItemKey::lesson("a");
    let word = ItemKey::word("b");
    h.service.record_review(&lesson, Difficulty::NotRated).await.unwrap();
    h.service.record_review(&word, Difficulty::Easy).await.unwrap();

    let report = h.service.reset_all(Some(ItemKind::Word)).await.unwrap();
    assert_eq!(report.local_entries, 1);
    assert_eq!(report.remote_entries, Some(1));
    assert_eq!(report.history.local, 1);
    assert_eq!(report.history.remote, Some(1));

    assert_eq!(h.service.entry(&word).await, None);
    assert!(h.service.entry(&lesson).await.is_some());
    assert_eq!(h.remote.entries_for(&learner()).len(), 1);

    let report = h.service.reset_all(None).await.unwrap();
    assert_eq!(report.local_entries, 1);
    assert!(h.service.entries().await.is_empty());
    assert!(h.remote.entries_for(&learner()).is_empty());
    assert!(h.remote.history_for(&learner()).is_empty());
    assert!(h.local.lock().unwrap().list_history(None, None).unwrap().is_empty());
}

#[tokio::test]
async fn invalid_category_value_is_rejected() {
    let h = Harness::new();
    let key = ItemKey::word("faux");

    let err = h.service.set_category_value(&key, 9).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Schedule(ScheduleError::InvalidCategory(9))
    ));
    assert_eq!(h.service.entry(&key).await, None);

    let ok = h.service.set_category_value(&key, 3).await.unwrap();
    assert_eq!(ok.category, Difficulty::Hard);
}

#[tokio::test]
async fn remote_outage_keeps_local_write() {
    let h = Harness::new();
    h.sign_in().await;
    h.remote.set_available(false);
    let key = ItemKey::word("pluie");

    let entry = h.service.record_review(&key, Difficulty::Medium).await.unwrap();

    assert_eq!(h.service.entry(&key).await, Some(entry.clone()));
    let stored = h.local.lock().unwrap().get_entry(&key).unwrap();
    assert_eq!(stored, Some(entry));
    assert!(h.remote.entries_for(&learner()).is_empty());
    assert_eq!(h.local.lock().unwrap().pending_history().unwrap().len(), 1);
}

#[tokio::test]
async fn slow_remote_counts_as_unavailable() {
    let local = shared(SqliteStore::open_in_memory().unwrap());
    let remote = Arc::new(MemoryRemoteStore::new().with_latency(Duration::from_millis(300)));
    let identity = IdentityHandle::with_identity(Some(learner()));
    let config = ClientConfig {
        database_path: ":memory:".into(),
        remote_url: None,
        remote_timeout: Duration::from_millis(50),
    };
    let service = ScheduleService::new(local.clone(), remote.clone(), identity, &config);

    let report = match service.load().await {
        ReconcileOutcome::Completed(report) => report,
        ReconcileOutcome::AlreadyInProgress => panic!("reconciliation did not run"),
    };
    assert_eq!(report.source, ViewSource::LocalOnly);

    let key = ItemKey::word("lent");
    let entry = service.record_review(&key, Difficulty::Easy).await.unwrap();
    assert_eq!(local.lock().unwrap().get_entry(&key).unwrap(), Some(entry));
    assert!(remote.entries_for(&learner()).is_empty());
}

#[tokio::test]
async fn refresh_pulls_entries_due_in_window() {
    let h = Harness::new();
    h.sign_in().await;
    let other_device = review_core::schedule_review(
        None,
        &ItemKey::word("ailleurs"),
        Difficulty::NotRated,
        start(),
    );
    h.remote.seed(&learner(), [other_device.clone()]);
    assert_eq!(h.service.entry(&other_device.item_key).await, None);

    assert_eq!(h.service.refresh_due(ChronoDuration::minutes(30)).await, 0);
    assert_eq!(h.service.refresh_due(ChronoDuration::hours(2)).await, 1);
    assert_eq!(
        h.service.entry(&other_device.item_key).await,
        Some(other_device)
    );
}

#[tokio::test]
async fn unbounded_window_covers_every_upcoming_entry() {
    let h = Harness::new();
    h.sign_in().await;
    let soon = h
        .service
        .record_review(&ItemKey::word("bientot"), Difficulty::NotRated)
        .await
        .unwrap();
    let elsewhere = review_core::schedule_review(
        None,
        &ItemKey::word("ailleurs"),
        Difficulty::Easy,
        start(),
    );
    h.remote.seed(&learner(), [elsewhere.clone()]);

    assert_eq!(h.service.refresh_due(ChronoDuration::MAX).await, 2);
    assert_eq!(
        h.service.due_within(ChronoDuration::MAX, &DueFilter::All).await,
        vec![soon, elsewhere]
    );
}
