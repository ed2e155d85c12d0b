//! Remote store contract.
//!
//! Every remote call fails softly: errors are reported as
//! [`RemoteUnavailable`] and callers continue with the local store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_core::{HistoryRecord, ItemKey, ScheduleEntry};
use thiserror::Error;

use crate::identity::Identity;

/// The remote store could not serve a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteUnavailable {
    #[error("no remote store configured")]
    Disabled,

    #[error("remote store offline")]
    Offline,

    #[error("network error: {0}")]
    Transport(String),

    #[error("remote error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("remote call timed out")]
    Timeout,
}

pub type RemoteResult<T> = std::result::Result<T, RemoteUnavailable>;

/// Identity-scoped authoritative store.
///
/// Upserts and history appends are idempotent: repeating a call with the
/// same payload leaves the store unchanged and reports success.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<Option<ScheduleEntry>>;

    async fn upsert(&self, identity: &Identity, entry: &ScheduleEntry) -> RemoteResult<()>;

    async fn list_all(&self, identity: &Identity) -> RemoteResult<Vec<ScheduleEntry>>;

    /// Entries with `from <= next_review_at <= until` (no lower bound when
    /// `from` is `None`).
    async fn list_due_between(
        &self,
        identity: &Identity,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> RemoteResult<Vec<ScheduleEntry>>;

    async fn delete(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<bool>;

    async fn delete_all(&self, identity: &Identity, prefix: Option<&str>) -> RemoteResult<usize>;

    /// Insert records whose id is not yet known. Returns how many were new.
    async fn append_history(
        &self,
        identity: &Identity,
        records: &[HistoryRecord],
    ) -> RemoteResult<usize>;

    /// Newest first.
    async fn list_history(
        &self,
        identity: &Identity,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<HistoryRecord>>;

    async fn clear_history(&self, identity: &Identity, prefix: Option<&str>)
        -> RemoteResult<usize>;
}

/// Bound a remote call; running out of time counts as unavailable.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteUnavailable::Timeout),
    }
}

/// Remote store used when no remote URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRemote;

#[async_trait]
impl RemoteStore for DisabledRemote {
    async fn get(&self, _: &Identity, _: &ItemKey) -> RemoteResult<Option<ScheduleEntry>> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn upsert(&self, _: &Identity, _: &ScheduleEntry) -> RemoteResult<()> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn list_all(&self, _: &Identity) -> RemoteResult<Vec<ScheduleEntry>> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn list_due_between(
        &self,
        _: &Identity,
        _: Option<DateTime<Utc>>,
        _: DateTime<Utc>,
    ) -> RemoteResult<Vec<ScheduleEntry>> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn delete(&self, _: &Identity, _: &ItemKey) -> RemoteResult<bool> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn delete_all(&self, _: &Identity, _: Option<&str>) -> RemoteResult<usize> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn append_history(&self, _: &Identity, _: &[HistoryRecord]) -> RemoteResult<usize> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn list_history(
        &self,
        _: &Identity,
        _: Option<&ItemKey>,
        _: Option<usize>,
    ) -> RemoteResult<Vec<HistoryRecord>> {
        Err(RemoteUnavailable::Disabled)
    }

    async fn clear_history(&self, _: &Identity, _: Option<&str>) -> RemoteResult<usize> {
        Err(RemoteUnavailable::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_times_out() {
        let result: RemoteResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RemoteUnavailable::Timeout));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn disabled_remote_is_always_unavailable() {
        let identity = Identity::new("learner-1", "token");
        let remote = DisabledRemote;
        assert_eq!(
            remote.list_all(&identity).await,
            Err(RemoteUnavailable::Disabled)
        );
    }
}
