//! Append-only category history.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use review_core::{HistoryRecord, ItemKey};
use tracing::{debug, warn};

use crate::error::Result;
use crate::identity::Identity;
use crate::store::remote::with_timeout;
use crate::store::{with_store, HistoryRepository, RemoteStore, SharedStore};

/// Rows removed by [`HistoryLog::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedHistory {
    pub local: usize,
    /// `None` when the remote store was not reached.
    pub remote: Option<usize>,
}

pub struct HistoryLog {
    local: SharedStore,
    remote: Arc<dyn RemoteStore>,
    remote_timeout: Duration,
}

impl HistoryLog {
    pub fn new(local: SharedStore, remote: Arc<dyn RemoteStore>, remote_timeout: Duration) -> Self {
        Self {
            local,
            remote,
            remote_timeout,
        }
    }

    /// Record locally, then push to the remote store when signed in.
    /// Records the remote store did not take stay pending for the next
    /// reconciliation.
    pub async fn append(&self, record: HistoryRecord, identity: Option<&Identity>) -> Result<()> {
        with_store(&self.local, |store| store.append_history(&record, false))?;
        debug!(
            item_key = %record.item_key,
            old = ?record.old_category,
            new = ?record.new_category,
            "history appended"
        );

        let Some(identity) = identity else {
            return Ok(());
        };

        let pushed = with_timeout(
            self.remote_timeout,
            self.remote.append_history(identity, std::slice::from_ref(&record)),
        )
        .await;
        match pushed {
            Ok(_) => {
                if let Err(err) =
                    with_store(&self.local, |store| store.mark_history_synced(&[record.id]))
                {
                    warn!(id = %record.id, error = %err, "pushed history left pending");
                }
            }
            Err(err) => warn!(item_key = %record.item_key, error = %err, "history push deferred"),
        }
        Ok(())
    }

    /// Newest first. With an identity the remote history is merged in,
    /// records known to both sides appearing once.
    pub async fn list(
        &self,
        identity: Option<&Identity>,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        let mut records = with_store(&self.local, |store| store.list_history(item, limit))?;

        if let Some(identity) = identity {
            match with_timeout(
                self.remote_timeout,
                self.remote.list_history(identity, item, limit),
            )
            .await
            {
                Ok(remote) => {
                    let known: HashSet<_> = records.iter().map(|record| record.id).collect();
                    records.extend(remote.into_iter().filter(|record| !known.contains(&record.id)));
                }
                Err(err) => warn!(error = %err, "remote history unavailable, showing local"),
            }
        }

        records.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Remove history for keys starting with `prefix` (all when `None`).
    pub async fn clear(
        &self,
        identity: Option<&Identity>,
        prefix: Option<&str>,
    ) -> Result<ClearedHistory> {
        let local = with_store(&self.local, |store| store.clear_history(prefix))?;

        let remote = match identity {
            Some(identity) => {
                match with_timeout(self.remote_timeout, self.remote.clear_history(identity, prefix))
                    .await
                {
                    Ok(count) => Some(count),
                    Err(err) => {
                        warn!(error = %err, "remote history not cleared");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(ClearedHistory { local, remote })
    }
}
