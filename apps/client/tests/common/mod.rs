//! Shared setup for client integration tests.
//!
//! Each test gets a fresh in-memory local store, an in-memory remote store
//! and a manual clock, so no test shares session state with another.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use review_client::{
    shared, ClientConfig, Identity, IdentityHandle, ManualClock, MemoryRemoteStore,
    ScheduleService, SharedStore, SqliteStore,
};

pub struct Harness {
    pub service: ScheduleService,
    pub local: SharedStore,
    pub remote: Arc<MemoryRemoteStore>,
    pub identity: IdentityHandle,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_remote(MemoryRemoteStore::new())
    }

    pub fn with_remote(remote: MemoryRemoteStore) -> Self {
        let local = shared(SqliteStore::open_in_memory().expect("in-memory store"));
        let remote = Arc::new(remote);
        let identity = IdentityHandle::new();
        let clock = Arc::new(ManualClock::new(start()));
        let config = ClientConfig {
            database_path: ":memory:".into(),
            remote_url: None,
            remote_timeout: std::time::Duration::from_secs(2),
        };

        let service = ScheduleService::with_clock(
            local.clone(),
            remote.clone(),
            identity.clone(),
            &config,
            clock.clone(),
        );

        Self {
            service,
            local,
            remote,
            identity,
            clock,
        }
    }

    /// Sign in and reconcile the session for `learner()`.
    pub async fn sign_in(&self) {
        self.identity.sign_in(learner());
        self.service.on_identity_change(Some(learner())).await;
    }
}

pub fn learner() -> Identity {
    Identity::new("learner-1", "token-1")
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}
