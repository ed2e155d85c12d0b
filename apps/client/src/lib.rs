//! Device-side review scheduler.
//!
//! Keeps scheduling state in a local SQLite store that works without an
//! identity, and reconciles it with the authoritative remote store once a
//! learner signs in.

pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod reconcile;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{Result, ServiceError};
pub use history::{ClearedHistory, HistoryLog};
pub use identity::{Identity, IdentityHandle};
pub use reconcile::{ReconcileOutcome, ReconcileReport, ReconcileStatus, Reconciler, ViewSource};
pub use service::{DueFilter, ResetReport, ScheduleService};
pub use store::{
    shared, HttpRemoteStore, MemoryRemoteStore, RemoteStore, RemoteUnavailable, SharedStore,
    SqliteStore,
};
