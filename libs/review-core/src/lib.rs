//! Core review scheduling library shared by the client and backend.
//!
//! Provides:
//! - Interval tables for lesson and word items
//! - The schedule calculator deriving next-due instants
//! - Shared types (ItemKey, Difficulty, ScheduleEntry, HistoryRecord)

pub mod error;
pub mod intervals;
pub mod schedule;
pub mod types;

pub use error::{Result, ScheduleError};
pub use intervals::{interval_table_for, next_due, IntervalTable};
pub use schedule::{schedule_restart, schedule_review};
pub use types::{repetition_count_from, Difficulty, HistoryRecord, ItemKey, ItemKind, ScheduleEntry};
