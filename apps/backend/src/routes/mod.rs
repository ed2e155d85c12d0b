//! API routes

pub mod auth;
pub mod history;
pub mod schedule;
