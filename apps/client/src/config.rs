//! Client configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::store::{
    DisabledRemote, HttpRemoteStore, RemoteStore, SqliteStore, StoreError,
};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);
const APP_DIR: &str = "review-scheduler";
const DB_FILE: &str = "schedule.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub database_path: PathBuf,
    /// Backend base URL; `None` keeps the client local-only.
    pub remote_url: Option<String>,
    pub remote_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            remote_url: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DB_FILE)
}

impl ClientConfig {
    /// Load from `REVIEW_DB_PATH`, `REVIEW_REMOTE_URL` and
    /// `REVIEW_REMOTE_TIMEOUT_SECS`, defaulting what is unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_path = lookup("REVIEW_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let remote_url = lookup("REVIEW_REMOTE_URL").filter(|v| !v.trim().is_empty());

        let remote_timeout = match lookup("REVIEW_REMOTE_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(value = %raw, "invalid REVIEW_REMOTE_TIMEOUT_SECS, using default");
                    defaults.remote_timeout
                }
            },
            None => defaults.remote_timeout,
        };

        Self {
            database_path,
            remote_url,
            remote_timeout,
        }
    }

    /// Open (or recreate) the local database, creating its directory.
    pub fn open_local(&self) -> Result<SqliteStore, StoreError> {
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        SqliteStore::open_or_recreate(&self.database_path)
    }

    /// Remote store for the configured URL, or a disabled one.
    pub fn remote_store(&self) -> Arc<dyn RemoteStore> {
        let Some(url) = &self.remote_url else {
            return Arc::new(DisabledRemote);
        };

        match HttpRemoteStore::new(url, self.remote_timeout) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                warn!(error = %err, "remote store disabled");
                Arc::new(DisabledRemote)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.remote_url, None);
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert!(config.database_path.ends_with("review-scheduler/schedule.db"));
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("REVIEW_DB_PATH", "/tmp/reviews.db"),
            ("REVIEW_REMOTE_URL", "https://reviews.example.com"),
            ("REVIEW_REMOTE_TIMEOUT_SECS", "3"),
        ]));
        assert_eq!(config.database_path, PathBuf::from("/tmp/reviews.db"));
        assert_eq!(config.remote_url.as_deref(), Some("https://reviews.example.com"));
        assert_eq!(config.remote_timeout, Duration::from_secs(3));
    }

    #[test]
    fn bad_timeout_falls_back() {
        let config = ClientConfig::from_lookup(lookup(&[("REVIEW_REMOTE_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
    }

    #[test]
    fn open_local_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            database_path: dir.path().join("nested").join("schedule.db"),
            ..ClientConfig::default()
        };
        config.open_local().unwrap();
        assert!(config.database_path.exists());
    }
}
