//! Tree service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a `TreeService`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// Separator between titles in hierarchical paths
    pub path_separator: String,

    /// Title given to the root by `ensure_root`
    pub root_title: String,

    /// Deadline for each individual store call (`None` = wait indefinitely)
    pub store_timeout: Option<Duration>,

    /// JSON-lines file backing the mutation journal (`None` = memory only)
    pub journal_path: Option<PathBuf>,

    /// Run a full integrity scan after every mutation
    pub verify_after_mutation: bool,

    /// Capacity of the domain event broadcast channel
    pub event_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            path_separator: "/".to_string(),
            root_title: "root".to_string(),
            store_timeout: Some(Duration::from_secs(30)),
            journal_path: None,
            verify_after_mutation: false,
            event_capacity: 128,
        }
    }
}

impl TreeConfig {
    /// Defaults overridden by `FOLDERTREE_*` environment variables
    ///
    /// - `FOLDERTREE_PATH_SEPARATOR`
    /// - `FOLDERTREE_ROOT_TITLE`
    /// - `FOLDERTREE_STORE_TIMEOUT_MS` (`0` disables the timeout)
    /// - `FOLDERTREE_JOURNAL_PATH`
    /// - `FOLDERTREE_VERIFY_AFTER_MUTATION` (`true`/`false`)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_timeout = match std::env::var("FOLDERTREE_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.store_timeout,
        };

        Self {
            path_separator: std::env::var("FOLDERTREE_PATH_SEPARATOR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.path_separator),
            root_title: std::env::var("FOLDERTREE_ROOT_TITLE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.root_title),
            store_timeout,
            journal_path: std::env::var("FOLDERTREE_JOURNAL_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            verify_after_mutation: std::env::var("FOLDERTREE_VERIFY_AFTER_MUTATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.verify_after_mutation),
            event_capacity: defaults.event_capacity,
        }
    }

    pub fn with_path_separator(mut self, separator: impl Into<String>) -> Self {
        self.path_separator = separator.into();
        self
    }

    pub fn with_root_title(mut self, title: impl Into<String>) -> Self {
        self.root_title = title.into();
        self
    }

    pub fn with_store_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    pub fn with_verify_after_mutation(mut self, verify: bool) -> Self {
        self.verify_after_mutation = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.path_separator, "/");
        assert_eq!(config.root_title, "root");
        assert_eq!(config.store_timeout, Some(Duration::from_secs(30)));
        assert!(config.journal_path.is_none());
        assert!(!config.verify_after_mutation);
    }

    #[test]
    fn test_builder_overrides() {
        let config = TreeConfig::default()
            .with_path_separator("|")
            .with_root_title("repository")
            .with_store_timeout(None)
            .with_verify_after_mutation(true);

        assert_eq!(config.path_separator, "|");
        assert_eq!(config.root_title, "repository");
        assert!(config.store_timeout.is_none());
        assert!(config.verify_after_mutation);
    }
}
