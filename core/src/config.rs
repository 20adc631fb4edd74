//! Configuration for the core crate
//!
//! This module provides configuration options for the engine: where the
//! database lives, how the connection is tuned, and how notifications are
//! buffered on their way to the owning context.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// SQLite journal mode applied at open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead logging (recommended)
    #[default]
    Wal,

    /// Rollback journal, deleted at commit
    Delete,

    /// In-memory journal
    Memory,
}

impl JournalMode {
    /// Pragma value for this mode
    pub const fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
            JournalMode::Memory => "memory",
        }
    }
}

/// SQLite synchronous mode applied at open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SynchronousMode {
    /// Fsync at the critical moments (balanced)
    #[default]
    Normal,

    /// Fsync on every write (safest)
    Full,
}

impl SynchronousMode {
    /// Pragma value for this mode
    pub const fn pragma_value(self) -> &'static str {
        match self {
            SynchronousMode::Normal => "normal",
            SynchronousMode::Full => "full",
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file; an in-memory database when absent
    pub path: Option<PathBuf>,

    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,

    /// Journal mode
    pub journal_mode: JournalMode,

    /// Synchronous mode
    pub synchronous: SynchronousMode,

    /// Statements running longer than this are logged at warn level
    pub slow_statement_warn_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: None,
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::default(),
            synchronous: SynchronousMode::default(),
            slow_statement_warn_ms: 250,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Capacity of the bounded channel between worker threads and the
    /// owning context; senders block when it fills up
    pub capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig { capacity: 256 }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Notification configuration
    pub notify: NotifyConfig,

    /// Log level
    pub log_level: Option<String>,
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a file-backed database at `path`
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.path = Some(path.into());
        config
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config = serde_json::from_reader(file)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Create a testing configuration: in-memory database, small
    /// notification buffer, aggressive slow-statement reporting
    pub fn testing() -> Self {
        let mut config = Self::default();
        config.storage.path = None;
        config.storage.busy_timeout_ms = 500;
        config.storage.slow_statement_warn_ms = 50;
        config.notify.capacity = 32;
        config.log_level = Some("debug".to_string());
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert!(config.storage.path.is_none());
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert_eq!(config.storage.journal_mode, JournalMode::Wal);
        assert_eq!(config.storage.synchronous, SynchronousMode::Normal);
        assert_eq!(config.notify.capacity, 256);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_testing_config() {
        let config = EngineConfig::testing();

        assert!(config.storage.path.is_none());
        assert_eq!(config.storage.busy_timeout_ms, 500);
        assert_eq!(config.notify.capacity, 32);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_at_path() {
        let config = EngineConfig::at_path("/tmp/library.db");
        assert_eq!(
            config.storage.path.as_deref(),
            Some(std::path::Path::new("/tmp/library.db"))
        );
    }

    #[test]
    fn test_pragma_values() {
        assert_eq!(JournalMode::Wal.pragma_value(), "wal");
        assert_eq!(JournalMode::Delete.pragma_value(), "delete");
        assert_eq!(SynchronousMode::Full.pragma_value(), "full");
    }

    #[test]
    fn test_config_file_io() {
        let mut config = EngineConfig::default();
        config.storage.busy_timeout_ms = 1_234;
        config.notify.capacity = 7;

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        config.to_file(path).unwrap();
        let loaded = EngineConfig::from_file(path).unwrap();

        assert_eq!(loaded.storage.busy_timeout_ms, 1_234);
        assert_eq!(loaded.notify.capacity, 7);
        assert_eq!(loaded.storage.journal_mode, config.storage.journal_mode);
    }
}
