//! Configuration for ledger synchronization

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Catch-up configuration
    pub sync: SyncConfig,

    /// Full import configuration
    pub import: ImportConfig,

    /// Deadlock detector configuration
    pub watchdog: WatchdogConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger-sync"),
            service_name: "ledger-sync".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            sync: SyncConfig::default(),
            import: ImportConfig::default(),
            watchdog: WatchdogConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,

    /// fsync every committed write batch
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
            sync_writes: true,
        }
    }
}

/// Catch-up configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest delta replayed incrementally; bigger gaps reimport in full
    pub max_delta_entries: usize,

    /// Refuse to sync on missing state nodes when the caller does not choose (`sync_to`)
    pub require_local: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_delta_entries: 1_000_000,
            require_local: true,
        }
    }
}

/// Full import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Leaves imported per committed batch
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 100_000,
        }
    }
}

/// Deadlock detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Seconds without a reset before the writer is reported as stalled
    pub stall_threshold_secs: u64,

    /// Seconds between stall checks
    pub check_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_threshold_secs: 500,
            check_interval_secs: 10,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_SYNC_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(size) = std::env::var("LEDGER_SYNC_IMPORT_BATCH_SIZE") {
            config.import.batch_size = parse_env("LEDGER_SYNC_IMPORT_BATCH_SIZE", &size)?;
        }

        if let Ok(max) = std::env::var("LEDGER_SYNC_MAX_DELTA_ENTRIES") {
            config.sync.max_delta_entries = parse_env("LEDGER_SYNC_MAX_DELTA_ENTRIES", &max)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.import.batch_size == 0 {
            return Err(crate::Error::Config("import.batch_size must be positive".to_string()));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor.mailbox_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> crate::Result<usize> {
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={}: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "ledger-sync");
        assert_eq!(config.import.batch_size, 100_000);
        assert!(config.sync.require_local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/ledger"

            [import]
            batch_size = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.sync.max_delta_entries, 1_000_000);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger-sync.toml");
        std::fs::write(&path, "[sync]\nmax_delta_entries = 10\nrequire_local = false\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sync.max_delta_entries, 10);
        assert!(!config.sync.require_local);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = Config::default();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
