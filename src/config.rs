//! Configuration for tsmerge
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, TsError};

/// Main configuration for a tsmerge instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/<node>/wal       (live write-ahead log per node)
    ///     ├── wal/<node>/wal-old   (rotated log pending deletion)
    ///     ├── sequence/<series>/   (sealed sequential files)
    ///     ├── overflow/<series>/   (sealed overflow insert files)
    ///     ├── overflow/updates/    (overflow update/delete files)
    ///     └── external_sort/       (temporary merge spill files)
    pub data_dir: PathBuf,

    /// Points per series memtable before an automatic flush
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Whether mutations are logged before being applied
    pub enable_wal: bool,

    /// WAL root; defaults to `{data_dir}/wal`
    pub wal_dir: Option<PathBuf>,

    /// Buffered records that trigger a synchronous flush
    pub flush_wal_threshold: usize,

    /// Period of the background auto-sync (milliseconds)
    pub flush_wal_period_ms: u64,

    /// Largest accepted serialized plan (bytes)
    pub max_wal_record_size: usize,

    // -------------------------------------------------------------------------
    // External Sort Configuration
    // -------------------------------------------------------------------------
    /// Spill directory; defaults to `{data_dir}/external_sort`
    pub external_sort_dir: Option<PathBuf>,

    /// Maximum number of sources merged directly in one pass
    pub external_sort_fan_in: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tsmerge_data"),
            memtable_size_limit: 100_000,
            enable_wal: true,
            wal_dir: None,
            flush_wal_threshold: 10_000,
            flush_wal_period_ms: 10_000,
            max_wal_record_size: 4 * 1024 * 1024, // 4 MB
            external_sort_dir: None,
            external_sort_fan_in: 50,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolved WAL root directory
    pub fn wal_dir(&self) -> PathBuf {
        self.wal_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("wal"))
    }

    /// Resolved external sort spill directory
    pub fn external_sort_dir(&self) -> PathBuf {
        self.external_sort_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("external_sort"))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_wal_threshold == 0 {
            return Err(TsError::Config(
                "flush_wal_threshold must be at least 1".to_string(),
            ));
        }
        if self.flush_wal_period_ms == 0 {
            return Err(TsError::Config(
                "flush_wal_period_ms must be at least 1".to_string(),
            ));
        }
        if self.external_sort_fan_in < 2 {
            return Err(TsError::Config(format!(
                "external_sort_fan_in must be at least 2, got {}",
                self.external_sort_fan_in
            )));
        }
        if self.memtable_size_limit == 0 {
            return Err(TsError::Config(
                "memtable_size_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable size limit (in points)
    pub fn memtable_size_limit(mut self, points: usize) -> Self {
        self.config.memtable_size_limit = points;
        self
    }

    /// Enable or disable write-ahead logging
    pub fn enable_wal(mut self, enabled: bool) -> Self {
        self.config.enable_wal = enabled;
        self
    }

    /// Override the WAL root directory
    pub fn wal_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wal_dir = Some(path.into());
        self
    }

    /// Set the number of buffered records that forces a flush
    pub fn flush_wal_threshold(mut self, count: usize) -> Self {
        self.config.flush_wal_threshold = count;
        self
    }

    /// Set the background auto-sync period (in milliseconds)
    pub fn flush_wal_period_ms(mut self, ms: u64) -> Self {
        self.config.flush_wal_period_ms = ms;
        self
    }

    /// Set the maximum serialized plan size (in bytes)
    pub fn max_wal_record_size(mut self, bytes: usize) -> Self {
        self.config.max_wal_record_size = bytes;
        self
    }

    /// Override the external sort spill directory
    pub fn external_sort_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.external_sort_dir = Some(path.into());
        self
    }

    /// Set the external sort fan-in limit
    pub fn external_sort_fan_in(mut self, fan_in: usize) -> Self {
        self.config.external_sort_fan_in = fan_in;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
