//! Configuration for the backup engine.
//!
//! Loads settings from a TOML file; every field has a usable default so a
//! partial file (or none at all) is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root under which per-run work directories are created
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Directory receiving finished archives
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Storage root holding one subdirectory per knowledge entry
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: PathBuf,

    /// Application version recorded in manifests
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Platform label recorded in manifests
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Zip compression level (0-9, 0 = store) used when a run does not
    /// request its own
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Interval between published progress snapshots, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

// Default values
fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("backup-engine")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("knowledge")
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_compression_level() -> u32 {
    6
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            work_root: default_work_root(),
            archive_dir: default_archive_dir(),
            knowledge_dir: default_knowledge_dir(),
            app_version: default_app_version(),
            platform: default_platform(),
            compression_level: default_compression_level(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl BackupConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackupConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
