//! Per-domain export implementations.
//!
//! Each domain knows how to stream its own slice of application state into
//! the run's work directory. [`export_domain`] is the single dispatch point
//! the orchestrator drives; the closed [`BackupDomain`] enum keeps the set
//! of exporters checkable at compile time.

mod groups;
mod knowledge;
mod preferences;
mod tags;
mod topics;
mod writer;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::BackupDomain;
use crate::progress::ProgressTracker;
use crate::store::Stores;
use crate::utils::errors::{BackupError, Result};

pub(crate) use knowledge::count_entries as count_knowledge_entries;

/// On-disk layout of the per-domain data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One JSON document per line.
    #[default]
    Jsonl,
    /// A single JSON array.
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Json => "json",
        }
    }
}

/// Knobs shared by every exporter in one run.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Copy knowledge payload files alongside their metadata rows.
    pub include_files: bool,
    pub format: ExportFormat,
}

/// Everything an exporter needs for one run. Constructed once by the
/// orchestrator and shared by reference across the sequential exports.
#[derive(Clone)]
pub struct ExportContext {
    /// Absolute path of the run's work directory.
    pub base_dir: PathBuf,
    pub progress: Arc<ProgressTracker>,
    pub options: ExportOptions,
}

impl ExportContext {
    pub fn new(base_dir: PathBuf, progress: Arc<ProgressTracker>) -> Self {
        Self {
            base_dir,
            progress,
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// A context without a work directory is a wiring bug in the caller,
    /// reported as a fatal configuration error. The progress handle cannot
    /// be absent by construction.
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(BackupError::Config(
                "export context has no base directory".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one finished domain export produced. The referenced data file
/// exists and has already been hashed by the time this value is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub domain: BackupDomain,
    pub item_count: u64,
    /// Logical (uncompressed) size of the exported data.
    pub raw_size: u64,
    /// Bytes actually written to the per-domain file(s).
    pub compressed_size: u64,
    /// Hex SHA-256 over the domain's data file(s).
    pub checksum: String,
    /// Primary data file, relative to the work directory.
    pub data_path: String,
}

/// Run one domain's export. Validation happens here so every exporter gets
/// it uniformly.
pub async fn export_domain(
    domain: BackupDomain,
    stores: &Stores,
    knowledge_root: &Path,
    ctx: &ExportContext,
) -> Result<ExportResult> {
    ctx.validate()?;
    match domain {
        BackupDomain::Topics => topics::export(stores.topics.as_ref(), ctx).await,
        BackupDomain::Groups => groups::export(stores.groups.as_ref(), ctx).await,
        BackupDomain::Tags => tags::export(stores.tags.as_ref(), ctx).await,
        BackupDomain::Knowledge => knowledge::export(knowledge_root, ctx).await,
        BackupDomain::Preferences => preferences::export(stores.preferences.as_ref(), ctx).await,
    }
}
