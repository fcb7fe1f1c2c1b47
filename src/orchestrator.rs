//! Drives a full backup run: resolve domains, stage exports into a work
//! directory, write the manifest, compress everything into the final
//! archive, and tear the staging area down.
//!
//! One orchestrator value drives one run. Construct a fresh one for the
//! next run instead of reusing an instance whose cancellation token may
//! already be tripped.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{Compressor, ProgressCallback, ZipCompressor};
use crate::config::BackupConfig;
use crate::domain::BackupDomain;
use crate::exporter::{self, ExportContext, ExportFormat, ExportOptions};
use crate::manifest::ManifestBuilder;
use crate::progress::events::{BackupEvent, EventChannel};
use crate::progress::{BackupPhase, ProgressTracker};
use crate::store::Stores;
use crate::utils::errors::{BackupError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Caller-facing knobs for one backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Domains to export. `None` selects every known domain; unknown names
    /// are logged and dropped.
    pub domains: Option<Vec<String>>,
    /// Copy knowledge payload files into the archive, not just metadata.
    pub include_files: bool,
    pub format: ExportFormat,
    /// Presence of a password records encryption parameters in the
    /// manifest. The password itself never leaves the caller.
    pub encryption_password: Option<String>,
    pub incremental: bool,
    /// Chain identifier for incremental runs; a fresh one is generated
    /// when absent.
    pub chain_id: Option<String>,
    /// Zip deflate level 0-9; falls back to the configured default.
    pub compression_level: Option<u32>,
}

pub struct BackupOrchestrator {
    config: BackupConfig,
    stores: Stores,
    compressor: Arc<dyn Compressor>,
    events: EventChannel,
    cancel: CancellationToken,
}

impl BackupOrchestrator {
    pub fn new(config: BackupConfig, stores: Stores) -> Self {
        Self::with_compressor(config, stores, Arc::new(ZipCompressor))
    }

    pub fn with_compressor(
        config: BackupConfig,
        stores: Stores,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            config,
            stores,
            compressor,
            events: EventChannel::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.events.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation. The flag is honored at the next domain
    /// boundary; a domain already exporting runs to completion first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the full pipeline and return the finished archive's path.
    pub async fn export(&self, options: BackupOptions) -> Result<PathBuf> {
        let progress = Arc::new(ProgressTracker::with_channel(self.events.clone()));
        let started = Instant::now();

        let publisher = self.spawn_progress_publisher(progress.clone());
        let result = self.run(&options, &progress).await;
        // The publisher must stop on every exit path.
        publisher.abort();

        match result {
            Ok(archive) => {
                info!(
                    "Backup completed in {}ms: {}",
                    started.elapsed().as_millis(),
                    archive.display()
                );
                // Closing snapshot with the final counters, then the
                // terminal event.
                self.events
                    .publish(BackupEvent::Progress(progress.backup_progress()));
                self.events.publish(BackupEvent::Completed {
                    archive: archive.display().to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(archive)
            }
            Err(e) => {
                error!("Backup failed: {}", e);
                self.events.publish(BackupEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Pushes a progress snapshot to subscribers at a fixed cadence until
    /// aborted. Snapshots race with the export and are best-effort.
    fn spawn_progress_publisher(&self, progress: Arc<ProgressTracker>) -> JoinHandle<()> {
        let events = self.events.clone();
        let period = Duration::from_millis(self.config.progress_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                events.publish(BackupEvent::Progress(progress.backup_progress()));
            }
        })
    }

    async fn run(&self, options: &BackupOptions, progress: &Arc<ProgressTracker>) -> Result<PathBuf> {
        let domains = self.resolve_domains(options.domains.as_deref())?;
        info!("Starting backup of {} domains: {:?}", domains.len(), domains);
        self.events.publish(BackupEvent::Started {
            domains: domains.clone(),
        });

        let work_dir = self.create_work_dir().await?;
        debug!("Work directory: {}", work_dir.display());

        let outcome = self
            .run_in_work_dir(options, &domains, &work_dir, progress)
            .await;

        // The staging tree never outlives its run, success or not.
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(
                "Failed to remove work directory {}: {}",
                work_dir.display(),
                e
            );
        }
        outcome
    }

    async fn run_in_work_dir(
        &self,
        options: &BackupOptions,
        domains: &[BackupDomain],
        work_dir: &std::path::Path,
        progress: &Arc<ProgressTracker>,
    ) -> Result<PathBuf> {
        // The pre-count scan runs before the first explicit phase change.
        let total_items = self.count_total_items(domains).await?;
        progress.set_totals(total_items, 0);
        debug!("Counted {} items across {} domains", total_items, domains.len());

        progress.set_phase(BackupPhase::Exporting);
        let ctx = ExportContext::new(work_dir.to_path_buf(), progress.clone()).with_options(
            ExportOptions {
                include_files: options.include_files,
                format: options.format,
            },
        );

        let mut builder = ManifestBuilder::new(
            domains.to_vec(),
            &self.config.app_version,
            &self.config.platform,
        );
        if options.encryption_password.is_some() {
            builder.enable_encryption();
        }
        if options.incremental {
            let chain_id = options
                .chain_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            builder.enable_incremental(&chain_id);
        }

        for domain in domains {
            // Cancellation is honored only between domains; a domain in
            // flight always finishes.
            if self.cancel.is_cancelled() {
                warn!("Backup cancelled before domain {}", domain);
                return Err(BackupError::Cancelled);
            }
            let result =
                exporter::export_domain(*domain, &self.stores, &self.config.knowledge_dir, &ctx)
                    .await?;
            info!(
                "Exported domain {} ({} items, {} bytes)",
                domain, result.item_count, result.compressed_size
            );
            builder.add_domain_result(result);
        }

        progress.set_phase(BackupPhase::Finalizing);
        let manifest = builder.build()?;
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(work_dir.join(MANIFEST_FILE), &manifest_json).await?;

        progress.set_phase(BackupPhase::Compressing);
        tokio::fs::create_dir_all(&self.config.archive_dir).await?;
        let run_name = work_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        let archive_path = self.config.archive_dir.join(format!("{run_name}.zip"));
        let level = options
            .compression_level
            .unwrap_or(self.config.compression_level);

        let on_bytes: ProgressCallback = {
            let progress = progress.clone();
            Arc::new(move |bytes| progress.update_bytes_processed(bytes))
        };
        let archive_size = self
            .compressor
            .compress_directory(work_dir, &archive_path, level, on_bytes)
            .await?;
        info!(
            "Archive written to {} ({} bytes)",
            archive_path.display(),
            archive_size
        );

        progress.set_phase(BackupPhase::Complete);
        let archive_path = tokio::fs::canonicalize(&archive_path)
            .await
            .unwrap_or(archive_path);
        Ok(archive_path)
    }

    /// Map requested domain names onto the known set, dropping unknown
    /// names and duplicates. An empty result is a configuration error.
    fn resolve_domains(&self, requested: Option<&[String]>) -> Result<Vec<BackupDomain>> {
        let Some(requested) = requested else {
            return Ok(BackupDomain::ALL.to_vec());
        };

        let mut resolved = Vec::new();
        for name in requested {
            match name.parse::<BackupDomain>() {
                Ok(domain) => {
                    if !resolved.contains(&domain) {
                        resolved.push(domain);
                    }
                }
                Err(_) => warn!("Ignoring unknown backup domain {:?}", name),
            }
        }
        if resolved.is_empty() {
            return Err(BackupError::Config(
                "no valid backup domains requested".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Pre-count items so overall progress has a denominator from the
    /// first exported row.
    async fn count_total_items(&self, domains: &[BackupDomain]) -> Result<u64> {
        let mut total = 0;
        for domain in domains {
            total += match domain {
                BackupDomain::Topics => self.stores.topics.count().await?,
                BackupDomain::Groups => self.stores.groups.count().await?,
                BackupDomain::Tags => {
                    self.stores.tags.count_tags().await?
                        + self.stores.tags.count_entity_tags().await?
                }
                BackupDomain::Knowledge => {
                    exporter::count_knowledge_entries(&self.config.knowledge_dir).await?
                }
                BackupDomain::Preferences => self.stores.preferences.count().await?,
            };
        }
        Ok(total)
    }

    async fn create_work_dir(&self) -> Result<PathBuf> {
        let name = format!("backup-{}", Utc::now().format("%Y%m%d-%H%M%S-%3f"));
        let dir = self.config.work_root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}
