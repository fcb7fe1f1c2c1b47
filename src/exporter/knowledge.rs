use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::BackupDomain;
use crate::exporter::writer::RowWriter;
use crate::exporter::{ExportContext, ExportResult};
use crate::progress::ProgressTracker;
use crate::utils::checksum::file_sha256;
use crate::utils::errors::Result;

const METADATA_FILE: &str = "metadata.json";

/// List the entry directories under the knowledge storage root, sorted so
/// the export order is stable across runs. A missing root is treated as an
/// empty knowledge base.
async fn list_entries(root: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(root).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Knowledge storage root {} does not exist", root.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}

/// Number of entry directories, used to seed progress totals before the
/// export starts.
pub(crate) async fn count_entries(root: &Path) -> Result<u64> {
    Ok(list_entries(root).await?.len() as u64)
}

/// Export one metadata row per knowledge entry into `knowledge/knowledge.<ext>`.
///
/// Entries whose `metadata.json` is unreadable or not valid JSON are skipped
/// with a warning rather than failing the domain. With `include_files` set,
/// each entry's payload files are copied under `knowledge/files/<entry>/`.
pub(crate) async fn export(storage_root: &Path, ctx: &ExportContext) -> Result<ExportResult> {
    let domain = BackupDomain::Knowledge;
    let entries = list_entries(storage_root).await?;
    ctx.progress.set_domain(domain, entries.len() as u64);

    let dir = ctx.base_dir.join(domain.dir_name());
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}.{}", domain.dir_name(), ctx.options.format.extension());
    let path = dir.join(&file_name);

    let mut writer = RowWriter::create(&path, ctx.options.format).await?;
    let mut copied_bytes: u64 = 0;

    for entry in &entries {
        let metadata_path = entry.join(METADATA_FILE);
        let raw = match tokio::fs::read(&metadata_path).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = format!("skipped knowledge entry {}: {}", entry.display(), e);
                warn!("{}", message);
                ctx.progress.report_error(&message);
                continue;
            }
        };
        let metadata: serde_json::Value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => {
                let message = format!(
                    "skipped knowledge entry {} (invalid metadata): {}",
                    entry.display(),
                    e
                );
                warn!("{}", message);
                ctx.progress.report_error(&message);
                continue;
            }
        };

        let written = writer.write_row(&metadata).await?;
        ctx.progress.increment_items_processed(1);
        ctx.progress.update_bytes_processed(written);

        if ctx.options.include_files {
            copied_bytes += copy_entry_files(entry, &dir, &ctx.progress).await?;
        }
    }

    let stats = writer.finish().await?;
    let checksum = file_sha256(&path).await?;

    debug!(
        "Exported {} of {} knowledge entries ({} payload bytes)",
        stats.rows,
        entries.len(),
        copied_bytes
    );
    Ok(ExportResult {
        domain,
        item_count: stats.rows,
        raw_size: stats.raw_bytes + copied_bytes,
        compressed_size: stats.file_size + copied_bytes,
        checksum,
        data_path: format!("{}/{}", domain.dir_name(), file_name),
    })
}

/// Copy every payload file of one entry (everything except its metadata
/// file) into the staging area, preserving relative paths.
async fn copy_entry_files(
    entry: &Path,
    domain_dir: &Path,
    progress: &ProgressTracker,
) -> Result<u64> {
    let Some(entry_name) = entry.file_name() else {
        return Ok(0);
    };
    let target_root = domain_dir.join("files").join(entry_name);
    let entry_root = entry.to_path_buf();

    let files = tokio::task::spawn_blocking(move || -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut files = Vec::new();
        for item in WalkDir::new(&entry_root) {
            let item = item.map_err(io::Error::from)?;
            if !item.file_type().is_file() {
                continue;
            }
            if item.path() == entry_root.join(METADATA_FILE) {
                continue;
            }
            if let Ok(rel) = item.path().strip_prefix(&entry_root) {
                files.push((item.path().to_path_buf(), rel.to_path_buf()));
            }
        }
        Ok(files)
    })
    .await
    .map_err(io::Error::other)??;

    let mut copied = 0;
    for (source, rel) in files {
        let dest = target_root.join(&rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source, &dest).await?;
        progress.update_bytes_processed(bytes);
        copied += bytes;
    }
    Ok(copied)
}
