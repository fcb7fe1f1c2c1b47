//! Buffered row writer shared by the streaming exporters.
//!
//! Writes either line-delimited JSON or a single JSON array depending on the
//! run's [`ExportFormat`], accounting for every byte it emits. The file is
//! flushed and fsynced before any caller may treat it as finished.

use futures_util::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::domain::BackupDomain;
use crate::exporter::{ExportContext, ExportFormat, ExportResult};
use crate::utils::checksum::file_sha256;
use crate::utils::errors::Result;

/// Totals for one finished row file.
pub(crate) struct RowFileStats {
    pub rows: u64,
    pub raw_bytes: u64,
    pub file_size: u64,
}

pub(crate) struct RowWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    format: ExportFormat,
    rows: u64,
    raw_bytes: u64,
}

impl RowWriter {
    pub async fn create(path: &Path, format: ExportFormat) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            format,
            rows: 0,
            raw_bytes: 0,
        })
    }

    /// Serialize one row and write it; returns the bytes written for the
    /// row including its delimiters.
    pub async fn write_row<T: Serialize>(&mut self, row: &T) -> Result<u64> {
        let json = serde_json::to_string(row)?;
        let written = match self.format {
            ExportFormat::Jsonl => {
                self.writer.write_all(json.as_bytes()).await?;
                self.writer.write_all(b"\n").await?;
                json.len() as u64 + 1
            }
            ExportFormat::Json => {
                let lead: &[u8] = if self.rows == 0 { b"[\n" } else { b",\n" };
                self.writer.write_all(lead).await?;
                self.writer.write_all(json.as_bytes()).await?;
                json.len() as u64 + lead.len() as u64
            }
        };
        self.rows += 1;
        self.raw_bytes += written;
        Ok(written)
    }

    /// Close delimiters, flush, fsync, and stat the finished file.
    pub async fn finish(mut self) -> Result<RowFileStats> {
        if self.format == ExportFormat::Json {
            let tail: &[u8] = if self.rows == 0 { b"[]\n" } else { b"\n]\n" };
            self.writer.write_all(tail).await?;
            self.raw_bytes += tail.len() as u64;
        }
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        let file_size = tokio::fs::metadata(&self.path).await?.len();
        Ok(RowFileStats {
            rows: self.rows,
            raw_bytes: self.raw_bytes,
            file_size,
        })
    }
}

/// Stream one domain's rows into its file under the work directory and
/// assemble the [`ExportResult`]. The single-file streaming exporters are
/// thin wrappers around this.
pub(crate) async fn export_rows<T: Serialize>(
    domain: BackupDomain,
    total: u64,
    mut rows: BoxStream<'_, Result<T>>,
    ctx: &ExportContext,
) -> Result<ExportResult> {
    ctx.progress.set_domain(domain, total);

    let dir = ctx.base_dir.join(domain.dir_name());
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}.{}", domain.dir_name(), ctx.options.format.extension());
    let path = dir.join(&file_name);

    let mut writer = RowWriter::create(&path, ctx.options.format).await?;
    while let Some(row) = rows.next().await {
        let row = row?;
        let written = writer.write_row(&row).await?;
        ctx.progress.increment_items_processed(1);
        ctx.progress.update_bytes_processed(written);
    }
    let stats = writer.finish().await?;
    let checksum = file_sha256(&path).await?;

    debug!(
        "Exported {} {} rows ({} bytes on disk)",
        stats.rows, domain, stats.file_size
    );
    Ok(ExportResult {
        domain,
        item_count: stats.rows,
        raw_size: stats.raw_bytes,
        compressed_size: stats.file_size,
        checksum,
        data_path: format!("{}/{}", domain.dir_name(), file_name),
    })
}
