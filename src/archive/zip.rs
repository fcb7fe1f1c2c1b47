//! Zip implementation of the [`Compressor`] trait.

use async_trait::async_trait;
use chrono::{Datelike, Local, Timelike};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use super::{Compressor, ProgressCallback};
use crate::utils::errors::Result;

const MAX_DEFLATE_LEVEL: u32 = 9;
const ZIP32_LIMIT: u64 = 0xffff_ffff;

/// Streams a directory tree into a zip file on the blocking pool, walking
/// entries in sorted order so identical trees produce identically ordered
/// archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCompressor;

#[async_trait]
impl Compressor for ZipCompressor {
    async fn compress_directory(
        &self,
        source: &Path,
        archive: &Path,
        level: u32,
        on_bytes: ProgressCallback,
    ) -> Result<u64> {
        let source = source.to_path_buf();
        let archive = archive.to_path_buf();
        let size = tokio::task::spawn_blocking(move || {
            write_archive(&source, &archive, level, on_bytes)
        })
        .await
        .map_err(io::Error::other)??;
        Ok(size)
    }
}

/// Counts every byte the zip writer emits and forwards the count to the
/// progress callback. Seeks (central-directory fixups) are passed through
/// uncounted.
struct CountingWriter<W> {
    inner: W,
    on_bytes: ProgressCallback,
}

impl<W> CountingWriter<W> {
    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if written > 0 {
            (self.on_bytes)(written as u64);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for CountingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

fn write_archive(
    source: &Path,
    archive: &Path,
    level: u32,
    on_bytes: ProgressCallback,
) -> Result<u64> {
    let file = File::create(archive)?;
    let mut zip = ZipWriter::new(CountingWriter {
        inner: file,
        on_bytes,
    });

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(source) else {
            continue;
        };
        let name = rel.to_string_lossy().replace('\\', "/");
        if name.is_empty() {
            continue;
        }

        let metadata = entry.metadata().map_err(io::Error::from)?;
        let modified = zip_time(&metadata);

        if metadata.is_dir() {
            let options = FileOptions::<()>::default()
                .compression_method(CompressionMethod::Stored)
                .unix_permissions(0o755)
                .last_modified_time(modified);
            zip.add_directory(&name, options)?;
        } else {
            let mut options = FileOptions::<()>::default()
                .unix_permissions(0o644)
                .large_file(metadata.len() > ZIP32_LIMIT)
                .last_modified_time(modified);
            options = if level == 0 {
                options.compression_method(CompressionMethod::Stored)
            } else {
                options
                    .compression_method(CompressionMethod::Deflated)
                    .compression_level(Some(i64::from(level.min(MAX_DEFLATE_LEVEL))))
            };
            zip.start_file(&name, options)?;
            let mut input = File::open(path)?;
            io::copy(&mut input, &mut zip)?;
        }
    }

    let mut counting = zip.finish()?;
    counting.flush()?;
    let file = counting.into_inner();
    file.sync_all()?;
    let size = file.metadata()?.len();
    debug!("Wrote archive {} ({} bytes)", archive.display(), size);
    Ok(size)
}

fn zip_time(metadata: &std::fs::Metadata) -> ZipDateTime {
    let Ok(modified) = metadata.modified() else {
        return ZipDateTime::default_for_write();
    };
    let local: chrono::DateTime<Local> = modified.into();
    ZipDateTime::from_date_and_time(
        local.year() as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_else(|_| ZipDateTime::default_for_write())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn build_tree(root: &Path) {
        std::fs::create_dir_all(root.join("topics")).unwrap();
        std::fs::write(root.join("manifest.json"), b"{\"version\":1}").unwrap();
        std::fs::write(
            root.join("topics/topics.jsonl"),
            b"{\"id\":\"t1\"}\n{\"id\":\"t2\"}\n",
        )
        .unwrap();
    }

    fn noop() -> ProgressCallback {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_compress_directory_round_trips() {
        let source = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        build_tree(source.path());
        let archive_path = out.path().join("backup.zip");

        let size = ZipCompressor
            .compress_directory(source.path(), &archive_path, 6, noop())
            .await
            .unwrap();
        assert_eq!(size, std::fs::metadata(&archive_path).unwrap().len());

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("topics/topics.jsonl")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.lines().count(), 2);

        content.clear();
        archive
            .by_name("manifest.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "{\"version\":1}");
    }

    #[tokio::test]
    async fn test_level_zero_stores_without_compression() {
        let source = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(source.path().join("data.txt"), b"plain bytes").unwrap();
        let archive_path = out.path().join("stored.zip");

        ZipCompressor
            .compress_directory(source.path(), &archive_path, 0, noop())
            .await
            .unwrap();

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let entry = archive.by_name("data.txt").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
    }

    #[tokio::test]
    async fn test_progress_callback_sees_compressed_bytes() {
        let source = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        build_tree(source.path());
        let archive_path = out.path().join("backup.zip");

        let seen = Arc::new(AtomicU64::new(0));
        let sink = seen.clone();
        let callback: ProgressCallback =
            Arc::new(move |bytes| {
                sink.fetch_add(bytes, Ordering::Relaxed);
            });

        let size = ZipCompressor
            .compress_directory(source.path(), &archive_path, 6, callback)
            .await
            .unwrap();

        let reported = seen.load(Ordering::Relaxed);
        assert!(reported > 0);
        assert!(reported <= size + 1024);
    }

    #[tokio::test]
    async fn test_empty_source_directory_still_produces_an_archive() {
        let source = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("empty.zip");

        ZipCompressor
            .compress_directory(source.path(), &archive_path, 6, noop())
            .await
            .unwrap();

        let archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
