use futures_util::StreamExt;

use crate::domain::BackupDomain;
use crate::exporter::writer::RowWriter;
use crate::exporter::{ExportContext, ExportResult};
use crate::store::TagStore;
use crate::utils::checksum::files_sha256;
use crate::utils::errors::Result;

/// Export tag definitions and entity-tag assignments as two files under
/// `tags/`. The domain checksum is computed over both files in order, so a
/// change to either invalidates it.
pub(crate) async fn export(store: &dyn TagStore, ctx: &ExportContext) -> Result<ExportResult> {
    let domain = BackupDomain::Tags;
    let tag_total = store.count_tags().await?;
    let assignment_total = store.count_entity_tags().await?;
    ctx.progress.set_domain(domain, tag_total + assignment_total);

    let dir = ctx.base_dir.join(domain.dir_name());
    tokio::fs::create_dir_all(&dir).await?;
    let ext = ctx.options.format.extension();
    let tags_name = format!("tags.{ext}");
    let assignments_name = format!("entity-tags.{ext}");
    let tags_path = dir.join(&tags_name);
    let assignments_path = dir.join(&assignments_name);

    let mut writer = RowWriter::create(&tags_path, ctx.options.format).await?;
    let mut rows = store.stream_tags();
    while let Some(row) = rows.next().await {
        let written = writer.write_row(&row?).await?;
        ctx.progress.increment_items_processed(1);
        ctx.progress.update_bytes_processed(written);
    }
    let tag_stats = writer.finish().await?;

    let mut writer = RowWriter::create(&assignments_path, ctx.options.format).await?;
    let mut rows = store.stream_entity_tags();
    while let Some(row) = rows.next().await {
        let written = writer.write_row(&row?).await?;
        ctx.progress.increment_items_processed(1);
        ctx.progress.update_bytes_processed(written);
    }
    let assignment_stats = writer.finish().await?;

    let checksum = files_sha256(&[tags_path.as_path(), assignments_path.as_path()]).await?;

    Ok(ExportResult {
        domain,
        item_count: tag_stats.rows + assignment_stats.rows,
        raw_size: tag_stats.raw_bytes + assignment_stats.raw_bytes,
        compressed_size: tag_stats.file_size + assignment_stats.file_size,
        checksum,
        data_path: format!("{}/{}", domain.dir_name(), tags_name),
    })
}
