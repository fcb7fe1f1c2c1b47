use crate::domain::BackupDomain;
use crate::exporter::writer::export_rows;
use crate::exporter::{ExportContext, ExportResult};
use crate::store::TopicStore;
use crate::utils::errors::Result;

/// Stream every topic record into `topics/topics.<ext>`.
pub(crate) async fn export(store: &dyn TopicStore, ctx: &ExportContext) -> Result<ExportResult> {
    let total = store.count().await?;
    export_rows(BackupDomain::Topics, total, store.stream(), ctx).await
}
