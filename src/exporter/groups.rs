use crate::domain::BackupDomain;
use crate::exporter::writer::export_rows;
use crate::exporter::{ExportContext, ExportResult};
use crate::store::GroupStore;
use crate::utils::errors::Result;

/// Stream every group record into `groups/groups.<ext>`.
pub(crate) async fn export(store: &dyn GroupStore, ctx: &ExportContext) -> Result<ExportResult> {
    let total = store.count().await?;
    export_rows(BackupDomain::Groups, total, store.stream(), ctx).await
}
