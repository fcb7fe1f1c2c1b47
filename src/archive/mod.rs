//! Archive creation behind a narrow trait so the orchestrator never touches
//! a zip API directly.

pub mod zip;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::utils::errors::Result;

pub use self::zip::ZipCompressor;

/// Invoked with the number of compressed bytes each write produced.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[async_trait]
pub trait Compressor: Send + Sync {
    /// Pack `source`'s entire tree into a new archive at `archive`.
    /// Returns the finished archive's size in bytes. The archive file is
    /// durable (fsynced) before this returns.
    async fn compress_directory(
        &self,
        source: &Path,
        archive: &Path,
        level: u32,
        on_bytes: ProgressCallback,
    ) -> Result<u64>;
}
