//! Backup Engine Library
//!
//! Multi-domain backup export engine: streams topics, groups, tags,
//! knowledge metadata and preferences into a checksummed, zip-compressed
//! archive with live progress reporting and cooperative cancellation.

pub mod archive;
pub mod config;
pub mod domain;
pub mod exporter;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::BackupConfig;
pub use domain::BackupDomain;
pub use orchestrator::{BackupOptions, BackupOrchestrator};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
