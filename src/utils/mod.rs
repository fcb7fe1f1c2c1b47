//! Utility modules for the backup engine.

pub mod checksum;
pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
