//! SHA-256 helpers for export files.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::utils::errors::Result;

const READ_BUFFER_SIZE: usize = 8192;

/// Compute the hex-encoded SHA-256 digest of a single file.
pub async fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_into(path, &mut hasher).await?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compute one hex-encoded SHA-256 digest over the concatenated bytes of
/// several files, in the order given.
pub async fn files_sha256(paths: &[&Path]) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        hash_into(path, &mut hasher).await?;
    }
    Ok(hex::encode(hasher.finalize()))
}

async fn hash_into(path: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut file = File::open(path).await?;
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[tokio::test]
    async fn test_empty_file_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        tokio::fs::write(&path, b"").await.unwrap();

        let digest = file_sha256(&path).await.unwrap();
        assert_eq!(digest, EMPTY_SHA256);
    }

    #[tokio::test]
    async fn test_known_content_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        tokio::fs::write(&path, b"backup").await.unwrap();

        let digest = file_sha256(&path).await.unwrap();
        let expected = hex::encode(Sha256::digest(b"backup"));
        assert_eq!(digest, expected);
    }

    #[tokio::test]
    async fn test_concatenated_digest_matches_single_stream() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        tokio::fs::write(&first, b"hello ").await.unwrap();
        tokio::fs::write(&second, b"world").await.unwrap();

        let combined = files_sha256(&[first.as_path(), second.as_path()])
            .await
            .unwrap();
        let expected = hex::encode(Sha256::digest(b"hello world"));
        assert_eq!(combined, expected);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(file_sha256(&path).await.is_err());
    }
}
