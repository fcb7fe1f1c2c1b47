//! Backup manifest construction and integrity checksums.
//!
//! The manifest is the archive's single source of truth: which domains were
//! exported, their statistics and per-domain checksums, plus optional
//! encryption parameters and incremental-chain metadata. Its own `checksum`
//! field is a SHA-256 over the manifest body with that field removed and all
//! object keys sorted, so two manifests with the same logical content hash
//! identically no matter how they were assembled.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::domain::BackupDomain;
use crate::exporter::ExportResult;
use crate::utils::errors::Result;

pub const MANIFEST_VERSION: u32 = 1;

/// Fixed scrypt work factor recorded for later key derivation.
const SCRYPT_N: u32 = 1 << 17;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;

/// Per-domain statistics as they appear in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub item_count: u64,
    pub raw_size: u64,
    pub archived_size: u64,
    pub checksum: String,
}

/// Key-derivation and cipher parameters a consumer needs to decrypt the
/// archive. Holds parameters only, never the password or a derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    pub algorithm: String,
    pub kdf: String,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub salt: String,
    pub iv: String,
    pub tag_length: u32,
}

impl EncryptionInfo {
    /// Fresh random salt and IV per run; parameters are never reused.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        Self {
            algorithm: "AES-256-GCM".to_string(),
            kdf: "scrypt".to_string(),
            n: SCRYPT_N,
            r: SCRYPT_R,
            p: SCRYPT_P,
            salt: BASE64.encode(salt),
            iv: BASE64.encode(iv),
            tag_length: 16,
        }
    }
}

/// Chain metadata for incremental runs. Every run currently records itself
/// as the start of its chain (`sequence` 0, no parent, no change list);
/// diffing against a prior manifest is a future extension point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalManifest {
    pub chain_id: String,
    pub sequence: u32,
    pub parent_checksum: String,
    pub changes: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub platform: String,
    /// Exported domains in the order the run processed them.
    pub domains: Vec<BackupDomain>,
    pub domain_stats: BTreeMap<BackupDomain, DomainStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental: Option<IncrementalManifest>,
    pub checksum: String,
}

impl BackupManifest {
    /// Canonical form used for hashing: the manifest as a JSON value with
    /// the `checksum` field removed. `serde_json`'s object representation
    /// keeps keys sorted, which gives the canonical key order for free.
    fn canonical_body(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("checksum");
        }
        Ok(serde_json::to_string(&value)?)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let body = self.canonical_body()?;
        Ok(hex::encode(Sha256::digest(body.as_bytes())))
    }

    /// True when the embedded checksum still matches the manifest body.
    pub fn verify_checksum(&self) -> Result<bool> {
        Ok(self.compute_checksum()? == self.checksum)
    }
}

/// Folds per-domain [`ExportResult`]s into a [`BackupManifest`].
///
/// The domain list is fixed at construction (the run's resolved order);
/// results may arrive in any order and later results for the same domain
/// replace earlier ones.
pub struct ManifestBuilder {
    domains: Vec<BackupDomain>,
    created_at: DateTime<Utc>,
    app_version: String,
    platform: String,
    results: BTreeMap<BackupDomain, ExportResult>,
    encryption: Option<EncryptionInfo>,
    incremental: Option<IncrementalManifest>,
}

impl ManifestBuilder {
    pub fn new(domains: Vec<BackupDomain>, app_version: &str, platform: &str) -> Self {
        Self {
            domains,
            created_at: Utc::now(),
            app_version: app_version.to_string(),
            platform: platform.to_string(),
            results: BTreeMap::new(),
            encryption: None,
            incremental: None,
        }
    }

    /// Pin the manifest timestamp instead of sampling the clock.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Record encryption parameters for this run. Only the parameters are
    /// stored; key derivation happens wherever the password lives.
    pub fn enable_encryption(&mut self) {
        self.encryption = Some(EncryptionInfo::generate());
    }

    pub fn enable_incremental(&mut self, chain_id: &str) {
        self.incremental = Some(IncrementalManifest {
            chain_id: chain_id.to_string(),
            sequence: 0,
            parent_checksum: String::new(),
            changes: Vec::new(),
            created_at: self.created_at,
        });
    }

    pub fn add_domain_result(&mut self, result: ExportResult) {
        self.results.insert(result.domain, result);
    }

    /// Assemble the manifest and compute its trailing checksum. A requested
    /// domain that never reported a result is simply absent from
    /// `domain_stats`.
    pub fn build(&self) -> Result<BackupManifest> {
        let domain_stats = self
            .results
            .iter()
            .map(|(domain, result)| {
                (
                    *domain,
                    DomainStats {
                        item_count: result.item_count,
                        raw_size: result.raw_size,
                        archived_size: result.compressed_size,
                        checksum: result.checksum.clone(),
                    },
                )
            })
            .collect();

        let mut manifest = BackupManifest {
            version: MANIFEST_VERSION,
            created_at: self.created_at,
            app_version: self.app_version.clone(),
            platform: self.platform.clone(),
            domains: self.domains.clone(),
            domain_stats,
            encryption: self.encryption.clone(),
            incremental: self.incremental.clone(),
            checksum: String::new(),
        };
        manifest.checksum = manifest.compute_checksum()?;
        Ok(manifest)
    }
}
