use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::BackupDomain;
use crate::exporter::{ExportContext, ExportResult};
use crate::store::PreferenceStore;
use crate::utils::checksum::file_sha256;
use crate::utils::errors::Result;

/// Keys that describe the machine the backup was taken on rather than the
/// user's settings. They never travel with a backup.
const MACHINE_SPECIFIC_KEYS: &[&str] = &[
    "app.window_state",
    "app.window_bounds",
    "app.window_position",
    "app.data_path",
    "app.local_data_path",
];

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "secret",
    "password",
    "token",
    "api_key",
    "apikey",
    "credential",
];

const SENSITIVE_KEY_PREFIXES: &[&str] = &["auth"];

fn is_machine_specific(key: &str) -> bool {
    MACHINE_SPECIFIC_KEYS.contains(&key)
}

fn is_sensitive(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
        || SENSITIVE_KEY_FRAGMENTS
            .iter()
            .any(|fragment| lowered.contains(fragment))
}

/// Export user preferences as a single pretty-printed JSON document grouped
/// by scope. Machine-specific and credential-looking keys are dropped before
/// anything touches disk.
pub(crate) async fn export(
    store: &dyn PreferenceStore,
    ctx: &ExportContext,
) -> Result<ExportResult> {
    let domain = BackupDomain::Preferences;
    let rows = store.fetch_all().await?;
    let total = rows.len();

    let kept: Vec<_> = rows
        .into_iter()
        .filter(|row| !is_machine_specific(&row.key) && !is_sensitive(&row.key))
        .collect();
    ctx.progress.set_domain(domain, kept.len() as u64);
    debug!(
        "Exporting {} of {} preferences ({} filtered)",
        kept.len(),
        total,
        total - kept.len()
    );

    let mut document = Map::new();
    for row in &kept {
        let scope_prefix = format!("{}.", row.scope);
        let scoped_key = row
            .key
            .strip_prefix(&scope_prefix)
            .unwrap_or(&row.key)
            .to_string();
        let scope_object = document
            .entry(row.scope.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = scope_object {
            map.insert(scoped_key, row.value.clone());
        }
        ctx.progress.increment_items_processed(1);
    }

    let dir = ctx.base_dir.join(domain.dir_name());
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = "preferences.json";
    let path = dir.join(file_name);
    let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;
    tokio::fs::write(&path, &bytes).await?;

    let size = tokio::fs::metadata(&path).await?.len();
    ctx.progress.update_bytes_processed(size);
    let checksum = file_sha256(&path).await?;

    Ok(ExportResult {
        domain,
        item_count: kept.len() as u64,
        raw_size: size,
        compressed_size: size,
        checksum,
        data_path: format!("{}/{}", domain.dir_name(), file_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressTracker;
    use crate::store::{MemoryStore, PreferenceRecord};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pref(key: &str, value: Value, scope: &str) -> PreferenceRecord {
        PreferenceRecord {
            key: key.to_string(),
            value,
            scope: scope.to_string(),
        }
    }

    #[test]
    fn test_sensitive_key_detection() {
        assert!(is_sensitive("api_key"));
        assert!(is_sensitive("service.apiKey"));
        assert!(is_sensitive("userCredentialToken"));
        assert!(is_sensitive("auth.provider"));
        assert!(is_sensitive("sync.client_secret"));
        assert!(!is_sensitive("theme.accent"));
        assert!(!is_sensitive("general.language"));
    }

    #[test]
    fn test_machine_specific_key_detection() {
        assert!(is_machine_specific("app.window_state"));
        assert!(is_machine_specific("app.data_path"));
        assert!(!is_machine_specific("app.locale"));
    }

    #[tokio::test]
    async fn test_filtered_keys_never_reach_the_export_file() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.preferences = vec![
            pref("api_key", json!("sk-12345"), "general"),
            pref("userCredentialToken", json!("tok"), "general"),
            pref("theme.accent", json!("#336699"), "theme"),
            pref("app.window_state", json!({"w": 800}), "app"),
        ];
        let stores = store.into_stores();

        let ctx = ExportContext::new(
            dir.path().to_path_buf(),
            Arc::new(ProgressTracker::new()),
        );
        let result = export(stores.preferences.as_ref(), &ctx).await.unwrap();
        assert_eq!(result.item_count, 1);

        let content =
            std::fs::read_to_string(dir.path().join("preferences/preferences.json")).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, json!({"theme": {"accent": "#336699"}}));
        assert!(!content.contains("sk-12345"));
    }

    #[tokio::test]
    async fn test_preferences_are_grouped_by_scope() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.preferences = vec![
            pref("general.language", json!("en"), "general"),
            pref("general.startup", json!(true), "general"),
            pref("theme.mode", json!("dark"), "theme"),
        ];
        let stores = store.into_stores();

        let ctx = ExportContext::new(
            dir.path().to_path_buf(),
            Arc::new(ProgressTracker::new()),
        );
        export(stores.preferences.as_ref(), &ctx).await.unwrap();

        let parsed: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("preferences/preferences.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            parsed,
            json!({
                "general": {"language": "en", "startup": true},
                "theme": {"mode": "dark"}
            })
        );
    }

    #[tokio::test]
    async fn test_empty_preference_store_writes_an_empty_document() {
        let dir = TempDir::new().unwrap();
        let stores = MemoryStore::new().into_stores();

        let ctx = ExportContext::new(
            dir.path().to_path_buf(),
            Arc::new(ProgressTracker::new()),
        );
        let result = export(stores.preferences.as_ref(), &ctx).await.unwrap();

        assert_eq!(result.item_count, 0);
        let parsed: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("preferences/preferences.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(parsed, json!({}));
    }
}
