//! Read-only row sources backing the export pipeline.
//!
//! The engine never talks to a database directly; each backed domain is
//! consumed through a small trait offering a row count and an ordered row
//! stream. [`MemoryStore`] implements every trait over plain vectors and is
//! what the test suite (and database-less embedders) hand to the
//! orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::utils::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of the entity/tag join table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTagRecord {
    pub tag_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub key: String,
    pub value: serde_json::Value,
    pub scope: String,
}

/// Topic rows, most recent first.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn count(&self) -> Result<u64>;
    fn stream(&self) -> BoxStream<'_, Result<TopicRecord>>;
}

/// Group rows, most recent first.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn count(&self) -> Result<u64>;
    fn stream(&self) -> BoxStream<'_, Result<GroupRecord>>;
}

/// Tag rows plus the entity/tag join table, most recent first.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn count_tags(&self) -> Result<u64>;
    async fn count_entity_tags(&self) -> Result<u64>;
    fn stream_tags(&self) -> BoxStream<'_, Result<TagRecord>>;
    fn stream_entity_tags(&self) -> BoxStream<'_, Result<EntityTagRecord>>;
}

/// Preference rows; small enough to fetch in one call.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn count(&self) -> Result<u64>;
    async fn fetch_all(&self) -> Result<Vec<PreferenceRecord>>;
}

/// The row sources handed to an orchestrator, one per backed domain.
#[derive(Clone)]
pub struct Stores {
    pub topics: Arc<dyn TopicStore>,
    pub groups: Arc<dyn GroupStore>,
    pub tags: Arc<dyn TagStore>,
    pub preferences: Arc<dyn PreferenceStore>,
}

/// In-memory row source over plain vectors.
///
/// Rows are yielded in the order they were inserted; callers are expected to
/// insert them pre-sorted by recency when that matters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub topics: Vec<TopicRecord>,
    pub groups: Vec<GroupRecord>,
    pub tags: Vec<TagRecord>,
    pub entity_tags: Vec<EntityTagRecord>,
    pub preferences: Vec<PreferenceRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this store in a [`Stores`] bundle, sharing one allocation across
    /// all four trait objects.
    pub fn into_stores(self) -> Stores {
        let shared = Arc::new(self);
        Stores {
            topics: shared.clone(),
            groups: shared.clone(),
            tags: shared.clone(),
            preferences: shared,
        }
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.topics.len() as u64)
    }

    fn stream(&self) -> BoxStream<'_, Result<TopicRecord>> {
        stream::iter(self.topics.clone().into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.groups.len() as u64)
    }

    fn stream(&self) -> BoxStream<'_, Result<GroupRecord>> {
        stream::iter(self.groups.clone().into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn count_tags(&self) -> Result<u64> {
        Ok(self.tags.len() as u64)
    }

    async fn count_entity_tags(&self) -> Result<u64> {
        Ok(self.entity_tags.len() as u64)
    }

    fn stream_tags(&self) -> BoxStream<'_, Result<TagRecord>> {
        stream::iter(self.tags.clone().into_iter().map(Ok)).boxed()
    }

    fn stream_entity_tags(&self) -> BoxStream<'_, Result<EntityTagRecord>> {
        stream::iter(self.entity_tags.clone().into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.preferences.len() as u64)
    }

    async fn fetch_all(&self) -> Result<Vec<PreferenceRecord>> {
        Ok(self.preferences.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str) -> TopicRecord {
        TopicRecord {
            id: id.to_string(),
            name: format!("topic {id}"),
            group_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_counts() {
        let store = MemoryStore {
            topics: vec![topic("a"), topic("b")],
            ..Default::default()
        };
        assert_eq!(TopicStore::count(&store).await.unwrap(), 2);
        assert_eq!(GroupStore::count(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_preserves_insertion_order() {
        let store = MemoryStore {
            topics: vec![topic("newest"), topic("older"), topic("oldest")],
            ..Default::default()
        };
        let ids: Vec<String> = TopicStore::stream(&store)
            .map(|row| row.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["newest", "older", "oldest"]);
    }

    #[tokio::test]
    async fn test_into_stores_shares_the_same_data() {
        let store = MemoryStore {
            tags: vec![TagRecord {
                id: "t1".to_string(),
                name: "rust".to_string(),
                color: Some("#dea584".to_string()),
                created_at: Utc::now(),
            }],
            ..Default::default()
        };
        let stores = store.into_stores();
        assert_eq!(stores.tags.count_tags().await.unwrap(), 1);
        assert_eq!(stores.preferences.count().await.unwrap(), 0);
    }
}
