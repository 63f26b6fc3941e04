// Selection persistence - Key/value port and typed access for UI selections
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KEY_PREFIX: &str = "selection:";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String);

    /// Returns whether a value was present.
    async fn remove(&self, key: &str) -> bool;
}

/// What a dashboard user last selected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub metric_type: Option<String>,
}

#[derive(Clone)]
pub struct SelectionService {
    store: Arc<dyn KeyValueStore>,
}

impl SelectionService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored selection for `key`. An unreadable value is treated as absent.
    pub async fn load(&self, key: &str) -> Option<Selection> {
        let raw = self.store.get(&storage_key(key)).await?;
        match serde_json::from_str(&raw) {
            Ok(selection) => Some(selection),
            Err(e) => {
                tracing::warn!("Discarding unreadable selection {}: {}", key, e);
                None
            }
        }
    }

    pub async fn save(&self, key: &str, selection: &Selection) -> anyhow::Result<()> {
        let raw = serde_json::to_string(selection)?;
        self.store.set(&storage_key(key), raw).await;
        Ok(())
    }

    pub async fn clear(&self, key: &str) -> bool {
        self.store.remove(&storage_key(key)).await
    }
}

fn storage_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}
