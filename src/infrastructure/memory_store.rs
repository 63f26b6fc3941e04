// In-memory key/value adapter
use crate::application::selection_store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.values.write().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) -> bool {
        self.values.write().await.remove(key).is_some()
    }
}
