use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::models::{RequestKey, Response};

type Bucket = BTreeMap<RequestKey, Response>;

/// Process-local cache storage.
#[derive(Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<BTreeMap<String, Bucket>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.buckets.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.write().await.remove(name).is_some())
    }

    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(name)
            .and_then(|bucket| bucket.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(name)
            .map(|bucket| bucket.keys().cloned().collect())
            .unwrap_or_default())
    }
}
