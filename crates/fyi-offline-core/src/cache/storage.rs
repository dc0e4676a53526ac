use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::models::{RequestKey, Response};

/// A set of named cache buckets.
///
/// Implementations serialize their own per-key operations: a `put` is
/// atomic per key and the last write for a key wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Names of all existing buckets.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a bucket and everything in it. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Store a response, creating the bucket on first write.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Request keys stored in a bucket; empty if the bucket does not exist.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// A storage handle scoped to one bucket.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl Cache {
    pub fn new(storage: Arc<dyn CacheStorage>, name: impl Into<String>) -> Self {
        Self {
            storage,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub async fn open(&self) -> Result<()> {
        self.storage.open(&self.name).await
    }

    pub async fn match_entry(&self, key: &RequestKey) -> Result<Option<Response>> {
        self.storage.match_entry(&self.name, key).await
    }

    /// Lookup that treats a read failure as a miss.
    pub async fn lookup(&self, key: &RequestKey) -> Option<Response> {
        match self.match_entry(key).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(cache = %self.name, key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
        self.storage.put(&self.name, key, response).await
    }

    /// Best-effort write; failures are logged and dropped.
    pub async fn put_quietly(&self, key: &RequestKey, response: &Response) {
        if let Err(e) = self.put(key, response).await {
            debug!(cache = %self.name, key = %key, error = %e, "Cache write failed");
        }
    }

    pub async fn entries(&self) -> Result<Vec<RequestKey>> {
        self.storage.entries(&self.name).await
    }
}

/// A cache write the host performs after the response has been handed back.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub cache_name: String,
    pub key: RequestKey,
    pub response: Response,
}

impl PendingWrite {
    pub fn new(cache_name: impl Into<String>, key: RequestKey, response: Response) -> Self {
        Self {
            cache_name: cache_name.into(),
            key,
            response,
        }
    }

    /// Apply the write. Failures are ignored; the caller already has its response.
    pub async fn commit(self, storage: &dyn CacheStorage) {
        if let Err(e) = storage.put(&self.cache_name, &self.key, &self.response).await {
            debug!(cache = %self.cache_name, key = %self.key, error = %e, "Background cache write failed");
        }
    }
}
