// Shared fakes for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use fyi_offline_core::{
    CacheStorage, FetchError, Fetcher, MemoryCacheStorage, OfflineWorker, Request, Response,
    WorkerConfig,
};

pub const ORIGIN: &str = "https://fyi.example";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Fetcher backed by a fixed route table that can be switched offline.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &Url, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.lock().unwrap().push(request.url.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(request.url.to_string()));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

pub struct Harness {
    pub storage: Arc<MemoryCacheStorage>,
    pub fetcher: Arc<FakeFetcher>,
    pub worker: OfflineWorker,
}

impl Harness {
    pub fn new(config: WorkerConfig) -> Self {
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(FakeFetcher::new());
        let worker = OfflineWorker::new(
            Url::parse(ORIGIN).unwrap(),
            &config,
            storage.clone() as Arc<dyn CacheStorage>,
            fetcher.clone() as Arc<dyn Fetcher>,
        )
        .unwrap();
        Self {
            storage,
            fetcher,
            worker,
        }
    }

    pub fn lean() -> Self {
        Self::new(WorkerConfig::default().with_seed_manifest(["/", "/index.html"]))
    }
}
