//! Worker lifecycle.
//!
//! `ServiceWorker` is the set of hooks a host runtime calls: install,
//! activate, every intercepted request, and control messages from the page.
//! `OfflineWorker` implements them against an injected `CacheStorage` and
//! `Fetcher`. `Registration` is the host side: it tracks which lifecycle
//! state the worker is in and only routes requests through it once it
//! controls clients.

pub mod error;
pub mod message;
pub mod registration;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{Cache, CacheStorage, PendingWrite};
use crate::config::WorkerConfig;
use crate::fetch::Fetcher;
use crate::models::{Request, RequestKey, RequestMode, Response};
use crate::policy::{cache_first, network_first, RequestClassifier, Route};

pub use error::{ControlMessageError, InstallError};
pub use message::ControlMessage;
pub use registration::{Registration, WorkerState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub cache_name: String,
    pub seeded: usize,
    /// Ask the host to activate immediately instead of waiting for old clients.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Stale buckets that were removed.
    pub deleted: Vec<String>,
    /// Take control of already-open clients without a reload.
    pub claim_clients: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleDirective {
    SkipWaiting,
}

#[derive(Debug, Clone)]
pub enum Disposition {
    /// Not intercepted; the host sends the request on unchanged.
    Passthrough,
    Respond(Response),
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub disposition: Disposition,
    /// Writes to commit after the response has been returned.
    pub pending_writes: Vec<PendingWrite>,
}

impl RequestOutcome {
    pub fn passthrough() -> Self {
        Self {
            disposition: Disposition::Passthrough,
            pending_writes: Vec::new(),
        }
    }

    pub fn respond(response: Response) -> Self {
        Self {
            disposition: Disposition::Respond(response),
            pending_writes: Vec::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.disposition, Disposition::Passthrough)
    }

    pub fn response(&self) -> Option<&Response> {
        match &self.disposition {
            Disposition::Respond(response) => Some(response),
            Disposition::Passthrough => None,
        }
    }
}

#[async_trait]
pub trait ServiceWorker: Send + Sync {
    async fn on_install(&self) -> Result<InstallOutcome, InstallError>;
    async fn on_activate(&self) -> Result<ActivateOutcome>;
    async fn on_request(&self, request: &Request) -> RequestOutcome;
    fn on_control_message(&self, message: ControlMessage) -> LifecycleDirective;
}

/// The offline cache proxy for one deployed version.
pub struct OfflineWorker {
    cache: Cache,
    fetcher: Arc<dyn Fetcher>,
    classifier: RequestClassifier,
    app_origin: Url,
    seeds: Vec<Url>,
    offline_document: RequestKey,
}

impl OfflineWorker {
    /// Build a worker for the app served from `app_origin`.
    ///
    /// Fails if a seed manifest entry or the offline document does not
    /// resolve to a URL.
    pub fn new(
        app_origin: Url,
        config: &WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let seeds = config
            .seed_manifest
            .iter()
            .map(|seed| {
                app_origin
                    .join(seed)
                    .with_context(|| format!("Invalid seed manifest entry: {}", seed))
            })
            .collect::<Result<Vec<_>>>()?;

        let offline_document = app_origin
            .join(&config.offline_document)
            .with_context(|| format!("Invalid offline document: {}", config.offline_document))?;

        Ok(Self {
            cache: Cache::new(storage, config.cache_name.clone()),
            fetcher,
            classifier: RequestClassifier::new(&app_origin, &config.font_hosts),
            app_origin,
            seeds,
            offline_document: RequestKey::get(&offline_document),
        })
    }

    pub fn cache_name(&self) -> &str {
        self.cache.name()
    }

    fn seed_request(&self, url: &Url) -> Request {
        let mode = if url.origin() == self.app_origin.origin() {
            RequestMode::SameOrigin
        } else {
            RequestMode::Cors
        };
        Request::get(url.clone()).with_mode(mode)
    }

    async fn fetch_seed(&self, url: &Url) -> Result<(RequestKey, Response), InstallError> {
        let request = self.seed_request(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|source| InstallError::SeedFetch {
                url: url.to_string(),
                source,
            })?;
        if !response.is_ok() {
            return Err(InstallError::SeedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok((request.key(), response))
    }
}

#[async_trait]
impl ServiceWorker for OfflineWorker {
    /// Seed the bucket. All seeds are fetched before anything is written,
    /// so a failed fetch leaves the bucket untouched.
    async fn on_install(&self) -> Result<InstallOutcome, InstallError> {
        info!(cache = %self.cache.name(), seeds = self.seeds.len(), "Installing");
        self.cache.open().await?;

        let fetched = try_join_all(self.seeds.iter().map(|url| self.fetch_seed(url))).await?;
        for (key, response) in &fetched {
            self.cache.put(key, response).await?;
        }

        info!(cache = %self.cache.name(), seeded = fetched.len(), "Install complete");
        Ok(InstallOutcome {
            cache_name: self.cache.name().to_string(),
            seeded: fetched.len(),
            skip_waiting: true,
        })
    }

    /// Delete every bucket but the current one. Every deletion is awaited;
    /// a failed one is logged and left for the next activation.
    async fn on_activate(&self) -> Result<ActivateOutcome> {
        let storage = self.cache.storage();
        let stale: Vec<String> = storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != self.cache.name())
            .collect();

        let results = join_all(stale.iter().map(|name| storage.delete(name))).await;
        let deleted: Vec<String> = stale
            .into_iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(existed) => existed.then_some(name),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    None
                }
            })
            .collect();

        info!(cache = %self.cache.name(), deleted = ?deleted, "Activated");
        Ok(ActivateOutcome {
            deleted,
            claim_clients: true,
        })
    }

    async fn on_request(&self, request: &Request) -> RequestOutcome {
        match self.classifier.classify(request) {
            Route::Passthrough(reason) => {
                debug!(url = %request.url, method = %request.method, ?reason, "Not intercepted");
                RequestOutcome::passthrough()
            }
            Route::NetworkFirst => {
                let result = network_first(
                    request,
                    &self.cache,
                    self.fetcher.as_ref(),
                    &self.offline_document,
                )
                .await;
                RequestOutcome {
                    disposition: Disposition::Respond(result.response),
                    pending_writes: result.pending_write.into_iter().collect(),
                }
            }
            Route::CacheFirst => {
                RequestOutcome::respond(cache_first(request, &self.cache, self.fetcher.as_ref()).await)
            }
        }
    }

    fn on_control_message(&self, message: ControlMessage) -> LifecycleDirective {
        match message {
            ControlMessage::SkipWaiting => LifecycleDirective::SkipWaiting,
        }
    }
}
