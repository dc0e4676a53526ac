//! Core library for fyi-offline.
//!
//! An offline-caching layer for the fyi news reader. Every outgoing request
//! is classified once, then served network-first (pages, scripts, styles) or
//! cache-first (fonts and other static assets) against a single versioned
//! cache bucket that is seeded at install time and pruned at activation.
//!
//! - [`models`]: request and response snapshots
//! - [`cache`]: the `CacheStorage` seam with in-memory and on-disk stores
//! - [`fetch`]: the `Fetcher` seam and its reqwest implementation
//! - [`policy`]: request classification and the two serving strategies
//! - [`worker`]: the lifecycle hooks and the host-side `Registration`

pub mod cache;
pub mod config;
pub mod fetch;
pub mod models;
pub mod policy;
pub mod worker;

pub use cache::{Cache, CacheStorage, DiskCacheStorage, MemoryCacheStorage, PendingWrite};
pub use config::WorkerConfig;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use models::{Request, RequestKey, RequestMode, Response, ResponseType};
pub use worker::{
    ControlMessage, Disposition, OfflineWorker, Registration, RequestOutcome, ServiceWorker,
    WorkerState,
};
