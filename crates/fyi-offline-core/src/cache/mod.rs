//! Cache storage for offline access.
//!
//! This module provides the `CacheStorage` trait, a set of named buckets
//! mapping request identity to a captured response, and two stores:
//! - `MemoryCacheStorage`: process-local, used by tests and ephemeral hosts
//! - `DiskCacheStorage`: one directory per bucket, one file per entry
//!
//! `Cache` scopes a storage handle to a single bucket name, and
//! `PendingWrite` carries a write the host commits after responding.

pub mod disk;
pub mod memory;
pub mod storage;

pub use disk::{BucketSummary, CachedData, DiskCacheStorage};
pub use memory::MemoryCacheStorage;
pub use storage::{Cache, CacheStorage, PendingWrite};
