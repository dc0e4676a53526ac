//! Worker configuration: bucket version, seed manifest and font allow-list.
//!
//! Bumping [`CACHE_NAME`] is the only way to invalidate everything cached by
//! a previous deploy; the next activation deletes every other bucket.

use serde::{Deserialize, Serialize};

/// Name of the current cache bucket.
pub const CACHE_NAME: &str = "fyi-v36-lean";

/// Assets that must be in the bucket as soon as install completes.
/// Relative entries resolve against the app origin.
pub const SEED_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/app.js",
    "/manifest.json",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;700&display=swap",
    "https://api.fontshare.com/v2/css?f[]=satoshi@400,500,700&display=swap",
];

/// Cross-origin hostnames that are still intercepted (substring match).
pub const FONT_HOSTS: &[&str] = &["fonts.googleapis.com", "fonts.gstatic.com", "fontshare.com"];

/// Substitute document for navigations that fail with nothing cached.
pub const OFFLINE_DOCUMENT: &str = "/index.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub seed_manifest: Vec<String>,
    pub font_hosts: Vec<String>,
    pub offline_document: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            seed_manifest: SEED_MANIFEST.iter().map(|s| s.to_string()).collect(),
            font_hosts: FONT_HOSTS.iter().map(|s| s.to_string()).collect(),
            offline_document: OFFLINE_DOCUMENT.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_seed_manifest<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_manifest = seeds.into_iter().map(Into::into).collect();
        self
    }
}
