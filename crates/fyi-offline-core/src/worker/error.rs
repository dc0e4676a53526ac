use thiserror::Error;

use crate::fetch::FetchError;

/// Install failed; nothing was written to the bucket.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Seed fetch failed for {url}: {source}")]
    SeedFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Seed fetch for {url} returned status {status}")]
    SeedStatus { url: String, status: u16 },

    #[error("Cache storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlMessageError {
    #[error("Unknown control message: {0}")]
    Unknown(String),
}
