use thiserror::Error;

/// A fetch that produced no response at all.
///
/// HTTP error statuses are not errors here; they come back as a `Response`.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Host unreachable: {0}")]
    Unreachable(String),
}
