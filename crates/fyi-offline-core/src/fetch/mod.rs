//! Network access for the worker.
//!
//! This module provides the `Fetcher` trait the policy code calls for every
//! network round trip, and `HttpFetcher`, its reqwest implementation.
//!
//! A fetch either yields a `Response` (any status) or a `FetchError` when
//! the request never completed: offline, DNS failure, refused connection.

pub mod client;
pub mod error;

pub use client::{Fetcher, HttpFetcher};
pub use error::FetchError;
