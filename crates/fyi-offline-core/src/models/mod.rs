//! Request and response snapshots passed between the host, the policy
//! code and the cache store.
//!
//! - `Request`, `RequestMode`, `RequestKey`: an intercepted request and its cache identity
//! - `Response`, `ResponseType`: a captured or synthesized response

pub mod request;
pub mod response;

pub use request::{Request, RequestKey, RequestMode};
pub use response::{Response, ResponseType};
