use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// Body returned when neither the network nor the cache can answer.
pub const OFFLINE_BODY: &str = "Offline";

/// Status of the synthesized offline response.
pub const OFFLINE_STATUS: u16 = 503;

/// Where a response came from, mirroring the fetch `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the page is allowed to read.
    Cors,
    /// Cross-origin no-cors response; stored and replayed as-is.
    Opaque,
    /// Synthesized locally.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub url: Option<Url>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            url: None,
        }
    }

    /// The 503 "Offline" stand-in for an unreachable network with no cached copy.
    pub fn offline() -> Self {
        Self::new(OFFLINE_STATUS, OFFLINE_BODY)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_type(ResponseType::Error)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// True for any 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_response() {
        let resp = Response::offline();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.text(), "Offline");
        assert_eq!(resp.header("Content-Type"), Some("text/plain; charset=utf-8"));
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_is_ok_range() {
        assert!(Response::new(200, "").is_ok());
        assert!(Response::new(204, "").is_ok());
        assert!(!Response::new(304, "").is_ok());
        assert!(!Response::new(404, "").is_ok());
    }
}
