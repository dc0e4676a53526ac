//! Request routing policy.
//!
//! Every intercepted request is classified once:
//! - non-GET requests and foreign origins pass through untouched
//! - pages, scripts and stylesheets (`.html`, `.js`, `.css`, `/`) go network-first
//! - everything else (fonts, icons, the manifest) goes cache-first

pub mod strategies;

use url::{Origin, Url};

use crate::models::Request;

pub use strategies::{cache_first, network_first, NetworkFirst};

/// Path suffixes served network-first.
const CORE_ASSET_SUFFIXES: &[&str] = &[".js", ".css", ".html"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    NonGet,
    ForeignOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host forwards the request unchanged.
    Passthrough(PassthroughReason),
    NetworkFirst,
    CacheFirst,
}

/// True for the app shell: the root document and any `.html`, `.js` or `.css` path.
pub fn is_core_asset(path: &str) -> bool {
    path == "/" || CORE_ASSET_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

#[derive(Debug, Clone)]
pub struct RequestClassifier {
    origin: Origin,
    font_hosts: Vec<String>,
}

impl RequestClassifier {
    pub fn new(app_origin: &Url, font_hosts: &[String]) -> Self {
        Self {
            origin: app_origin.origin(),
            font_hosts: font_hosts.to_vec(),
        }
    }

    /// Own origin, or a hostname containing one of the font hosts.
    pub fn is_allowed(&self, url: &Url) -> bool {
        if url.origin() == self.origin {
            return true;
        }
        url.host_str()
            .map(|host| self.font_hosts.iter().any(|h| host.contains(h.as_str())))
            .unwrap_or(false)
    }

    pub fn classify(&self, request: &Request) -> Route {
        if request.method != reqwest::Method::GET {
            return Route::Passthrough(PassthroughReason::NonGet);
        }
        if !self.is_allowed(&request.url) {
            return Route::Passthrough(PassthroughReason::ForeignOrigin);
        }
        if is_core_asset(request.url.path()) {
            Route::NetworkFirst
        } else {
            Route::CacheFirst
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FONT_HOSTS;
    use reqwest::Method;

    fn classifier() -> RequestClassifier {
        let hosts: Vec<String> = FONT_HOSTS.iter().map(|s| s.to_string()).collect();
        RequestClassifier::new(&Url::parse("https://fyi.example").unwrap(), &hosts)
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_is_core_asset() {
        assert!(is_core_asset("/"));
        assert!(is_core_asset("/index.html"));
        assert!(is_core_asset("/app.js"));
        assert!(is_core_asset("/css/style.css"));
        assert!(!is_core_asset("/manifest.json"));
        assert!(!is_core_asset("/fonts/inter.woff2"));
        assert!(!is_core_asset("/stories"));
    }

    #[test]
    fn test_classify_own_origin() {
        let c = classifier();
        assert_eq!(c.classify(&get("https://fyi.example/")), Route::NetworkFirst);
        assert_eq!(c.classify(&get("https://fyi.example/app.js?v=3")), Route::NetworkFirst);
        assert_eq!(c.classify(&get("https://fyi.example/icon.png")), Route::CacheFirst);
    }

    #[test]
    fn test_classify_font_hosts() {
        let c = classifier();
        assert_eq!(
            c.classify(&get("https://fonts.googleapis.com/css2?family=Inter")),
            Route::CacheFirst
        );
        assert_eq!(
            c.classify(&get("https://fonts.gstatic.com/s/inter/v12/a.woff2")),
            Route::CacheFirst
        );
        assert_eq!(
            c.classify(&get("https://api.fontshare.com/v2/css?f[]=satoshi@400")),
            Route::CacheFirst
        );
    }

    #[test]
    fn test_classify_passthrough() {
        let c = classifier();
        assert_eq!(
            c.classify(&get("https://news.example.org/top.json")),
            Route::Passthrough(PassthroughReason::ForeignOrigin)
        );
        // Same host, different scheme is a different origin
        assert_eq!(
            c.classify(&get("http://fyi.example/app.js")),
            Route::Passthrough(PassthroughReason::ForeignOrigin)
        );
        let post = Request::new(Method::POST, Url::parse("https://fyi.example/app.js").unwrap());
        assert_eq!(c.classify(&post), Route::Passthrough(PassthroughReason::NonGet));
    }
}
