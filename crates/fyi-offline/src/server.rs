// Axum host adapter: turns local HTTP requests into worker requests and back.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Request as HttpRequest, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
    Json, Router,
};
use fyi_offline_core::fetch::client::is_hop_by_hop;
use fyi_offline_core::{
    CacheStorage, ControlMessage, Disposition, Fetcher, Registration, Request, RequestMode,
    Response, WorkerState,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// Largest request body forwarded upstream (8 MB).
const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

pub struct AppState {
    pub registration: Arc<Registration>,
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub origin: Url,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/__fyi/message", post(message_handler))
        .route("/__fyi/status", get(status_handler))
        .fallback(proxy_handler)
        .with_state(state)
}

pub struct ProxyServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProxyServer {
    /// Serve on an already-bound listener until `shutdown` is called.
    pub fn start(listener: TcpListener, state: SharedState) -> Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Proxy server stopped with error");
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Origin-form URIs belong to the app; absolute-form URIs (forward-proxy
/// use, e.g. font hosts) are taken as-is.
fn resolve_url(origin: &Url, uri: &Uri) -> Result<Url> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).with_context(|| format!("Invalid request URI: {}", uri));
    }
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    origin
        .join(path)
        .with_context(|| format!("Invalid request path: {}", path))
}

async fn to_worker_request(origin: &Url, req: HttpRequest) -> Result<Request> {
    let (parts, body) = req.into_parts();
    let url = resolve_url(origin, &parts.uri)?;

    let mode = parts
        .headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_fetch_mode)
        .unwrap_or_else(|| {
            if url.origin() == origin.origin() {
                RequestMode::SameOrigin
            } else {
                RequestMode::NoCors
            }
        });

    let body = to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .context("Failed to read request body")?;

    let mut request = Request::new(parts.method, url).with_mode(mode).with_body(body);
    request.headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Ok(request)
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::builder().status(status);
    for (name, value) in &response.headers {
        // Body length is recomputed from the snapshot
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => debug!(header = %name, "Dropping malformed response header"),
        }
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
}

async fn proxy_handler(State(state): State<SharedState>, req: HttpRequest) -> HttpResponse {
    let request = match to_worker_request(&state.origin, req).await {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let outcome = state.registration.handle_request(&request).await;

    if !outcome.pending_writes.is_empty() {
        let storage = state.storage.clone();
        let writes = outcome.pending_writes;
        tokio::spawn(async move {
            for write in writes {
                write.commit(storage.as_ref()).await;
            }
        });
    }

    match outcome.disposition {
        Disposition::Respond(response) => into_http(response),
        Disposition::Passthrough => match state.fetcher.fetch(&request).await {
            Ok(response) => into_http(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Pass-through request failed");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        },
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    state: WorkerState,
    controlling: bool,
    buckets: Vec<String>,
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusReport> {
    let buckets = match state.storage.keys().await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "Failed to list caches");
            Vec::new()
        }
    };
    Json(StatusReport {
        state: state.registration.state().await,
        controlling: state.registration.is_controlling().await,
        buckets,
    })
}

#[derive(Debug, Serialize)]
struct MessageReply {
    state: WorkerState,
}

async fn message_handler(State(state): State<SharedState>, body: String) -> HttpResponse {
    match body.parse::<ControlMessage>() {
        Ok(message) => {
            let worker_state = state.registration.post_message(message).await;
            (StatusCode::ACCEPTED, Json(MessageReply { state: worker_state })).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
