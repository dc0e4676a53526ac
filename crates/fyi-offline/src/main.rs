//! fyi-offline - a local offline-caching proxy for the fyi news reader.
//!
//! Serves the app through a versioned cache: pages, scripts and styles come
//! from the network when it is reachable and from the cache when it is not;
//! fonts and other static assets come from the cache first.

mod config;
mod server;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fyi_offline_core::{
    CacheStorage, ControlMessage, DiskCacheStorage, HttpFetcher, OfflineWorker, Registration,
    WorkerState,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use config::Config;
use server::{AppState, ProxyServer};

// ============================================================================
// Constants
// ============================================================================

/// Log filter used when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "info";

/// File name prefix for daily log files
const LOG_FILE_PREFIX: &str = "fyi-offline.log";

/// Initialize the tracing subscriber for logging.
/// Returns the appender guard when logging to files; it must outlive main.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=fyi_offline_core=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?.with_overrides(|key| std::env::var(key).ok());
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve(&config).await,
        Some("--seed") => seed(&config).await,
        Some("--status") => print_status(&config).await,
        Some(other) => anyhow::bail!(
            "Unknown argument: {} (expected serve, --seed or --status)",
            other
        ),
    }
}

struct Host {
    origin: Url,
    storage: Arc<DiskCacheStorage>,
    fetcher: Arc<HttpFetcher>,
    registration: Arc<Registration>,
}

async fn build_host(config: &Config) -> Result<Host> {
    let origin = config.origin()?;
    let worker_config = config.worker_config();

    let storage = Arc::new(DiskCacheStorage::new(config.cache_dir()?)?);
    let fetcher = Arc::new(HttpFetcher::new(&origin)?);

    // Any other bucket on disk means an older version served clients before
    let has_predecessor = storage
        .keys()
        .await
        .context("Failed to list caches")?
        .iter()
        .any(|name| *name != worker_config.cache_name);
    // Entries in the current bucket mean this version was activated by an earlier run
    let resumed = !storage
        .entries(&worker_config.cache_name)
        .await
        .context("Failed to read current cache")?
        .is_empty();

    let worker = Arc::new(OfflineWorker::new(
        origin.clone(),
        &worker_config,
        storage.clone(),
        fetcher.clone(),
    )?);
    let registration = if resumed {
        info!(cache = %worker_config.cache_name, "Resuming cached version");
        Registration::resume(worker)
    } else {
        Registration::new(worker, has_predecessor)
    };

    Ok(Host {
        origin,
        storage,
        fetcher,
        registration: Arc::new(registration),
    })
}

async fn serve(config: &Config) -> Result<()> {
    let host = build_host(config).await?;
    info!(origin = %host.origin, cache_dir = %host.storage.root().display(), "fyi-offline starting");

    // A resumed version keeps serving from its cache when install fails;
    // a fresh one becomes redundant and requests pass through
    if let Err(e) = host.registration.install().await {
        if host.registration.is_controlling().await {
            warn!(error = %e, "Install failed, serving from existing cache");
        } else {
            error!(error = %e, "Install failed, serving without offline cache");
        }
    }

    let listener = TcpListener::bind(config.listen_addr()?)
        .await
        .context("Failed to bind listen address")?;
    let state = Arc::new(AppState {
        registration: host.registration,
        storage: host.storage,
        fetcher: host.fetcher,
        origin: host.origin,
    });
    let server = ProxyServer::start(listener, state)?;
    info!(addr = %server.addr(), "Listening");

    tokio::signal::ctrl_c().await?;
    info!("fyi-offline shutting down");
    server.shutdown().await;
    Ok(())
}

/// Install and activate the current version, then exit.
async fn seed(config: &Config) -> Result<()> {
    let host = build_host(config).await?;
    let mut state = host.registration.install().await.context("Install failed")?;

    // An explicit seed run takes over from any older version right away
    if state == WorkerState::Installed {
        state = host.registration.post_message(ControlMessage::SkipWaiting).await;
    }

    eprintln!(
        "Seeded {} into {} ({:?})",
        config.worker_config().cache_name,
        host.storage.root().display(),
        state
    );
    Ok(())
}

/// Print every cache bucket with its entry count and last write.
async fn print_status(config: &Config) -> Result<()> {
    let storage = DiskCacheStorage::new(config.cache_dir()?)?;
    let current = config.worker_config().cache_name;

    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No caches in {}", storage.root().display());
        return Ok(());
    }

    for name in names {
        let summary = storage.summarize(&name).await?;
        let marker = if name == current { "*" } else { " " };
        println!(
            "{} {:<24} {:>5} entries   last written {}",
            marker,
            summary.name,
            summary.entries,
            summary.last_written()
        );
    }
    Ok(())
}
