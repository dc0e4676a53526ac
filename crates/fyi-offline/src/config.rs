//! Host configuration management.
//!
//! This module handles loading the proxy configuration: the upstream app
//! origin, the listen address, and cache/log locations.
//!
//! Configuration is stored at `~/.config/fyi-offline/config.json`.
//! Environment variables (optionally from `.env`) override the file.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fyi_offline_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fyi-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the news app is served from when nothing is configured.
const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Local address the proxy listens on when nothing is configured.
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

const ENV_ORIGIN: &str = "FYI_ORIGIN";
const ENV_LISTEN: &str = "FYI_LISTEN";
const ENV_CACHE_DIR: &str = "FYI_CACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub origin: Option<String>,
    pub listen_addr: Option<String>,
    /// Overrides the built-in cache bucket name.
    pub cache_version: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// Write logs to daily files here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(origin) = lookup(ENV_ORIGIN) {
            self.origin = Some(origin);
        }
        if let Some(listen) = lookup(ENV_LISTEN) {
            self.listen_addr = Some(listen);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn origin(&self) -> Result<Url> {
        let raw = self.origin.as_deref().unwrap_or(DEFAULT_ORIGIN);
        let url = Url::parse(raw).with_context(|| format!("Invalid origin: {}", raw))?;
        if url.host_str().is_none() {
            anyhow::bail!("Origin has no host: {}", raw);
        }
        Ok(url)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        raw.parse()
            .with_context(|| format!("Invalid listen address: {}", raw))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let config = WorkerConfig::default();
        match self.cache_version {
            Some(ref name) => config.with_cache_name(name.clone()),
            None => config,
        }
    }
}
