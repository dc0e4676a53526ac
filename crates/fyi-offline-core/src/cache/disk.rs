use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;
use url::Url;

use super::CacheStorage;
use crate::models::{RequestKey, Response, ResponseType};

/// Extension of a stored entry: one JSON metadata line, then the raw body.
const ENTRY_EXT: &str = "entry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    response_type: ResponseType,
    url: Option<Url>,
}

impl EntryMeta {
    fn into_response(self, body: Bytes) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body,
            response_type: self.response_type,
            url: self.url,
        }
    }
}

/// Cache buckets on disk: `<root>/<bucket>/<sha256(key)>.entry`.
///
/// Each entry is written to a temp file and renamed into place, so a
/// reader sees either the previous entry or the new one.
pub struct DiskCacheStorage {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            bail!("Invalid cache name: {:?}", name);
        }
        Ok(self.root.join(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> Result<PathBuf> {
        let digest = Sha256::digest(key.as_str().as_bytes());
        Ok(self
            .bucket_path(name)?
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXT)))
    }

    fn encode(meta: &CachedData<EntryMeta>, body: &[u8]) -> Result<Vec<u8>> {
        let mut contents = serde_json::to_vec(meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(body);
        Ok(contents)
    }

    fn decode(contents: Vec<u8>) -> Result<(CachedData<EntryMeta>, Bytes)> {
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| anyhow!("Cache entry has no metadata line"))?;
        let meta: CachedData<EntryMeta> = serde_json::from_slice(&contents[..split])
            .context("Failed to parse cache entry metadata")?;
        let body = Bytes::from(contents).slice(split + 1..);
        Ok((meta, body))
    }

    async fn read_entry(path: &Path) -> Result<Option<(CachedData<EntryMeta>, Bytes)>> {
        match fs::read(path).await {
            Ok(contents) => Ok(Some(Self::decode(contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read cache entry: {}", path.display())),
        }
    }

    async fn read_bucket(&self, name: &str) -> Result<Vec<CachedData<EntryMeta>>> {
        let dir = self.bucket_path(name)?;
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut metas = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some((meta, _))) => metas.push(meta),
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        Ok(metas)
    }

    async fn write_then_rename(tmp: &Path, path: &Path, contents: Vec<u8>) -> Result<()> {
        fs::write(tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(tmp, path)
            .await
            .with_context(|| format!("Failed to rename into {}", path.display()))?;
        Ok(())
    }

    /// Entry count and most recent write time for a bucket.
    pub async fn summarize(&self, name: &str) -> Result<BucketSummary> {
        let metas = self.read_bucket(name).await?;
        let newest = metas
            .iter()
            .max_by_key(|m| m.cached_at)
            .map(|m| CachedData {
                data: m.data.key.clone(),
                cached_at: m.cached_at,
            });
        Ok(BucketSummary {
            name: name.to_string(),
            entries: metas.len(),
            newest,
        })
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let dir = self.bucket_path(name)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to open cache: {}", name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut reader = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_dir_all(self.bucket_path(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete cache: {}", name)),
        }
    }

    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        let path = self.entry_path(name, key)?;
        Ok(Self::read_entry(&path)
            .await?
            .filter(|(meta, _)| &meta.data.key == key)
            .map(|(meta, body)| meta.data.into_response(body)))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.open(name).await?;

        let meta = CachedData::new(EntryMeta {
            key: key.clone(),
            status: response.status,
            headers: response.headers.clone(),
            response_type: response.response_type,
            url: response.url.clone(),
        });
        let contents = Self::encode(&meta, &response.body)?;

        let path = self.entry_path(name, key)?;
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.tmp", n));
        if let Err(e) = Self::write_then_rename(&tmp, &path, contents).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.context(format!("Failed to store cache entry: {}", key)));
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self
            .read_bucket(name)
            .await?
            .into_iter()
            .map(|m| m.data.key)
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug)]
pub struct BucketSummary {
    pub name: String,
    pub entries: usize,
    pub newest: Option<CachedData<RequestKey>>,
}

impl BucketSummary {
    pub fn last_written(&self) -> String {
        self.newest
            .as_ref()
            .map(|n| n.age_display())
            .unwrap_or_else(|| "never".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(());
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::days(3);
        assert_eq!(cached.age_display(), "3d ago");
    }

    #[test]
    fn test_cached_data_future_timestamp() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() + Duration::minutes(10);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_encode_decode_binary_body() {
        let meta = CachedData::new(EntryMeta {
            key: RequestKey::get(&Url::parse("https://fonts.gstatic.com/s/inter.woff2").unwrap()),
            status: 200,
            headers: vec![("content-type".into(), "font/woff2".into())],
            response_type: ResponseType::Opaque,
            url: None,
        });
        let body = [0u8, b'\n', 255, 10, 13];
        let contents = DiskCacheStorage::encode(&meta, &body).unwrap();
        let (decoded, decoded_body) = DiskCacheStorage::decode(contents).unwrap();
        assert_eq!(decoded.data.key, meta.data.key);
        assert_eq!(decoded.data.response_type, ResponseType::Opaque);
        assert_eq!(&decoded_body[..], &body[..]);
    }

    #[test]
    fn test_rejects_path_like_cache_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.bucket_path("fyi-v36-lean").is_ok());
        assert!(storage.bucket_path("..").is_err());
        assert!(storage.bucket_path("a/b").is_err());
        assert!(storage.bucket_path("").is_err());
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let key = RequestKey::get(&Url::parse("https://fyi.example/index.html").unwrap());

        // A directory in the entry's place makes the rename fail
        let blocked = storage.entry_path("fyi-v36-lean", &key).unwrap();
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();

        let response = Response::new(200, Bytes::from_static(b"<html>"));
        assert!(storage.put("fyi-v36-lean", &key, &response).await.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(storage.bucket_path("fyi-v36-lean").unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[test]
    fn test_bucket_summary_never_written() {
        let summary = BucketSummary {
            name: "fyi-v36-lean".into(),
            entries: 0,
            newest: None,
        };
        assert_eq!(summary.last_written(), "never");
    }
}
