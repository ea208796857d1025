use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::CacheConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::models::Article;

/// On-disk record: the article plus the URL it was stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub cached_at: DateTime<Utc>,
    pub article: Article,
}

/// Durable article cache, one JSON file per URL.
///
/// Files are named by the SHA-256 of the normalized URL. Writes go through a
/// temporary file and a rename, so racing writers on one key are
/// last-write-wins and readers never see a torn file.
pub struct ContentCache {
    dir: PathBuf,
    ttl: Option<Duration>,
    max_entries: Option<usize>,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: None,
            max_entries: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Build from config and make sure the cache directory exists.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        let cache = Self::new(&config.dir)
            .with_ttl(config.ttl_seconds.map(Duration::from_secs))
            .with_max_entries(config.max_entries);
        tokio::fs::create_dir_all(&cache.dir)
            .await
            .with_context(|| format!("Failed to create cache directory: {}", cache.dir.display()))?;
        Ok(cache)
    }

    /// Storage key for a URL: hex SHA-256 of its normalized form.
    pub fn cache_key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize_url(url).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::cache_key(url)))
    }

    /// Cached article for `url`, if present and not expired.
    pub async fn get(&self, url: &str) -> Result<Option<Article>> {
        let path = self.entry_path(url);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache entry: {}", path.display()))
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = %url, "cache: discarding unreadable entry: {}", e);
                return Ok(None);
            }
        };

        if normalize_url(&entry.url) != normalize_url(url) {
            warn!(url = %url, stored = %entry.url, "cache: key collision, treating as miss");
            return Ok(None);
        }

        if let Some(ttl) = self.ttl {
            let age = Utc::now().signed_duration_since(entry.cached_at);
            if age.to_std().map(|age| age > ttl).unwrap_or(false) {
                debug!(url = %url, "cache: entry expired");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), "cache: failed to remove expired entry: {}", e);
                }
                return Ok(None);
            }
        }

        Ok(Some(entry.article))
    }

    /// Store an article. Overwrites any previous entry for the same URL.
    pub async fn put(&self, url: &str, article: &Article) -> Result<()> {
        let entry = CacheEntry {
            url: url.to_string(),
            cached_at: Utc::now(),
            article: article.clone(),
        };
        let bytes = serde_json::to_vec(&entry).context("Failed to serialize cache entry")?;

        let path = self.entry_path(url);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", Self::cache_key(url), uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cache entry into place: {}", path.display()))?;

        if let Some(max) = self.max_entries {
            self.evict_oldest(max, &path).await?;
        }
        Ok(())
    }

    /// Number of stored entries.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entry_paths().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list cache directory: {}", self.dir.display()))?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Remove the entries with the oldest `cached_at` until at most `max`
    /// remain. `keep` is never evicted.
    async fn evict_oldest(&self, max: usize, keep: &Path) -> Result<()> {
        let paths = self.entry_paths().await?;
        if paths.len() <= max {
            return Ok(());
        }
        let excess = paths.len() - max;

        let mut aged = Vec::with_capacity(paths.len());
        for path in paths {
            if path.as_path() == keep {
                continue;
            }
            aged.push((stored_at(&path).await, path));
        }
        aged.sort();

        for (_, path) in aged.into_iter().take(excess) {
            debug!(path = %path.display(), "cache: evicting entry");
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), "cache: eviction failed: {}", e);
            }
        }
        Ok(())
    }
}

/// `cached_at` of a stored entry; unreadable entries sort first.
async fn stored_at(path: &Path) -> DateTime<Utc> {
    let unreadable = DateTime::<Utc>::from(SystemTime::UNIX_EPOCH);
    match tokio::fs::read(path).await {
        Ok(data) => serde_json::from_slice::<CacheEntry>(&data)
            .map(|entry| entry.cached_at)
            .unwrap_or(unreadable),
        Err(_) => unreadable,
    }
}

/// Trimmed URL with lowercase scheme/host and no fragment.
fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}
