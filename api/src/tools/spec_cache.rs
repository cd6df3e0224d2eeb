//! Disk cache for OpenAPI documents fetched from tool upstreams.
//!
//! Remote documents are cached under a content-addressed name (sha256 of
//! the source URL) with a sidecar metadata file recording when they were
//! fetched. Local file sources are read directly and never cached.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_core::auth::sha256_hex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<SpecError> for AppError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => AppError::NotFound {
                message: "No OpenAPI document exists at the configured path".to_string(),
                docs_hint: None,
            },
            SpecError::Io(e) => AppError::Internal(format!("spec cache io error: {e}")),
            SpecError::Http(e) => AppError::BadGateway {
                message: format!("Failed to fetch OpenAPI document: {e}"),
            },
            SpecError::Parse(e) => AppError::BadGateway {
                message: format!("OpenAPI document is not valid JSON: {e}"),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    source: String,
    /// Unix seconds at fetch time.
    cached_at: u64,
}

pub struct SpecCache {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl SpecCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Resolve a spec source — `http(s)` URLs go through the disk cache
    /// with the given freshness window, anything else is read as a local
    /// file path.
    pub async fn load(
        &self,
        source: &str,
        ttl: Duration,
    ) -> Result<serde_json::Value, SpecError> {
        if is_url(source) {
            self.load_url(source, ttl).await
        } else {
            let raw = tokio::fs::read_to_string(source).await?;
            Ok(serde_json::from_str(&raw)?)
        }
    }

    /// Drop cached documents: one source, or everything when `None`.
    pub async fn clear(&self, source: Option<&str>) -> Result<(), SpecError> {
        match source {
            Some(source) => {
                let (json_path, meta_path) = self.cache_paths(source);
                for path in [json_path, meta_path] {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            None => match tokio::fs::remove_dir_all(&self.cache_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    async fn load_url(&self, url: &str, ttl: Duration) -> Result<serde_json::Value, SpecError> {
        if let Some(cached) = self.read_cached(url, ttl).await {
            tracing::debug!(%url, "serving OpenAPI document from cache");
            return Ok(cached);
        }

        let spec: serde_json::Value = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Err(e) = self.write_cache(url, &spec).await {
            tracing::warn!(%url, error = %e, "failed to cache OpenAPI document");
        }
        Ok(spec)
    }

    fn cache_paths(&self, source: &str) -> (PathBuf, PathBuf) {
        let key = sha256_hex(source);
        (
            self.cache_dir.join(format!("{key}.json")),
            self.cache_dir.join(format!("{key}.meta.json")),
        )
    }

    async fn read_cached(&self, source: &str, ttl: Duration) -> Option<serde_json::Value> {
        let (json_path, meta_path) = self.cache_paths(source);
        let meta_raw = tokio::fs::read_to_string(&meta_path).await.ok()?;
        let meta: CacheMeta = serde_json::from_str(&meta_raw).ok()?;
        if meta.source != source {
            return None;
        }
        let age = unix_now().saturating_sub(meta.cached_at);
        if age > ttl.as_secs() {
            return None;
        }
        let raw = tokio::fs::read_to_string(&json_path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    async fn write_cache(
        &self,
        source: &str,
        spec: &serde_json::Value,
    ) -> Result<(), SpecError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let (json_path, meta_path) = self.cache_paths(source);
        let meta = CacheMeta {
            source: source.to_string(),
            cached_at: unix_now(),
        };
        tokio::fs::write(&json_path, serde_json::to_vec(spec)?).await?;
        tokio::fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;
        Ok(())
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn loads_local_files_directly() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("petstore.json");
        tokio::fs::write(&spec_path, r#"{"openapi": "3.1.0"}"#)
            .await
            .unwrap();

        let cache = SpecCache::new(dir.path().join("cache"));
        let spec = cache
            .load(spec_path.to_str().unwrap(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(spec["openapi"], "3.1.0");
        // Local files never hit the cache directory
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn fresh_cache_entries_are_served_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpecCache::new(dir.path());
        // example.invalid never resolves, so a hit proves no fetch happened
        let url = "https://example.invalid/openapi.json";
        cache
            .write_cache(url, &json!({"openapi": "3.0.0"}))
            .await
            .unwrap();

        let spec = cache.load(url, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(spec["openapi"], "3.0.0");
    }

    #[tokio::test]
    async fn expired_entries_trigger_a_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpecCache::new(dir.path());
        let url = "https://example.invalid/openapi.json";
        cache
            .write_cache(url, &json!({"openapi": "3.0.0"}))
            .await
            .unwrap();

        // Age the entry past any plausible ttl
        let (_, meta_path) = cache.cache_paths(url);
        let meta = CacheMeta {
            source: url.to_string(),
            cached_at: 0,
        };
        tokio::fs::write(&meta_path, serde_json::to_vec(&meta).unwrap())
            .await
            .unwrap();

        let err = cache.load(url, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, SpecError::Http(_)));
    }

    #[tokio::test]
    async fn clear_drops_cached_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpecCache::new(dir.path());
        let url = "https://example.invalid/openapi.json";
        cache.write_cache(url, &json!({})).await.unwrap();
        assert!(cache.read_cached(url, Duration::from_secs(60)).await.is_some());

        cache.clear(Some(url)).await.unwrap();
        assert!(cache.read_cached(url, Duration::from_secs(60)).await.is_none());

        // Clearing everything tolerates a missing directory
        cache.clear(None).await.unwrap();
        cache.clear(None).await.unwrap();
    }
}
