//! Blob storage for source text
//!
//! Source units point at a storage key; the text behind it lives in a blob
//! store. Two backends: a local directory and a public HTTP object store
//! (read-only, `{base_url}/{bucket}/{key}` with each key segment encoded).

use crate::config::Config;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Storage keys are relative, `/`-separated paths
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn backend(&self) -> &str;

    async fn read_text(&self, key: &str) -> Result<String>;

    async fn write_text(&self, key: &str, text: &str) -> Result<()>;
}

/// Reject keys that could escape the store root
fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        bail!("Storage key is empty");
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("Storage key '{}' must be a relative path inside the store", key),
        }
    }
    Ok(())
}

/// Blobs stored as files under a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn backend(&self) -> &str {
        "fs"
    }

    async fn read_text(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read blob {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_text(&self, key: &str, text: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write blob {}", path.display()))?;
        debug!("Stored blob {} ({} bytes)", key, text.len());
        Ok(())
    }
}

/// Public object store reachable over HTTP
pub struct HttpBlobStore {
    base_url: Url,
    bucket: String,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, bucket: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid storage base URL '{}'", base_url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            bucket: bucket.into(),
            client,
        })
    }

    /// `{base_url}/{bucket}/{key}` with every segment percent-encoded
    pub fn object_url(&self, key: &str) -> Result<Url> {
        validate_key(key)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Storage base URL cannot have path segments"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(key.split('/').filter(|s| !s.is_empty() && *s != "."));
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn backend(&self) -> &str {
        "http"
    }

    async fn read_text(&self, key: &str) -> Result<String> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Fetching {} returned HTTP {}", url, status.as_u16());
        }
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }

    async fn write_text(&self, key: &str, _text: &str) -> Result<()> {
        bail!("The http blob store is read-only; cannot write '{}'", key)
    }
}

/// Build the configured blob store
pub fn from_config(config: &Config) -> Result<Arc<dyn BlobStore>> {
    match config.storage.backend.as_str() {
        "http" => {
            let base_url = config
                .storage
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow!("storage.base_url is required for the http backend"))?;
            Ok(Arc::new(HttpBlobStore::new(
                base_url,
                config.storage.bucket.clone(),
                Duration::from_secs(config.generation.timeout_secs),
            )?))
        }
        _ => Ok(Arc::new(FsBlobStore::new(config.blob_root()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fs_roundtrip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.write_text("42/section.1.txt", "Sec. 1.").await.unwrap();
        assert_eq!(store.read_text("42/section.1.txt").await.unwrap(), "Sec. 1.");
        assert!(store.read_text("42/missing.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_fs_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.read_text("../etc/passwd").await.is_err());
        assert!(store.read_text("/etc/passwd").await.is_err());
        assert!(store.write_text("", "x").await.is_err());
    }

    #[test]
    fn test_http_object_url_encodes_segments() {
        let store =
            HttpBlobStore::new("https://cdn.example.com/storage/v1/", "web", Duration::from_secs(1))
                .unwrap();
        let url = store.object_url("hr 1/billtext.3.congress.txt").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cdn.example.com/storage/v1/web/hr%201/billtext.3.congress.txt"
        );
    }

    #[tokio::test]
    async fn test_http_read_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web/7/page.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let store = HttpBlobStore::new(&server.uri(), "web", Duration::from_secs(5)).unwrap();
        assert_eq!(store.read_text("7/page.txt").await.unwrap(), "hello");
        assert!(store.read_text("7/other.txt").await.is_err());
        assert!(store.write_text("7/page.txt", "x").await.is_err());
    }
}
