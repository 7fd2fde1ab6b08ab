//! Source probing
//!
//! Given several candidate URLs for the same document, fetch them in
//! parallel, keep the first (in input order) that returns usable text, store
//! the text in the blob store and register it as a web-page source unit.

use crate::blob::BlobStore;
use crate::db::{Database, NewSourceUnit, SourceUnit};
use crate::pipeline::{text, RetryPolicy, WorkerPool};
use anyhow::{bail, Context, Result};
use regex::Regex;
use sdk::types::SourceKind;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Bodies shorter than this (after cleanup) count as a failed probe
const MIN_BODY_CHARS: usize = 40;

/// Storage key for a URL's text: `<owner>/<sha256(url)>.txt`
pub fn blob_key(owner_id: i64, url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    format!("{}/{}.txt", owner_id, hex::encode(digest))
}

/// Strips markup from fetched HTML
struct HtmlText {
    blocks: Regex,
    tags: Regex,
}

impl HtmlText {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            blocks: Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn extract(&self, html: &str) -> String {
        let without_blocks = self.blocks.replace_all(html, " ");
        let without_tags = self.tags.replace_all(&without_blocks, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
        text::collapse_whitespace(&decoded)
    }
}

/// A successful probe
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub text: String,
}

pub struct Ingestor {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    client: reqwest::Client,
    html: HtmlText,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cardsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            db,
            blobs,
            client,
            html: HtmlText::new().context("Failed to compile HTML cleanup rules")?,
            concurrency,
        })
    }

    /// Probe `urls` and return the first usable body in input order
    pub async fn probe(&self, urls: &[String]) -> Option<Fetched> {
        let pool = WorkerPool::new(self.concurrency).with_retry(RetryPolicy::none());
        pool.first_success(urls.to_vec(), |url: String| async move {
            self.fetch(&url).await.map(|text| Fetched { url, text })
        })
        .await
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {}", url, status.as_u16());
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        let text = if is_html {
            self.html.extract(&body)
        } else {
            body.trim().to_string()
        };

        if text.chars().count() < MIN_BODY_CHARS {
            bail!("{} returned too little text ({} chars)", url, text.len());
        }
        debug!("Probe {} returned {} chars", url, text.len());
        Ok(text)
    }

    /// Probe, store and register.
    ///
    /// Re-ingesting a URL already registered for the owner overwrites its
    /// text and keeps its part number.
    pub async fn ingest(&self, owner_id: i64, urls: &[String]) -> Result<SourceUnit> {
        if urls.is_empty() {
            bail!("At least one URL is required");
        }

        self.db
            .subjects()
            .get(owner_id)
            .await?
            .with_context(|| format!("Subject {} not found", owner_id))?;

        let fetched = self
            .probe(urls)
            .await
            .with_context(|| {
                format!("None of {} candidate URL(s) returned usable text", urls.len())
            })?;

        let key = blob_key(owner_id, &fetched.url);
        self.blobs.write_text(&key, &fetched.text).await?;

        let sources = self.db.sources();
        let existing = sources.list_for_owner(owner_id).await?;
        let part = match existing.iter().find(|u| u.path == key) {
            Some(unit) => unit.part,
            None => existing.iter().map(|u| u.part).max().unwrap_or(0) + 1,
        };

        let unit = sources
            .add(&NewSourceUnit {
                owner_id,
                part,
                kind: SourceKind::WebPage,
                path: key,
                link: Some(fetched.url.clone()),
            })
            .await?;

        info!(
            "Ingested {} as unit {} (part {}, {} chars)",
            fetched.url,
            unit.id,
            unit.part,
            fetched.text.len()
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_is_stable() {
        let a = blob_key(7, "https://example.com/a");
        assert_eq!(a, blob_key(7, " https://example.com/a "));
        assert!(a.starts_with("7/"));
        assert!(a.ends_with(".txt"));
        assert_eq!(a.len(), "7/".len() + 64 + ".txt".len());
        assert_ne!(a, blob_key(8, "https://example.com/a"));
    }

    #[test]
    fn test_html_extract() {
        let html = HtmlText::new().unwrap();
        let page = "<html><head><style>p{}</style><script>var x = 1;</script></head>\
                    <body><h1>Jane&nbsp;Doe</h1><p>Served two terms &amp; more.</p></body></html>";
        assert_eq!(html.extract(page), "Jane Doe Served two terms & more.");
    }
}
