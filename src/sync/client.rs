//! Full-refresh synchronization against the REST post endpoint.
//!
//! A refresh fetches the collection, caches every referenced image
//! best-effort, and atomically replaces the local snapshot. Transport and
//! protocol errors are fully contained here and returned as typed results;
//! a failed refresh leaves the previous snapshot untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::storage::{AssetStore, CacheError, FeedCache, FeedSnapshot, Post};
use crate::util;

/// Downloaded assets larger than this are skipped, not cached.
const MAX_ASSET_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur during a refresh.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body was not a post array in either accepted shape
    #[error("Malformed feed response: {0}")]
    Parse(#[from] serde_json::Error),
    /// Downloaded asset exceeded the size limit
    #[error("Asset too large")]
    AssetTooLarge,
    /// Snapshot could not be persisted; the previous snapshot is intact
    #[error("Failed to persist snapshot: {0}")]
    Storage(#[from] CacheError),
    /// A newer refresh started before this one could commit
    #[error("Superseded by a newer refresh")]
    Superseded,
}

/// The upstream API has been observed returning both a bare array and a
/// paginated envelope; both decode to the same post list.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedResponse {
    Paged { results: Vec<Post> },
    Bare(Vec<Post>),
}

impl FeedResponse {
    fn into_posts(self) -> Vec<Post> {
        match self {
            FeedResponse::Paged { results } => results,
            FeedResponse::Bare(posts) => posts,
        }
    }
}

/// Performs full-refresh fetches and owns the commit path to the local
/// caches.
///
/// Refreshes may be issued concurrently from one shared instance; a new
/// call supersedes any in-flight one. Each call captures a generation at
/// entry and only the call holding the latest generation is allowed to
/// commit, so a stale result can never overwrite a newer snapshot.
pub struct SyncClient {
    http: reqwest::Client,
    cache: FeedCache,
    assets: AssetStore,
    endpoint: Url,
    token: SecretString,
    timeout: Duration,
    generation: AtomicU64,
    commit_lock: Mutex<()>,
}

impl SyncClient {
    pub fn new(
        http: reqwest::Client,
        cache: FeedCache,
        assets: AssetStore,
        endpoint: Url,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            cache,
            assets,
            endpoint,
            token,
            timeout,
            generation: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
        }
    }

    /// Fetches the current post collection and replaces the local snapshot.
    ///
    /// Image assets referenced by the fetched posts are downloaded
    /// best-effort into the [`AssetStore`]; a single failed download or
    /// decode degrades that one post's offline rendering, never the
    /// refresh. Any non-2xx status, transport failure, or parse error
    /// leaves the existing snapshot untouched.
    pub async fn refresh(&self) -> Result<FeedSnapshot, SyncError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .get(self.endpoint.clone())
                .header(
                    AUTHORIZATION,
                    format!("Token {}", self.token.expose_secret()),
                )
                .send(),
        )
        .await
        .map_err(|_| SyncError::Timeout)?
        .map_err(SyncError::Network)?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status().as_u16()));
        }

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| SyncError::Timeout)?
            .map_err(SyncError::Network)?;

        let posts = serde_json::from_str::<FeedResponse>(&body)?.into_posts();
        tracing::info!(posts = posts.len(), "Fetched post collection");

        for post in &posts {
            if let Some(image_url) = &post.image {
                self.cache_image(post.id, image_url).await;
            }
        }

        // Commit only if no newer refresh has started meanwhile. The lock
        // closes the window between the generation check and the write.
        {
            // The guarded section holds no user data, so a poisoned lock is
            // still safe to reuse.
            let _guard = self
                .commit_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::info!(generation, "Refresh superseded, discarding result");
                return Err(SyncError::Superseded);
            }
            let snapshot = FeedSnapshot::new(posts);
            self.cache.save(&snapshot)?;
            Ok(snapshot)
        }
    }

    /// Best-effort download of one post image into the asset store.
    async fn cache_image(&self, post_id: i64, image_url: &str) {
        let Some(key) = util::asset_key(image_url) else {
            tracing::warn!(post_id, url = %image_url, "Image URL has no usable file name, skipping");
            return;
        };

        let parsed = match util::parse_http_url(image_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(post_id, url = %image_url, error = %e, "Invalid image URL, skipping");
                return;
            }
        };

        match self.download(parsed).await {
            Ok(bytes) => {
                if let Err(e) = self.assets.put(&key, &bytes) {
                    tracing::warn!(post_id, key = %key, error = %e, "Failed to cache image");
                }
            }
            Err(e) => {
                tracing::warn!(post_id, url = %image_url, error = %e, "Failed to download image");
            }
        }
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>, SyncError> {
        let response = tokio::time::timeout(self.timeout, self.http.get(url).send())
            .await
            .map_err(|_| SyncError::Timeout)?
            .map_err(SyncError::Network)?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_ASSET_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SyncError> {
    // Fast path: trust Content-Length when present
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SyncError::AssetTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SyncError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SyncError::AssetTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
