//! Integration tests for the refresh path: envelope shapes, asset
//! downloads, failure containment, and supersede-on-restart semantics.
//!
//! Each test gets its own mock server and its own cache directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil::storage::{AssetStore, CacheError, FeedCache, FeedSnapshot};
use vigil::sync::{SyncClient, SyncError};

struct TestEnv {
    dir: PathBuf,
    cache: FeedCache,
    assets: AssetStore,
    client: Arc<SyncClient>,
}

impl TestEnv {
    fn new(name: &str, server_uri: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("vigil_sync_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let cache = FeedCache::open(dir.join("snapshot.json"));
        let assets = AssetStore::open(dir.join("assets"));
        let client = Arc::new(SyncClient::new(
            reqwest::Client::new(),
            cache.clone(),
            assets.clone(),
            Url::parse(&format!("{server_uri}/api_root/Post/")).unwrap(),
            SecretString::from("test-token"),
            Duration::from_secs(5),
        ));

        Self {
            dir,
            cache,
            assets,
            client,
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// A tiny valid PNG for the mock image endpoint.
fn sample_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

async fn mount_posts(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// Envelope shapes
// ============================================================================

#[tokio::test]
async fn bare_array_and_envelope_yield_identical_snapshots() {
    let post = serde_json::json!({"id": 1, "title": "T", "text": "B"});

    let bare_server = MockServer::start().await;
    mount_posts(&bare_server, serde_json::json!([post])).await;
    let bare_env = TestEnv::new("envelope_bare", &bare_server.uri());
    let bare_snapshot = bare_env.client.refresh().await.unwrap();

    let paged_server = MockServer::start().await;
    mount_posts(
        &paged_server,
        serde_json::json!({"count": 1, "next": null, "previous": null, "results": [post]}),
    )
    .await;
    let paged_env = TestEnv::new("envelope_paged", &paged_server.uri());
    let paged_snapshot = paged_env.client.refresh().await.unwrap();

    assert_eq!(bare_snapshot.posts, paged_snapshot.posts);
}

#[tokio::test]
async fn refresh_sends_token_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .and(header("authorization", "Token test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new("auth_header", &server.uri());
    env.client.refresh().await.unwrap();
}

// ============================================================================
// Asset downloads
// ============================================================================

#[tokio::test]
async fn refresh_caches_referenced_image() {
    let server = MockServer::start().await;
    let image_url = format!("{}/media/a.jpg", server.uri());
    mount_posts(
        &server,
        serde_json::json!([{"id": 1, "title": "T", "text": "B", "image": image_url}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/media/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_png()))
        .mount(&server)
        .await;

    let env = TestEnv::new("caches_image", &server.uri());
    assert_eq!(env.assets.get("a.jpg").unwrap(), None);

    env.client.refresh().await.unwrap();

    let cached = env
        .assets
        .get("a.jpg")
        .unwrap()
        .expect("image should be cached after refresh");
    image::load_from_memory(&cached).expect("cached asset should decode");
}

#[tokio::test]
async fn sentinel_image_refs_never_touch_the_asset_endpoint() {
    let server = MockServer::start().await;
    mount_posts(
        &server,
        serde_json::json!([
            {"id": 1, "title": "A", "text": "", "image": ""},
            {"id": 2, "title": "B", "text": "", "image": "null"},
            {"id": 3, "title": "C", "text": "", "image": null},
        ]),
    )
    .await;
    // Any asset fetch would land here and trip the expect(0).
    Mock::given(method("GET"))
        .and(path("/media/a.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let env = TestEnv::new("sentinel_refs", &server.uri());
    let snapshot = env.client.refresh().await.unwrap();

    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.posts.iter().all(|p| p.image.is_none()));
}

#[tokio::test]
async fn failed_image_download_does_not_fail_the_refresh() {
    let server = MockServer::start().await;
    let good_url = format!("{}/media/good.jpg", server.uri());
    let bad_url = format!("{}/media/bad.jpg", server.uri());
    mount_posts(
        &server,
        serde_json::json!([
            {"id": 1, "title": "A", "text": "", "image": bad_url},
            {"id": 2, "title": "B", "text": "", "image": good_url},
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/media/bad.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/good.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_png()))
        .mount(&server)
        .await;

    let env = TestEnv::new("image_failure", &server.uri());
    let snapshot = env.client.refresh().await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert!(env.assets.get("bad.jpg").unwrap().is_none());
    assert!(env.assets.get("good.jpg").unwrap().is_some());
}

#[tokio::test]
async fn undecodable_image_payload_is_skipped() {
    let server = MockServer::start().await;
    let image_url = format!("{}/media/junk.jpg", server.uri());
    mount_posts(
        &server,
        serde_json::json!([{"id": 1, "title": "T", "text": "", "image": image_url}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/media/junk.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not an image".to_vec()))
        .mount(&server)
        .await;

    let env = TestEnv::new("undecodable_image", &server.uri());
    env.client.refresh().await.unwrap();
    assert!(env.assets.get("junk.jpg").unwrap().is_none());
}

// ============================================================================
// Failure containment
// ============================================================================

#[tokio::test]
async fn http_error_leaves_existing_snapshot_intact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let env = TestEnv::new("http_error", &server.uri());
    let prior = FeedSnapshot::new(vec![serde_json::from_value(
        serde_json::json!({"id": 42, "title": "kept", "text": ""}),
    )
    .unwrap()]);
    env.cache.save(&prior).unwrap();

    let err = env.client.refresh().await.unwrap_err();
    assert!(matches!(err, SyncError::HttpStatus(500)));

    let loaded = env.cache.load().unwrap();
    assert_eq!(loaded.posts, prior.posts);
}

#[tokio::test]
async fn parse_error_leaves_cache_empty_and_typed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"detail": "nope"})),
        )
        .mount(&server)
        .await;

    let env = TestEnv::new("parse_error", &server.uri());
    let err = env.client.refresh().await.unwrap_err();
    assert!(matches!(err, SyncError::Parse(_)));
    assert!(matches!(env.cache.load(), Err(CacheError::NotFound)));
}

// ============================================================================
// Idempotence and supersede
// ============================================================================

#[tokio::test]
async fn repeated_refresh_with_unchanged_response_is_idempotent() {
    let server = MockServer::start().await;
    let image_url = format!("{}/media/a.jpg", server.uri());
    mount_posts(
        &server,
        serde_json::json!([{"id": 1, "title": "T", "text": "B", "image": image_url}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/media/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_png()))
        .mount(&server)
        .await;

    let env = TestEnv::new("idempotent", &server.uri());
    let first = env.client.refresh().await.unwrap();
    let second = env.client.refresh().await.unwrap();

    assert_eq!(first.posts, second.posts);
    // Second write of the same key must leave a decodable asset.
    let cached = env.assets.get("a.jpg").unwrap().unwrap();
    image::load_from_memory(&cached).expect("asset should survive a second put");
}

#[tokio::test]
async fn newer_refresh_supersedes_an_in_flight_one() {
    let server = MockServer::start().await;
    // First request: slow, returns the stale post. Second: fast, current.
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"id": 1, "title": "stale", "text": ""}]))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api_root/Post/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"id": 2, "title": "current", "text": ""}])),
        )
        .mount(&server)
        .await;

    let env = TestEnv::new("supersede", &server.uri());

    let slow = {
        let client = Arc::clone(&env.client);
        tokio::spawn(async move { client.refresh().await })
    };
    // Let the slow call get its request on the wire first.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = env.client.refresh().await.unwrap();
    assert_eq!(current.posts[0].title, "current");

    let stale_result = slow.await.unwrap();
    assert!(matches!(stale_result, Err(SyncError::Superseded)));

    // Only the later call's result was ever persisted.
    let loaded = env.cache.load().unwrap();
    assert_eq!(loaded.posts[0].id, 2);
    assert_eq!(loaded.posts[0].title, "current");
}

// ============================================================================
// Snapshot persistence
// ============================================================================

#[tokio::test]
async fn successful_refresh_persists_the_fetched_snapshot() {
    let server = MockServer::start().await;
    mount_posts(
        &server,
        serde_json::json!([
            {"id": 1, "title": "One", "text": "a", "published_date": "2025-11-02T09:15:00Z"},
            {"id": 2, "title": "Two", "text": "b", "video": "http://x/v.mp4"},
        ]),
    )
    .await;

    let env = TestEnv::new("persists", &server.uri());
    let snapshot = env.client.refresh().await.unwrap();
    let loaded = env.cache.load().unwrap();

    assert_eq!(loaded.posts, snapshot.posts);
    assert_eq!(loaded.posts[1].video.as_deref(), Some("http://x/v.mp4"));
}
