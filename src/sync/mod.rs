//! REST synchronization: full-refresh fetch and post publishing.

mod client;
mod publish;

pub use client::{SyncClient, SyncError};
pub use publish::{PublishClient, PublishError};

use std::time::Duration;

/// Shared HTTP client with the bounded connect timeout both REST clients
/// rely on.
pub fn build_http_client(connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
        .build()
}
