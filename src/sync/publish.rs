//! Post submission: one multipart/form-data request per new post.

use std::path::Path;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use url::Url;

/// Size of the chunks the image part is streamed in. The file is never
/// loaded into memory as a whole.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    /// Any status other than 200/201
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image path has no file name")]
    InvalidImagePath,
}

/// Submits new posts to the REST endpoint.
///
/// Publishing never touches the local caches; callers trigger a refresh
/// afterwards to observe the new post.
pub struct PublishClient {
    http: reqwest::Client,
    endpoint: Url,
    token: SecretString,
    author_id: String,
    timeout: Duration,
}

impl PublishClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: Url,
        token: SecretString,
        author_id: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint,
            token,
            author_id,
            timeout,
        }
    }

    /// Uploads one post with its image attachment.
    ///
    /// Succeeds only on HTTP 200/201; every other outcome, including
    /// transport failure, maps to a [`PublishError`].
    pub async fn publish(
        &self,
        title: &str,
        text: &str,
        image_path: &Path,
    ) -> Result<(), PublishError> {
        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(PublishError::InvalidImagePath)?
            .to_string();

        let file = tokio::fs::File::open(image_path).await?;
        let stream = futures::stream::unfold(file, |mut file| async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok::<_, std::io::Error>(buf), file))
                }
                Err(e) => Some((Err(e), file)),
            }
        });

        let image_part = Part::stream(reqwest::Body::wrap_stream(stream))
            .file_name(file_name.clone())
            .mime_str("image/jpeg")
            .map_err(PublishError::Network)?;

        let form = Form::new()
            .text("title", title.to_string())
            .text("text", text.to_string())
            .text("author", self.author_id.clone())
            .part("image", image_part);

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .post(self.endpoint.clone())
                .header(
                    AUTHORIZATION,
                    format!("Token {}", self.token.expose_secret()),
                )
                .multipart(form)
                .send(),
        )
        .await
        .map_err(|_| PublishError::Timeout)?
        .map_err(PublishError::Network)?;

        match response.status().as_u16() {
            200 | 201 => {
                tracing::info!(title = %title, file = %file_name, "Published post");
                Ok(())
            }
            status => {
                tracing::warn!(status, title = %title, "Publish rejected");
                Err(PublishError::HttpStatus(status))
            }
        }
    }
}
