//! Small shared helpers: asset key derivation and endpoint URL handling.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Derives the cache key for an asset from its remote URL.
///
/// The key is the trailing path segment — the substring after the last `/`,
/// with any query string or fragment stripped. Two URLs ending in the same
/// file name therefore map to the same cached asset; see DESIGN.md for why
/// this collision is accepted.
///
/// Returns `None` when the URL has no usable trailing segment (e.g. it ends
/// in `/`).
pub fn asset_key(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or("");
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Parses an asset or API URL, accepting only http/https.
pub fn parse_http_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Maps an http(s) base URL to its ws(s) counterpart for the push channel.
pub fn websocket_url(base: &Url, path: &str) -> Result<Url, UrlError> {
    let mut ws = base.join(path)?;
    let scheme = match ws.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(UrlError::UnsupportedScheme(other.to_owned())),
    };
    // set_scheme only rejects cross-category changes, which the match rules out
    let _ = ws.set_scheme(scheme);
    Ok(ws)
}
