use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Post
// ============================================================================

/// A single post record, as received from the server.
///
/// Timestamps stay in their ISO-8601 string form — the client renders them
/// verbatim and never reparses them. Media references are normalized at the
/// deserialization boundary: the upstream API has been observed sending
/// `""`, the literal string `"null"`, and JSON `null` interchangeably for
/// "no image", and all three decode to `None` here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub author: i64,
    #[serde(default = "untitled")]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default, deserialize_with = "media_ref")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "media_ref")]
    pub video: Option<String>,
}

fn untitled() -> String {
    "(untitled)".to_string()
}

/// Treats `""` and the literal string `"null"` the same as JSON `null`.
fn media_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty() && s != "null"))
}

// ============================================================================
// FeedSnapshot
// ============================================================================

/// The complete, atomically-replaced local copy of the server's post list.
///
/// Exactly one snapshot exists at a time. A successful refresh fully
/// replaces it; a failed refresh leaves the previous one intact. The
/// `fetched_at` stamp is local cache metadata, not server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub posts: Vec<Post>,
}

impl FeedSnapshot {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            fetched_at: Utc::now(),
            posts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }
}
