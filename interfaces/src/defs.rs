use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feed URL known to the dispatcher together with its watermark.
///
/// `last_seen_id` stays `None` until the first sweep of the feed commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRegistration {
    pub feed_id: Uuid,
    pub url: String,
    pub last_seen_id: Option<String>,
}

impl FeedRegistration {
    pub fn new(url: String) -> Self {
        Self {
            feed_id: Uuid::new_v4(),
            url,
            last_seen_id: None,
        }
    }
}

/// One entry of a fetched feed, in the order the feed lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: String,
}

/// Payload forwarded downstream for each new item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub published_at: String,
}

impl From<&FeedItem> for DispatchEvent {
    fn from(item: &FeedItem) -> Self {
        Self {
            title: item.title.clone(),
            link: item.link.clone(),
            published_at: item.published_at.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Empty message body")]
    Empty,

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

impl DispatchEvent {
    /// Decode a message body received from the queue.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, EventDecodeError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(EventDecodeError::Empty);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

// Object style note:
// Producers (the sweep) and consumers (the review worker) run as separate
// short lived processes. Keep these types plain data; anything that needs a
// client or a connection belongs in the crate that owns that client.
