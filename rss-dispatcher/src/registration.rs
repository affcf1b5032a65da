use crate::traits::WatermarkStore;
use crate::types::{DispatcherError, FeedRecord, Result};
use tracing::info;
use url::Url;
use uuid::Uuid;

/// Check that `url` names an http(s) feed and return it trimmed.
pub fn validate_feed_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DispatcherError::InvalidInput("RSS URL is required".to_string()));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| DispatcherError::InvalidInput(format!("Invalid URL '{}': {}", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DispatcherError::InvalidInput(format!(
            "URL must use http or https, got: {}",
            parsed.scheme()
        )));
    }

    if parsed.host().is_none() {
        return Err(DispatcherError::InvalidInput(format!("URL has no host: {}", trimmed)));
    }

    Ok(trimmed.to_string())
}

/// Add a feed with no watermark. Its first sweep dispatches the whole current snapshot.
pub async fn register(store: &dyn WatermarkStore, url: &str) -> Result<Uuid> {
    let url = validate_feed_url(url)?;
    let feed_id = store.register(&url).await?;
    info!("RSS URL added: {} (ID: {})", url, feed_id);
    Ok(feed_id)
}

pub async fn list_feeds(store: &dyn WatermarkStore) -> Result<Vec<FeedRecord>> {
    Ok(store.list_records().await?)
}
