use crate::types::{
    DispatchEvent, FeedItem, FeedRecord, FeedRegistration, FetchError, PublishAck, PublishError,
    StoreError,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Fetches a feed URL and returns its items in document order.
///
/// Implementations must hand back items exactly as the feed lists them
/// (newest first for well-behaved feeds). Callers never re-sort.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FetchError>;
}

/// Durable per-feed watermark records.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Create a registration with no watermark and return its id.
    async fn register(&self, url: &str) -> Result<Uuid, StoreError>;

    /// All registrations, oldest registration first.
    async fn list_registrations(&self) -> Result<Vec<FeedRegistration>, StoreError>;

    /// Registrations with their bookkeeping columns.
    async fn list_records(&self) -> Result<Vec<FeedRecord>, StoreError>;

    async fn get(&self, feed_id: Uuid) -> Result<FeedRegistration, StoreError>;

    /// Replace the watermark only if it still equals `expected`.
    async fn commit_watermark(
        &self,
        feed_id: Uuid,
        expected: Option<&str>,
        new_last_seen_id: &str,
    ) -> Result<(), StoreError>;
}

/// At-least-once event channel. `Ok` means the event is durable.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DispatchEvent) -> Result<PublishAck, PublishError>;
}
