use crate::traits::{EventPublisher, WatermarkStore};
use crate::types::{
    DispatchEvent, FeedRecord, FeedRegistration, PublishAck, PublishError, StoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local watermark store. Registration order is kept.
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    records: RwLock<Vec<FeedRecord>>,
    commits: AtomicUsize,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful watermark commits since creation.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn watermark(&self, feed_id: Uuid) -> Option<String> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.feed_id == feed_id)
            .and_then(|r| r.last_seen_id.clone())
    }

    /// Overwrite a watermark without the compare step, e.g. to seed fixtures.
    pub async fn set_watermark(&self, feed_id: Uuid, last_seen_id: Option<String>) {
        let mut records = self.records.write().await;
        if let Some(record) = records.iter_mut().find(|r| r.feed_id == feed_id) {
            record.last_seen_id = last_seen_id;
            record.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn register(&self, url: &str) -> Result<Uuid, StoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter().find(|r| r.url == url) {
            return Err(StoreError::AlreadyRegistered {
                id: existing.feed_id,
            });
        }

        let now = Utc::now();
        let feed_id = Uuid::new_v4();
        records.push(FeedRecord {
            feed_id,
            url: url.to_string(),
            last_seen_id: None,
            created_at: now,
            updated_at: now,
        });
        Ok(feed_id)
    }

    async fn list_registrations(&self) -> Result<Vec<FeedRegistration>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .cloned()
            .map(FeedRegistration::from)
            .collect())
    }

    async fn list_records(&self) -> Result<Vec<FeedRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, feed_id: Uuid) -> Result<FeedRegistration, StoreError> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.feed_id == feed_id)
            .cloned()
            .map(FeedRegistration::from)
            .ok_or(StoreError::FeedNotFound { id: feed_id })
    }

    async fn commit_watermark(
        &self,
        feed_id: Uuid,
        expected: Option<&str>,
        new_last_seen_id: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.feed_id == feed_id)
            .ok_or(StoreError::FeedNotFound { id: feed_id })?;

        if record.last_seen_id.as_deref() != expected {
            return Err(StoreError::Conflict {
                id: feed_id,
                expected: expected.map(str::to_string),
            });
        }

        record.last_seen_id = Some(new_last_seen_id.to_string());
        record.updated_at = Utc::now();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Publisher that keeps every acknowledged event in memory, in publish order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: RwLock<Vec<DispatchEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DispatchEvent> {
        self.events.read().await.clone()
    }

    pub async fn titles(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.title.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DispatchEvent) -> Result<PublishAck, PublishError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(PublishAck {
            message_id: Some(events.len().to_string()),
        })
    }
}
