#![allow(dead_code)]

use async_trait::async_trait;
use rss_dispatcher::{
    DiffEngine, DispatchEvent, EventPublisher, FeedItem, FeedRecord, FeedRegistration, FeedSource,
    FetchError, InMemoryWatermarkStore, PublishAck, PublishError, RecordingPublisher, StoreError,
    WatermarkStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn item(id: &str, published_at: &str) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        title: format!("Title {}", id),
        link: format!("https://example.com/posts/{}", id),
        published_at: published_at.to_string(),
    }
}

/// i0..i{n-1}, newest first, one hour apart.
pub fn items(n: usize) -> Vec<FeedItem> {
    (0..n)
        .map(|i| item(&format!("i{}", i), &format!("2024-10-01T{:02}:00:00Z", 20 - i)))
        .collect()
}

pub enum Scripted {
    Items(Vec<FeedItem>),
    NetworkDown,
    Garbage,
    Hang,
    /// Answers with the items after a delay.
    Slow(Duration, Vec<FeedItem>),
}

/// Feed source answering from a per-URL script.
#[derive(Default)]
pub struct ScriptedSource {
    feeds: RwLock<HashMap<String, Scripted>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, url: &str, script: Scripted) {
        self.feeds.write().await.insert(url.to_string(), script);
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, items) = {
            let feeds = self.feeds.read().await;
            match feeds.get(url) {
                Some(Scripted::Items(items)) => return Ok(items.clone()),
                Some(Scripted::NetworkDown) | None => {
                    return Err(FetchError::Status {
                        status: 503,
                        url: url.to_string(),
                    })
                }
                Some(Scripted::Garbage) => {
                    return Err(FetchError::Parse("not a feed".to_string()))
                }
                Some(Scripted::Hang) => (Duration::from_secs(3600), Vec::new()),
                Some(Scripted::Slow(delay, items)) => (*delay, items.clone()),
            }
        };
        tokio::time::sleep(delay).await;
        Ok(items)
    }
}

/// Records events and fails the publish call whose 0-based index is `fail_at`.
pub struct FlakyPublisher {
    inner: RecordingPublisher,
    fail_at: Option<usize>,
    calls: AtomicUsize,
}

impl FlakyPublisher {
    pub fn failing_at(index: usize) -> Self {
        Self {
            inner: RecordingPublisher::new(),
            fail_at: Some(index),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self {
            inner: RecordingPublisher::new(),
            fail_at: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn titles(&self) -> Vec<String> {
        self.inner.titles().await
    }
}

#[async_trait]
impl EventPublisher for FlakyPublisher {
    async fn publish(&self, event: &DispatchEvent) -> Result<PublishAck, PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if Some(call) == self.fail_at {
            return Err(PublishError::Unavailable("broker did not acknowledge".to_string()));
        }
        self.inner.publish(event).await
    }
}

/// Wraps the in-memory store and can be told to fail commits or listing.
pub struct FaultyStore {
    pub inner: InMemoryWatermarkStore,
    pub fail_commits: AtomicBool,
    pub fail_listing: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryWatermarkStore::new(),
            fail_commits: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WatermarkStore for FaultyStore {
    async fn register(&self, url: &str) -> Result<Uuid, StoreError> {
        self.inner.register(url).await
    }

    async fn list_registrations(&self) -> Result<Vec<FeedRegistration>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.list_registrations().await
    }

    async fn list_records(&self) -> Result<Vec<FeedRecord>, StoreError> {
        self.inner.list_records().await
    }

    async fn get(&self, feed_id: Uuid) -> Result<FeedRegistration, StoreError> {
        self.inner.get(feed_id).await
    }

    async fn commit_watermark(
        &self,
        feed_id: Uuid,
        expected: Option<&str>,
        new_last_seen_id: &str,
    ) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".to_string()));
        }
        self.inner
            .commit_watermark(feed_id, expected, new_last_seen_id)
            .await
    }
}

pub struct Harness<P: EventPublisher + 'static> {
    pub source: Arc<ScriptedSource>,
    pub store: Arc<FaultyStore>,
    pub publisher: Arc<P>,
}

impl<P: EventPublisher + 'static> Harness<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            source: Arc::new(ScriptedSource::new()),
            store: Arc::new(FaultyStore::new()),
            publisher: Arc::new(publisher),
        }
    }

    pub fn engine(&self) -> DiffEngine {
        DiffEngine::new(
            self.source.clone(),
            self.store.clone(),
            self.publisher.clone(),
        )
    }

    /// Register `url` with the given watermark and return its registration.
    pub async fn feed(&self, url: &str, last_seen_id: Option<&str>) -> FeedRegistration {
        let feed_id = self.store.inner.register(url).await.unwrap();
        self.store
            .inner
            .set_watermark(feed_id, last_seen_id.map(str::to_string))
            .await;
        self.store.get(feed_id).await.unwrap()
    }
}
