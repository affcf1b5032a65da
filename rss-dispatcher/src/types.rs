use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;
// Wire types shared with downstream consumers live in the interfaces crate
pub use interfaces::defs::{DispatchEvent, EventDecodeError, FeedItem, FeedRegistration};

/// Registration plus bookkeeping columns, as listed to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRecord {
    pub feed_id: Uuid,
    pub url: String,
    pub last_seen_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FeedRecord> for FeedRegistration {
    fn from(record: FeedRecord) -> Self {
        Self {
            feed_id: record.feed_id,
            url: record.url,
            last_seen_id: record.last_seen_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "RSS-Dispatcher/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            follow_redirects: true,
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    /// Jitter applied to every retry delay.
    pub const RETRY_JITTER: f64 = 0.5;

    /// Longest one fetch can take when every attempt runs into the request
    /// timeout and every retry delay lands on its jittered ceiling.
    pub fn max_fetch_duration(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let mut total_ms = self.timeout_seconds * 1000 * attempts;
        let mut delay_ms = self.retry_delay_seconds * 1000;
        let max_delay_ms = delay_ms * 32;
        for _ in 0..self.max_retries {
            total_ms += (delay_ms as f64 * (1.0 + Self::RETRY_JITTER)) as u64;
            delay_ms = (delay_ms * 2).min(max_delay_ms);
        }
        Duration::from_millis(total_ms)
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Upper bound on one feed's fetch, publish and commit sequence. Keep it
    /// above [`FetchConfig::max_fetch_duration`] so fetch failures are not
    /// reported as timeouts.
    pub feed_timeout_seconds: u64,
    /// 1 keeps the sweep strictly sequential.
    pub max_concurrent_feeds: usize,
    /// Caps how many of the newest items a feed's first sweep dispatches.
    pub max_items_per_sweep: Option<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            feed_timeout_seconds: 300,
            max_concurrent_feeds: 1,
            max_items_per_sweep: None,
        }
    }
}

/// Acknowledgement returned by a publisher once the event is durable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Parse,
    StoreRead,
    Publish,
    StoreWrite,
    Conflict,
    Timeout,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<&FetchError> for FailureReason {
    fn from(err: &FetchError) -> Self {
        let kind = match err {
            FetchError::Parse(_) => FailureKind::Parse,
            _ => FailureKind::Fetch,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of one feed in one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    NoNewItems,
    Published { count: usize, watermark: String },
    Failed { reason: FailureReason },
}

impl SweepOutcome {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        SweepOutcome::Failed {
            reason: FailureReason::new(kind, message),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SweepOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedOutcome {
    pub feed_id: Uuid,
    /// Absent when the registration itself could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub outcome: SweepOutcome,
}

/// Per-feed outcomes of one sweep, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<FeedOutcome>,
}

impl SweepSummary {
    pub fn get(&self, feed_id: Uuid) -> Option<&SweepOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.feed_id == feed_id)
            .map(|o| &o.outcome)
    }

    pub fn published_events(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match &o.outcome {
                SweepOutcome::Published { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_feeds(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_failed()).count()
    }

    pub fn idle_feeds(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == SweepOutcome::NoNewItems)
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publish rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publisher unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Feed not found: {id}")]
    FeedNotFound { id: Uuid },

    #[error("Feed already registered: {id}")]
    AlreadyRegistered { id: Uuid },

    #[error("Watermark for feed {id} moved since it was read (expected {expected:?})")]
    Conflict { id: Uuid, expected: Option<String> },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Sweep task failed: {0}")]
    SweepTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
