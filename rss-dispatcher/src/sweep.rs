use crate::diff::DiffEngine;
use crate::types::{
    FailureKind, FeedOutcome, FeedRegistration, Result, SweepConfig, SweepOutcome, SweepSummary,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs the diff engine over every registered feed.
pub struct SweepOrchestrator {
    engine: Arc<DiffEngine>,
    config: SweepConfig,
}

impl SweepOrchestrator {
    pub fn new(engine: DiffEngine, config: SweepConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
        }
    }

    /// One complete pass over all registered feeds.
    ///
    /// Only a failure to list the registrations is returned as an error.
    /// Per-feed failures are reported in the summary and never stop the pass.
    pub async fn run_sweep(&self) -> Result<SweepSummary> {
        let started_at = Utc::now();
        let registrations = self.engine.store().list_registrations().await?;

        if registrations.is_empty() {
            info!("No RSS feeds registered");
        } else {
            info!("Sweeping {} feeds", registrations.len());
        }

        let concurrency = self.config.max_concurrent_feeds.max(1);
        let outcomes: Vec<FeedOutcome> = stream::iter(registrations)
            .map(|registration| self.spawn_feed(registration))
            .buffered(concurrency)
            .collect()
            .await;

        let summary = SweepSummary {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            "Sweep finished: {} feeds, {} events published, {} without new items, {} failed",
            summary.outcomes.len(),
            summary.published_events(),
            summary.idle_feeds(),
            summary.failed_feeds()
        );
        Ok(summary)
    }

    /// Re-read one registration and process it on its own.
    pub async fn sweep_feed(&self, feed_id: Uuid) -> FeedOutcome {
        match self.engine.store().get(feed_id).await {
            Ok(registration) => self.spawn_feed(registration).await,
            Err(e) => {
                error!("Failed to read watermark for feed {}: {}", feed_id, e);
                FeedOutcome {
                    feed_id,
                    url: None,
                    outcome: SweepOutcome::failed(FailureKind::StoreRead, e.to_string()),
                }
            }
        }
    }

    // Each feed runs in its own task so a panic stays with that feed.
    async fn spawn_feed(&self, registration: FeedRegistration) -> FeedOutcome {
        let engine = self.engine.clone();
        let timeout_seconds = self.config.feed_timeout_seconds;
        let feed_id = registration.feed_id;
        let url = registration.url.clone();

        let task = tokio::spawn(async move {
            let limit = Duration::from_secs(timeout_seconds);
            match tokio::time::timeout(limit, engine.process_feed(&registration)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Feed {} timed out after {} seconds",
                        registration.url, timeout_seconds
                    );
                    SweepOutcome::failed(
                        FailureKind::Timeout,
                        format!("timed out after {} seconds", timeout_seconds),
                    )
                }
            }
        });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Feed {} task aborted: {}", url, e);
                SweepOutcome::failed(FailureKind::Aborted, e.to_string())
            }
        };

        FeedOutcome {
            feed_id,
            url: Some(url),
            outcome,
        }
    }
}
