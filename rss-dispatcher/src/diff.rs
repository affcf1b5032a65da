use crate::traits::{EventPublisher, FeedSource, WatermarkStore};
use crate::types::{
    DispatchEvent, FailureKind, FailureReason, FeedItem, FeedRegistration, StoreError, SweepOutcome,
};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where the stored watermark falls in a fetched item list.
#[derive(Debug, PartialEq, Eq)]
pub enum NewItems<'a> {
    /// No watermark yet: the whole snapshot is new.
    FirstSweep(&'a [FeedItem]),
    /// Items strictly newer than the watermark, newest first. May be empty.
    SinceMarker(&'a [FeedItem]),
    /// The watermark item is no longer listed by the feed.
    MarkerLost,
}

impl<'a> NewItems<'a> {
    pub fn items(&self) -> &'a [FeedItem] {
        match self {
            NewItems::FirstSweep(items) | NewItems::SinceMarker(items) => items,
            NewItems::MarkerLost => &[],
        }
    }
}

/// Split a newest-first item list at the watermark.
///
/// A watermark that cannot be found yields [`NewItems::MarkerLost`] rather
/// than treating the whole feed as new.
pub fn new_items<'a>(items: &'a [FeedItem], last_seen_id: Option<&str>) -> NewItems<'a> {
    match last_seen_id {
        None => NewItems::FirstSweep(items),
        Some(marker) => match items.iter().position(|item| item.id == marker) {
            Some(k) => NewItems::SinceMarker(&items[..k]),
            None => NewItems::MarkerLost,
        },
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

/// Index of the first item dated strictly later than the dated item before it.
///
/// Items whose timestamp does not parse are ignored. Equal timestamps are fine.
pub fn first_order_inversion(items: &[FeedItem]) -> Option<usize> {
    let mut previous: Option<DateTime<FixedOffset>> = None;
    for (index, item) in items.iter().enumerate() {
        let Some(current) = parse_timestamp(&item.published_at) else {
            continue;
        };
        if let Some(prev) = previous {
            if current > prev {
                return Some(index);
            }
        }
        previous = Some(current);
    }
    None
}

/// Runs fetch, publish and commit for one feed.
pub struct DiffEngine {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn WatermarkStore>,
    publisher: Arc<dyn EventPublisher>,
    max_items_per_sweep: Option<usize>,
}

impl DiffEngine {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: Arc<dyn WatermarkStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            max_items_per_sweep: None,
        }
    }

    pub fn with_max_items_per_sweep(mut self, max_items: Option<usize>) -> Self {
        self.max_items_per_sweep = max_items;
        self
    }

    pub fn store(&self) -> &Arc<dyn WatermarkStore> {
        &self.store
    }

    /// Dispatch everything new in the feed, then advance its watermark.
    ///
    /// Every error is folded into [`SweepOutcome::Failed`]. The watermark moves
    /// only after every new item was acknowledged by the publisher.
    pub async fn process_feed(&self, registration: &FeedRegistration) -> SweepOutcome {
        let feed_id = registration.feed_id;
        let url = registration.url.as_str();

        let items = match self.source.fetch(url).await {
            Ok(items) => items,
            Err(e) => {
                let reason = FailureReason::from(&e);
                error!("Failed to fetch feed {} ({}): {}", feed_id, url, reason);
                return SweepOutcome::Failed { reason };
            }
        };

        if let Some(index) = first_order_inversion(&items) {
            warn!(
                "Feed {} is not newest-first: item {} is dated after item {}",
                url,
                index,
                index - 1
            );
        }

        let last_seen_id = registration.last_seen_id.as_deref();
        let diff = new_items(&items, last_seen_id);
        if diff == NewItems::MarkerLost {
            warn!(
                "Watermark {:?} not found in {} current items of {}; dispatching nothing",
                last_seen_id,
                items.len(),
                url
            );
            return SweepOutcome::NoNewItems;
        }

        let mut new = diff.items();
        if new.is_empty() {
            debug!("No new items for feed: {}", url);
            return SweepOutcome::NoNewItems;
        }

        // Only the first-sweep backlog is capped. Past the watermark every
        // new item must go out before the watermark can move.
        if let (NewItems::FirstSweep(_), Some(max)) = (&diff, self.max_items_per_sweep) {
            if new.len() > max {
                info!(
                    "First sweep of {} lists {} items, dispatching the newest {}",
                    url,
                    new.len(),
                    max
                );
                new = &new[..max];
            }
        }

        for (position, item) in new.iter().enumerate() {
            let event = DispatchEvent::from(item);
            match self.publisher.publish(&event).await {
                Ok(ack) => debug!("Published {} ({:?})", item.id, ack.message_id),
                Err(e) => {
                    error!(
                        "Publish failed for feed {} after {}/{} items: {}",
                        url,
                        position,
                        new.len(),
                        e
                    );
                    return SweepOutcome::failed(
                        FailureKind::Publish,
                        format!("published {} of {} items: {}", position, new.len(), e),
                    );
                }
            }
        }

        let watermark = new[0].id.clone();
        match self
            .store
            .commit_watermark(feed_id, last_seen_id, &watermark)
            .await
        {
            Ok(()) => {
                info!(
                    "Feed {}: published {} new items, watermark now {}",
                    url,
                    new.len(),
                    watermark
                );
                SweepOutcome::Published {
                    count: new.len(),
                    watermark,
                }
            }
            Err(e) => {
                // Events are already out; the next sweep will send them again.
                error!(
                    "Watermark commit failed for {} after publishing {} items (will republish): {}",
                    url,
                    new.len(),
                    e
                );
                let kind = match &e {
                    StoreError::Conflict { .. } => FailureKind::Conflict,
                    _ => FailureKind::StoreWrite,
                };
                SweepOutcome::failed(kind, e.to_string())
            }
        }
    }
}
