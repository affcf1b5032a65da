use crate::types::{FeedItem, FetchError};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS, Atom or JSON Feed document into items, keeping document order.
    pub fn parse_items(content: &str) -> Result<Vec<FeedItem>, FetchError> {
        let content = Self::normalize(content)?;
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| FetchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let mut seen_ids = HashSet::new();
        let mut items = Vec::with_capacity(feed.entries.len());

        for entry in feed.entries {
            let Some(item) = Self::parse_entry(entry) else {
                continue;
            };
            // First occurrence keeps its position
            if !seen_ids.insert(item.id.clone()) {
                debug!("Skipping duplicate entry with id: {}", item.id);
                continue;
            }
            items.push(item);
        }

        debug!("Parsed feed with {} entries", items.len());
        Ok(items)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<FeedItem> {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            debug!("Skipping entry without link: {}", entry.id);
            return None;
        };

        let id = if entry.id.is_empty() {
            link.clone()
        } else {
            entry.id
        };

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.to_rfc2822())
            .unwrap_or_default();

        Some(FeedItem {
            id,
            title,
            link,
            published_at,
        })
    }

    fn normalize(content: &str) -> Result<String, FetchError> {
        let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
        let normalized = normalized.trim_start_matches('\u{feff}').trim();

        if normalized.is_empty() {
            return Err(FetchError::Parse("Empty content after normalization".to_string()));
        }

        Ok(normalized.to_string())
    }
}
