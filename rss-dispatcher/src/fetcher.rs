use crate::parser::FeedParser;
use crate::traits::FeedSource;
use crate::types::{FeedItem, FetchConfig, FetchError};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// HTTP feed source: reqwest with retry and backoff, feed-rs for parsing.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect)
            .build()?;

        Ok(Self { client, config })
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            randomization_factor: FetchConfig::RETRY_JITTER,
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        }
    }

    /// Download the raw feed document, retrying transport errors and non-success statuses.
    pub async fn fetch_content(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let start_time = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            let error = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    let content = self.read_body(response).await?;
                    info!(
                        "Fetched feed: {} ({} bytes in {}ms)",
                        url,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                Ok(response) => FetchError::Status {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                },
                Err(e) => FetchError::Http(e),
            };

            if attempt >= self.config.max_retries {
                warn!("Giving up on {} after {} attempts: {}", url, attempt + 1, error);
                return Err(error);
            }
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        "Attempt {} failed for {}, retrying in {:?}: {}",
                        attempt + 1,
                        url,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            }
        }
    }

    async fn read_body(&self, response: Response) -> Result<String, FetchError> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(FetchError::FeedTooLarge { size_mb });
            }
        }

        let content = response.text().await?;
        // Chunked responses carry no length header
        let size_mb = content.len() / (1024 * 1024);
        if size_mb > self.config.max_feed_size_mb {
            return Err(FetchError::FeedTooLarge { size_mb });
        }
        Ok(content)
    }
}

#[async_trait]
impl FeedSource for Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        debug!("Fetching feed: {}", url);
        let content = self.fetch_content(url).await?;
        FeedParser::parse_items(&content)
    }
}
