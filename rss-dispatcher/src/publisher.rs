use crate::traits::EventPublisher;
use crate::types::{DispatchEvent, PublishAck, PublishError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Pushes each event as a JSON POST. A 2xx response is the acknowledgement.
pub struct HttpPublisher {
    client: Client,
    endpoint: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl HttpPublisher {
    pub fn new(
        endpoint: String,
        bearer_token: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            bearer_token,
        })
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, event: &DispatchEvent) -> Result<PublishAck, PublishError> {
        let mut request = self.client.post(&self.endpoint).json(event);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Publish of {} rejected with HTTP {}", event.link, status);
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let header_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let message_id = match header_id {
            Some(id) => Some(id),
            None => {
                let body = response.text().await.unwrap_or_default();
                serde_json::from_str::<PushResponse>(&body)
                    .ok()
                    .and_then(|r| r.message_ids.into_iter().next())
            }
        };

        debug!("Published {} (message id: {:?})", event.link, message_id);
        Ok(PublishAck { message_id })
    }
}

/// Appends events to the `dispatch_events` outbox table for consumers to drain.
pub struct PgOutboxPublisher {
    db: Pool<Postgres>,
}

impl PgOutboxPublisher {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventPublisher for PgOutboxPublisher {
    async fn publish(&self, event: &DispatchEvent) -> Result<PublishAck, PublishError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(event)?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_events (id, title, link, pub_date, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&event.title)
        .bind(&event.link)
        .bind(&event.published_at)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        debug!("Queued {} in outbox as {}", event.link, id);
        Ok(PublishAck {
            message_id: Some(id.to_string()),
        })
    }
}
