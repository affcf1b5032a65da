use crate::traits::WatermarkStore;
use crate::types::{FeedRecord, FeedRegistration, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Watermark records in the `feeds` table.
pub struct PgWatermarkStore {
    db: Pool<Postgres>,
}

impl PgWatermarkStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await.map_err(StoreError::from)?;
        Ok(Self { db })
    }

    pub fn from_pool(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.db
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> std::result::Result<FeedRecord, sqlx::Error> {
        Ok(FeedRecord {
            feed_id: row.try_get("id")?,
            url: row.try_get("url")?,
            last_seen_id: row.try_get("last_seen_id")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    async fn exists(&self, feed_id: Uuid) -> std::result::Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM feeds WHERE id = $1")
            .bind(feed_id)
            .fetch_one(&self.db)
            .await?;
        Ok(found > 0)
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn register(&self, url: &str) -> std::result::Result<Uuid, StoreError> {
        let feed_id = Uuid::new_v4();
        let now = Utc::now();

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO feeds (id, url, last_seen_id, created_at, updated_at)
            VALUES ($1, $2, NULL, $3, $4)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(feed_id)
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        match inserted {
            Some(id) => {
                info!("Added new feed: {} with ID: {}", url, id);
                Ok(id)
            }
            None => {
                let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM feeds WHERE url = $1")
                    .bind(url)
                    .fetch_one(&self.db)
                    .await?;
                Err(StoreError::AlreadyRegistered { id: existing })
            }
        }
    }

    async fn list_registrations(&self) -> std::result::Result<Vec<FeedRegistration>, StoreError> {
        Ok(self
            .list_records()
            .await?
            .into_iter()
            .map(FeedRegistration::from)
            .collect())
    }

    async fn list_records(&self) -> std::result::Result<Vec<FeedRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, url, last_seen_id, created_at, updated_at FROM feeds ORDER BY created_at, id",
        )
        .fetch_all(&self.db)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::record_from_row(row)?);
        }
        Ok(records)
    }

    async fn get(&self, feed_id: Uuid) -> std::result::Result<FeedRegistration, StoreError> {
        let row = sqlx::query(
            "SELECT id, url, last_seen_id, created_at, updated_at FROM feeds WHERE id = $1",
        )
        .bind(feed_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Self::record_from_row(&row)?.into()),
            None => Err(StoreError::FeedNotFound { id: feed_id }),
        }
    }

    async fn commit_watermark(
        &self,
        feed_id: Uuid,
        expected: Option<&str>,
        new_last_seen_id: &str,
    ) -> std::result::Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_seen_id = $1, updated_at = $2
            WHERE id = $3 AND last_seen_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(new_last_seen_id)
        .bind(Utc::now())
        .bind(feed_id)
        .bind(expected)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            if !self.exists(feed_id).await? {
                return Err(StoreError::FeedNotFound { id: feed_id });
            }
            return Err(StoreError::Conflict {
                id: feed_id,
                expected: expected.map(str::to_string),
            });
        }

        debug!("Feed {} watermark advanced to {}", feed_id, new_last_seen_id);
        Ok(())
    }
}
