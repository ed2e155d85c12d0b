//! PostgreSQL database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Database(e.into()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === Session Repository ===

    /// Register a session for `identity_id` with a generated token.
    pub async fn create_session(
        &self,
        identity_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Session> {
        let token = Uuid::new_v4().to_string();
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (token, identity_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token, identity_id, created_at, expires_at
            "#,
        )
        .bind(&token)
        .bind(identity_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Get an unexpired session by token
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT token, identity_id, created_at, expires_at
            FROM sessions
            WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    // === Schedule Repository ===

    pub async fn get_entry(
        &self,
        identity_id: &str,
        item_key: &str,
    ) -> Result<Option<DbScheduleEntry>> {
        let entry = sqlx::query_as::<_, DbScheduleEntry>(
            r#"
            SELECT identity_id, item_key, category, repetition_count,
                   last_reviewed_at, next_review_at, updated_at
            FROM schedule_entries
            WHERE identity_id = $1 AND item_key = $2
            "#,
        )
        .bind(identity_id)
        .bind(item_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// List entries, optionally bounded on `next_review_at` and restricted
    /// to keys starting with `prefix`. Soonest first.
    pub async fn list_entries(
        &self,
        identity_id: &str,
        due_from: Option<DateTime<Utc>>,
        due_until: Option<DateTime<Utc>>,
        prefix: Option<&str>,
    ) -> Result<Vec<DbScheduleEntry>> {
        let entries = sqlx::query_as::<_, DbScheduleEntry>(
            r#"
            SELECT identity_id, item_key, category, repetition_count,
                   last_reviewed_at, next_review_at, updated_at
            FROM schedule_entries
            WHERE identity_id = $1
              AND ($2::timestamptz IS NULL OR next_review_at >= $2)
              AND ($3::timestamptz IS NULL OR next_review_at <= $3)
              AND ($4::text IS NULL OR left(item_key, length($4)) = $4)
            ORDER BY next_review_at ASC NULLS LAST, item_key
            "#,
        )
        .bind(identity_id)
        .bind(due_from)
        .bind(due_until)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Insert or replace the entry for (identity, item)
    pub async fn upsert_entry(
        &self,
        identity_id: &str,
        entry: &ScheduleEntry,
    ) -> Result<DbScheduleEntry> {
        let repetition_count = i32::try_from(entry.repetition_count)
            .map_err(|_| ApiError::BadRequest("repetition_count out of range".to_string()))?;

        let stored = sqlx::query_as::<_, DbScheduleEntry>(
            r#"
            INSERT INTO schedule_entries
                (identity_id, item_key, category, repetition_count, last_reviewed_at, next_review_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (identity_id, item_key) DO UPDATE SET
                category = EXCLUDED.category,
                repetition_count = EXCLUDED.repetition_count,
                last_reviewed_at = EXCLUDED.last_reviewed_at,
                next_review_at = EXCLUDED.next_review_at,
                updated_at = NOW()
            RETURNING identity_id, item_key, category, repetition_count,
                      last_reviewed_at, next_review_at, updated_at
            "#,
        )
        .bind(identity_id)
        .bind(entry.item_key.as_str())
        .bind(i16::from(entry.category.to_value()))
        .bind(repetition_count)
        .bind(entry.last_reviewed_at)
        .bind(entry.next_review_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    pub async fn delete_entry(&self, identity_id: &str, item_key: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM schedule_entries
            WHERE identity_id = $1 AND item_key = $2
            "#,
        )
        .bind(identity_id)
        .bind(item_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete every entry of the identity, or those whose key starts with `prefix`
    pub async fn delete_entries(&self, identity_id: &str, prefix: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM schedule_entries
            WHERE identity_id = $1
              AND ($2::text IS NULL OR left(item_key, length($2)) = $2)
            "#,
        )
        .bind(identity_id)
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // === History Repository ===

    /// Insert records whose id is not yet stored. Returns the number inserted.
    pub async fn insert_history(&self, identity_id: &str, records: &[HistoryRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO history_records
                    (id, identity_id, item_key, old_category, new_category, changed_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(record.id)
            .bind(identity_id)
            .bind(record.item_key.as_str())
            .bind(record.old_category.map(|c| i16::from(c.to_value())))
            .bind(i16::from(record.new_category.to_value()))
            .bind(record.changed_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Newest first
    pub async fn list_history(
        &self,
        identity_id: &str,
        item_key: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<DbHistoryRecord>> {
        let records = sqlx::query_as::<_, DbHistoryRecord>(
            r#"
            SELECT id, identity_id, item_key, old_category, new_category, changed_at
            FROM history_records
            WHERE identity_id = $1
              AND ($2::text IS NULL OR item_key = $2)
            ORDER BY changed_at DESC
            LIMIT $3
            "#,
        )
        .bind(identity_id)
        .bind(item_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn clear_history(&self, identity_id: &str, prefix: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM history_records
            WHERE identity_id = $1
              AND ($2::text IS NULL OR left(item_key, length($2)) = $2)
            "#,
        )
        .bind(identity_id)
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
