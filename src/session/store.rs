//! Session store implementations: Postgres for deployments, in-memory for
//! tests and datastore-free development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::session::{SessionError, SessionRecord, SessionStore};

/// Postgres-backed store. The schema below is the only persistent schema
/// the host owns.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` and bootstrap the sessions table
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, SessionError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id uuid PRIMARY KEY,
                token text NOT NULL UNIQUE,
                csrf_token text NOT NULL,
                user_id uuid NOT NULL,
                expires_at timestamptz NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS sessions_user_id_idx ON sessions (user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS sessions_expires_at_idx ON sessions (expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), SessionError> {
        sqlx::query(
            "INSERT INTO sessions (id, token, csrf_token, user_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(&record.token)
        .bind(&record.csrf_token)
        .bind(record.user_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, token, csrf_token, user_id, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn renew(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        // Conditional update on the old token: of two racing renewals only
        // one can observe a row here
        let result = sqlx::query(
            "UPDATE sessions SET token = $1, expires_at = $2 WHERE token = $3",
        )
        .bind(new_token)
        .bind(expires_at)
        .bind(old_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, SessionError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// In-memory store keyed by session token
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), SessionError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.token) {
            return Err(SessionError::Store(format!(
                "duplicate session token: {}",
                record.token
            )));
        }
        records.insert(record.token.clone(), record);
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let records = self.records.read().await;
        Ok(records.get(token).cloned())
    }

    async fn renew(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let mut records = self.records.write().await;
        match records.remove(old_token) {
            Some(mut record) => {
                record.token = new_token.to_string();
                record.expires_at = expires_at;
                records.insert(record.token.clone(), record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), SessionError> {
        let mut records = self.records.write().await;
        records.remove(token);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at >= now);
        Ok((before - records.len()) as u64)
    }

    async fn count(&self) -> Result<u64, SessionError> {
        let records = self.records.read().await;
        Ok(records.len() as u64)
    }
}
