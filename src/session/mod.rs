//! Cookie-backed authentication sessions.
//!
//! The session record is the one piece of persistent schema this crate
//! owns. Storage goes through the [`SessionStore`] collaborator; the
//! lifecycle rules (sliding renewal, orphan recovery, termination) live in
//! [`manager::SessionManager`].

pub mod manager;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use manager::SessionManager;
pub use store::{MemorySessionStore, PgSessionStore};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store error: {0}")]
    Store(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// One authentication session. `token` is the opaque value carried by the
/// session cookie; renewal rewrites `token` and `expires_at` in place, it
/// never creates a second record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub token: String,
    pub csrf_token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Datastore collaborator for session records. Implementations must make
/// `renew` a conditional update on the old token so concurrent renewals of
/// the same session cannot produce a lost update.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: SessionRecord) -> Result<(), SessionError>;

    /// Lookup by token. Expiry is not interpreted here; the manager decides
    /// what an expired record means.
    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Compare-and-swap renewal: succeeds (returns `true`) only when the
    /// record still carries `old_token`.
    async fn renew(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError>;

    async fn delete_by_token(&self, token: &str) -> Result<(), SessionError>;

    /// Hard-delete every record with `expires_at < now`; returns the count
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError>;

    async fn count(&self) -> Result<u64, SessionError>;
}

/// Time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Typed flow-extension wrapper for the resolved session
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionRecord);
