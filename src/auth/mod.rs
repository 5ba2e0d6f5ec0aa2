//! Principal and user-directory collaborator interfaces.
//!
//! The host does not own user storage or password hashing; it consumes a
//! `UserDirectory` and works against the `Principal` trait for permission
//! checks. The flat permission model is a string-membership check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

/// An authenticated identity with flat string permissions
pub trait Principal: Send + Sync {
    fn id(&self) -> Uuid;
    fn name(&self) -> &str;

    /// Empty permission strings are granted to everyone
    fn has_permission(&self, permission: &str) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

impl Principal for User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        permission.is_empty() || self.permissions.iter().any(|p| p == permission)
    }
}

/// Lookup and credential validation against external user storage
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DirectoryError>;

    async fn exists(&self, id: Uuid) -> Result<bool, DirectoryError> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Validate credentials and return the user on success. Password
    /// verification (hashing, peppering) is the implementation's concern.
    async fn validate_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, DirectoryError>;
}

/// In-memory directory for tests and single-admin development setups.
/// Passwords are stored as given; production deployments supply their own
/// `UserDirectory` with real credential storage.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, (User, String)>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, user: User, password: impl Into<String>) {
        let mut users = self.users.write().await;
        users.insert(user.id, (user, password.into()));
    }

    pub async fn remove(&self, id: Uuid) {
        let mut users = self.users.write().await;
        users.remove(&id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn validate_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|(user, stored)| user.name == username && stored == password)
            .map(|(user, _)| user.clone()))
    }
}

/// Typed flow-extension wrapper for the resolved principal
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);
