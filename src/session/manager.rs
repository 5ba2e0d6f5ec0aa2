//! Session lifecycle: creation, sliding renewal, orphan recovery, and
//! termination.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use chrono::Duration;
use cookie::{Cookie, SameSite};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{CurrentUser, UserDirectory};
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::extend::{handler, Middleware, RouteRule};
use crate::flow::Flow;
use crate::session::{Clock, CurrentSession, SessionError, SessionRecord, SessionStore};

/// Priority of the session middleware; it runs before everything that
/// cares about authentication.
pub const SESSION_MIDDLEWARE_PRIORITY: i32 = 0;

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    settings: AuthConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        settings: AuthConfig,
    ) -> Self {
        Self {
            store,
            users,
            clock,
            settings,
        }
    }

    fn cookie_lifetime(&self) -> Duration {
        Duration::seconds(self.settings.cookie_lifetime_secs)
    }

    fn refresh_lifetime(&self) -> Duration {
        Duration::seconds(self.settings.refresh_lifetime_secs)
    }

    /// Create a session for `user_id` and emit the session and CSRF
    /// cookies. Called after successful credential validation.
    pub async fn create_session(
        &self,
        flow: &Flow,
        csrf_token: &str,
        user_id: Uuid,
    ) -> Result<SessionRecord, SessionError> {
        let now = self.clock.now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().to_string(),
            csrf_token: csrf_token.to_string(),
            user_id,
            expires_at: now + self.cookie_lifetime(),
        };

        self.store.create(record.clone()).await?;

        flow.set_cookie(secure_cookie(
            &self.settings.csrf_cookie_name,
            csrf_token,
            self.settings.csrf_lifetime_secs,
        ));
        flow.set_cookie(secure_cookie(
            &self.settings.cookie_name,
            &record.token,
            self.settings.cookie_lifetime_secs,
        ));

        tracing::debug!(user_id = %user_id, expires_at = %record.expires_at, "Session created");
        Ok(record)
    }

    /// Resolve the session carried by the request cookie. Absent when the
    /// cookie is missing, the record is missing, or the record has already
    /// expired; an expired record is not-found, never an error.
    pub async fn resolve_session(&self, flow: &Flow) -> Result<Option<SessionRecord>, SessionError> {
        let token = match flow.cookie(&self.settings.cookie_name) {
            Some(token) => token,
            None => return Ok(None),
        };

        let record = match self.store.find_by_token(&token).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.expires_at <= self.clock.now() {
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Resolve the session and apply the sliding-renewal and orphan rules.
    ///
    /// Renewal: with `renew_at = expires_at - cookie_lifetime +
    /// refresh_lifetime`, a request after `renew_at` (but before expiry)
    /// rewrites the record in place with a fresh token and expiry, emits
    /// the replacement cookie, and redirects the request to itself so the
    /// client replays with the new cookie. The rewrite is a compare-and-
    /// swap on the old token; the loser of a concurrent renewal redirects
    /// without touching the cookie and the client retries with the
    /// winner's.
    pub async fn ensure_session(&self, flow: &Flow) -> Result<Option<SessionRecord>, ApiError> {
        let mut session = match self.resolve_session(flow).await? {
            Some(session) => session,
            None => return Ok(None),
        };

        let now = self.clock.now();
        let renew_at = session.expires_at - self.cookie_lifetime() + self.refresh_lifetime();

        tracing::debug!(expires_at = %session.expires_at, renew_at = %renew_at, "Session resolved");

        if now > renew_at {
            let new_token = Uuid::new_v4().to_string();
            let new_expiry = now + self.cookie_lifetime();

            let won = self
                .store
                .renew(&session.token, &new_token, new_expiry)
                .await?;

            if won {
                tracing::debug!(expires_at = %new_expiry, "Session renewed");
                session.token = new_token;
                session.expires_at = new_expiry;
                flow.set_cookie(secure_cookie(
                    &self.settings.cookie_name,
                    &session.token,
                    self.settings.cookie_lifetime_secs,
                ));
            } else {
                tracing::debug!("Session renewal lost a concurrent race; replaying request");
            }

            // Replay the request so the client re-submits with the fresh
            // cookie; the winner's cookie is authoritative either way
            flow.redirect(&flow.uri().to_string(), StatusCode::FOUND);
            flow.terminate();

            if !won {
                return Ok(None);
            }
        }

        // Orphan check: a session whose owner is gone is deleted outright
        if !self.users.exists(session.user_id).await? {
            tracing::warn!(user_id = %session.user_id, "Deleting orphaned session");
            self.store.delete_by_token(&session.token).await.map_err(ApiError::from)?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Hard-delete the current session and expire the client cookie
    pub async fn end_session(&self, flow: &Flow) -> Result<(), SessionError> {
        let session = match flow.extension::<CurrentSession>() {
            Some(CurrentSession(session)) => session,
            None => return Ok(()),
        };

        self.store.delete_by_token(&session.token).await?;
        flow.remove_extension::<CurrentSession>();
        flow.expire_cookie(&self.settings.cookie_name);
        tracing::debug!(user_id = %session.user_id, "Session ended");
        Ok(())
    }

    /// Hard-delete every record whose expiry is already in the past
    pub async fn cleanup_expired(&self) -> Result<u64, SessionError> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    /// The pipeline middleware: resolves the session early and attaches
    /// both the session and the resolved principal to the flow for all
    /// downstream middleware and handlers.
    pub fn middleware(manager: Arc<Self>) -> Middleware {
        let action = handler(move |flow: Arc<Flow>| {
            let manager = manager.clone();
            async move {
                let session = match manager.ensure_session(&flow).await {
                    Ok(Some(session)) => session,
                    Ok(None) => return,
                    Err(err) => {
                        tracing::warn!("Session resolution failed: {}", err);
                        return;
                    }
                };

                let user = match manager.users.find_by_id(session.user_id).await {
                    Ok(Some(user)) => user,
                    _ => return,
                };

                flow.append_nested(
                    "templateData",
                    "user",
                    json!({ "id": user.id, "name": user.name }),
                );
                flow.insert_extension(CurrentSession(session));
                flow.insert_extension(CurrentUser(user));
            }
        });

        Middleware::new(RouteRule::any(), SESSION_MIDDLEWARE_PRIORITY, action)
    }

    /// Periodic cleanup loop; run alongside the server
    pub fn spawn_cleanup(manager: Arc<Self>, every: StdDuration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(err) = manager.cleanup_expired().await {
                    tracing::error!("Session cleanup failed: {}", err);
                }
            }
        })
    }
}

/// HttpOnly + Secure + SameSite=Strict cookie rooted at `/`
fn secure_cookie(name: &str, value: &str, max_age_secs: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), value.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(cookie::time::Duration::seconds(max_age_secs));
    cookie
}
