mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{header, StatusCode};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use plinth::auth::{MemoryUserDirectory, User};
use plinth::config::AuthConfig;
use plinth::session::{
    Clock, CurrentSession, MemorySessionStore, SessionError, SessionManager, SessionRecord,
    SessionStore,
};

use common::{flow, flow_with_session, TestClock};

struct Fixture {
    manager: Arc<SessionManager>,
    store: Arc<MemorySessionStore>,
    users: Arc<MemoryUserDirectory>,
    clock: Arc<TestClock>,
    settings: AuthConfig,
    user_id: Uuid,
}

async fn fixture() -> Fixture {
    let settings = AuthConfig::default();
    let store = Arc::new(MemorySessionStore::new());
    let users = MemoryUserDirectory::new();
    let clock = TestClock::at(Utc::now());

    let user_id = Uuid::new_v4();
    users
        .insert(
            User {
                id: user_id,
                name: "admin".to_string(),
                permissions: vec!["admin".to_string()],
            },
            "secret",
        )
        .await;

    let manager = Arc::new(SessionManager::new(
        store.clone(),
        users.clone(),
        clock.clone(),
        settings.clone(),
    ));

    Fixture {
        manager,
        store,
        users,
        clock,
        settings,
        user_id,
    }
}

fn set_cookies(flow: &plinth::flow::Flow) -> Vec<String> {
    flow.to_response()
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(String::from))
        .collect()
}

#[tokio::test]
async fn create_then_resolve_roundtrip() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");

    let record = fx.manager.create_session(&login, "csrf-token", fx.user_id).await?;
    assert_eq!(record.user_id, fx.user_id);

    // Both the CSRF and session cookies were emitted with the hardened flags
    let cookies = set_cookies(&login);
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert!(cookie.contains("HttpOnly"), "missing HttpOnly: {}", cookie);
        assert!(cookie.contains("Secure"), "missing Secure: {}", cookie);
        assert!(cookie.contains("SameSite=Strict"), "missing SameSite: {}", cookie);
        assert!(cookie.contains("Path=/"), "missing Path: {}", cookie);
    }

    let next = flow_with_session("GET", "/admin/dashboard", &fx.settings.cookie_name, &record.token);
    let resolved = fx.manager.resolve_session(&next).await?.expect("session");
    assert_eq!(resolved.token, record.token);
    Ok(())
}

#[tokio::test]
async fn expired_sessions_resolve_to_none() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    fx.clock.advance(Duration::seconds(fx.settings.cookie_lifetime_secs + 1));

    let next = flow_with_session("GET", "/", &fx.settings.cookie_name, &record.token);
    assert!(fx.manager.resolve_session(&next).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn no_renewal_before_the_refresh_threshold() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    // 44 minutes in: still inside the refresh window (45m of a 60m cookie)
    fx.clock.advance(Duration::minutes(44));

    let request = flow_with_session("GET", "/admin/dashboard", &fx.settings.cookie_name, &record.token);
    let session = fx.manager.ensure_session(&request).await?.expect("session");

    assert_eq!(session.token, record.token);
    assert_eq!(session.expires_at, record.expires_at);
    assert!(!request.is_terminated());
    assert!(set_cookies(&request).is_empty());
    Ok(())
}

#[tokio::test]
async fn renewal_rotates_the_token_and_replays_the_request() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    // 46 minutes in: past the refresh threshold, before expiry
    fx.clock.advance(Duration::minutes(46));

    let request = flow_with_session(
        "GET",
        "/admin/dashboard?tab=2",
        &fx.settings.cookie_name,
        &record.token,
    );
    let session = fx.manager.ensure_session(&request).await?.expect("session");

    assert_ne!(session.token, record.token);
    assert_eq!(
        session.expires_at,
        fx.clock.now() + Duration::seconds(fx.settings.cookie_lifetime_secs)
    );

    // The request is redirected to itself and processing stops
    assert!(request.is_terminated());
    assert_eq!(request.status(), StatusCode::FOUND);
    let response = request.to_response();
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/admin/dashboard?tab=2")
    );

    // The replacement cookie carries the new token
    let cookies = set_cookies(&request);
    assert!(cookies.iter().any(|c| c.contains(&session.token)));

    // The old token is gone from the store
    assert!(fx.store.find_by_token(&record.token).await?.is_none());
    assert!(fx.store.find_by_token(&session.token).await?.is_some());
    Ok(())
}

/// A store whose renewal always loses, as if a concurrent request rotated
/// the token between our read and our update.
struct AlwaysLosesRenewal {
    inner: MemorySessionStore,
}

#[async_trait]
impl SessionStore for AlwaysLosesRenewal {
    async fn create(&self, record: SessionRecord) -> Result<(), SessionError> {
        self.inner.create(record).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        self.inner.find_by_token(token).await
    }

    async fn renew(
        &self,
        _old_token: &str,
        _new_token: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), SessionError> {
        self.inner.delete_by_token(token).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        self.inner.delete_expired(now).await
    }

    async fn count(&self) -> Result<u64, SessionError> {
        self.inner.count().await
    }
}

#[tokio::test]
async fn losing_a_renewal_race_replays_without_touching_the_cookie() -> Result<()> {
    let settings = AuthConfig::default();
    let store = Arc::new(AlwaysLosesRenewal {
        inner: MemorySessionStore::new(),
    });
    let users = MemoryUserDirectory::new();
    let clock = TestClock::at(Utc::now());

    let user_id = Uuid::new_v4();
    users
        .insert(
            User {
                id: user_id,
                name: "admin".to_string(),
                permissions: vec![],
            },
            "secret",
        )
        .await;

    let manager = SessionManager::new(store, users, clock.clone(), settings.clone());

    let login = flow("POST", "/admin/login");
    let record = manager.create_session(&login, "csrf", user_id).await?;

    clock.advance(Duration::minutes(46));

    let request = flow_with_session("GET", "/admin/dashboard", &settings.cookie_name, &record.token);
    let session = manager.ensure_session(&request).await?;

    // No session for this pass; the client replays with the winner's cookie
    assert!(session.is_none());
    assert!(request.is_terminated());
    assert_eq!(request.status(), StatusCode::FOUND);
    assert!(set_cookies(&request).is_empty());
    Ok(())
}

#[tokio::test]
async fn orphaned_sessions_are_deleted_on_resolution() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    fx.users.remove(fx.user_id).await;

    let request = flow_with_session("GET", "/", &fx.settings.cookie_name, &record.token);
    assert!(fx.manager.ensure_session(&request).await?.is_none());
    assert_eq!(fx.store.count().await?, 0);

    // A second pass with the same stale cookie is a clean miss
    let again = flow_with_session("GET", "/", &fx.settings.cookie_name, &record.token);
    assert!(fx.manager.ensure_session(&again).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn ending_a_session_deletes_the_record_and_expires_the_cookie() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    let request = flow("GET", "/admin/logout");
    request.insert_extension(CurrentSession(record.clone()));

    fx.manager.end_session(&request).await?;

    assert_eq!(fx.store.count().await?, 0);
    assert!(request.extension::<CurrentSession>().is_none());

    let cookies = set_cookies(&request);
    assert!(cookies.iter().any(|c| c.contains("Max-Age=0")));

    // Ending again without a session is a no-op
    fx.manager.end_session(&request).await?;
    Ok(())
}

#[tokio::test]
async fn cleanup_removes_exactly_the_expired_records() -> Result<()> {
    let fx = fixture().await;

    let login = flow("POST", "/admin/login");
    fx.manager.create_session(&login, "csrf-a", fx.user_id).await?;

    // Second session created half a lifetime later stays alive when the
    // first one has lapsed
    fx.clock.advance(Duration::seconds(fx.settings.cookie_lifetime_secs / 2));
    fx.manager.create_session(&login, "csrf-b", fx.user_id).await?;

    fx.clock.advance(Duration::seconds(fx.settings.cookie_lifetime_secs / 2 + 1));

    let removed = fx.manager.cleanup_expired().await?;
    assert_eq!(removed, 1);
    assert_eq!(fx.store.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn session_middleware_attaches_session_and_principal() -> Result<()> {
    let fx = fixture().await;
    let login = flow("POST", "/admin/login");
    let record = fx.manager.create_session(&login, "csrf", fx.user_id).await?;

    let request = flow_with_session("GET", "/admin/dashboard", &fx.settings.cookie_name, &record.token);
    let middleware = SessionManager::middleware(fx.manager.clone());
    (middleware.action)(request.clone()).await;

    let CurrentSession(session) = request.extension::<CurrentSession>().expect("session attached");
    assert_eq!(session.user_id, fx.user_id);

    let plinth::auth::CurrentUser(user) =
        request.extension::<plinth::auth::CurrentUser>().expect("principal attached");
    assert_eq!(user.id, fx.user_id);

    assert_eq!(
        request.get_nested("templateData", "user").and_then(|v| v["name"].as_str().map(String::from)),
        Some("admin".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn middleware_is_a_noop_without_a_cookie() -> Result<()> {
    let fx = fixture().await;
    let request = flow("GET", "/");

    let middleware = SessionManager::middleware(fx.manager.clone());
    (middleware.action)(request.clone()).await;

    assert!(request.extension::<CurrentSession>().is_none());
    assert!(!request.is_terminated());
    Ok(())
}
