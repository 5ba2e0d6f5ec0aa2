use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use plinth::admin;
use plinth::auth::{MemoryUserDirectory, User, UserDirectory};
use plinth::config::config;
use plinth::dispatch::{server, Dispatcher, RegistryHandle};
use plinth::extend::{handler, Extension, Registry, Resource, RouteRule};
use plinth::flow::Flow;
use plinth::session::{
    MemorySessionStore, PgSessionStore, SessionManager, SessionStore, SystemClock,
};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, PLINTH_PORT, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config();
    tracing::info!("Starting Plinth host in {:?} mode", config.environment);

    let store: Arc<dyn SessionStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PgSessionStore::connect(&url, config.database.max_connections)
                .await
                .unwrap_or_else(|e| panic!("failed to connect session store: {}", e));
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; sessions are in-memory and lost on restart");
            Arc::new(MemorySessionStore::new())
        }
    };

    let users = dev_directory().await;

    let sessions = Arc::new(SessionManager::new(
        store,
        users.clone(),
        Arc::new(SystemClock),
        config.auth.clone(),
    ));

    let registry = build_registry(sessions.clone(), users)
        .unwrap_or_else(|e| panic!("failed to assemble registry: {}", e));
    let registry = Arc::new(registry);

    if let Err(e) = sessions.cleanup_expired().await {
        tracing::warn!("Startup session cleanup failed: {}", e);
    }
    SessionManager::spawn_cleanup(sessions, Duration::from_secs(3600));

    let dispatcher = Arc::new(Dispatcher::new(registry));
    let app = server::router(dispatcher, config.server.max_body_size_bytes);

    let port = std::env::var("PLINTH_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(config.server.port);

    println!("🚀 Plinth host listening on http://0.0.0.0:{}", port);

    server::serve(app, port).await.expect("server");
}

/// Assemble and seal the registry: the built-in host extension, the admin
/// extension, and the session middleware, then init hooks, then finalize.
fn build_registry(
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserDirectory>,
) -> Result<Registry, Box<dyn std::error::Error>> {
    let mut registry = Registry::new();

    registry.register_extension(host_extension()?)?;
    registry.register_extension(admin::extension(sessions.clone(), users)?)?;
    registry.register_middleware(SessionManager::middleware(sessions))?;

    registry.run_init_hooks()?;
    registry.finalize();
    Ok(registry)
}

/// Core host surface: liveness probe and extension discovery
fn host_extension() -> Result<Extension, plinth::extend::RouteError> {
    let ext = Extension::new("host", "Host")
        .description("Core host endpoints")
        .internal(true)
        .resource(Resource::new(
            RouteRule::new("GET", "/health")?,
            "Liveness probe",
            handler(health),
        ))
        .resource(Resource::new(
            RouteRule::new("GET", "/api/extensions")?,
            "Installed extension discovery",
            handler(list_extensions),
        ));
    Ok(ext)
}

async fn health(flow: Arc<Flow>) {
    flow.write_json(StatusCode::OK, &json!({ "success": true, "status": "healthy" }));
}

async fn list_extensions(flow: Arc<Flow>) {
    let registry = match flow.extension::<RegistryHandle>() {
        Some(RegistryHandle(registry)) => registry,
        None => {
            flow.write_error_json(StatusCode::INTERNAL_SERVER_ERROR, "Registry unavailable");
            return;
        }
    };
    let extensions: Vec<_> = registry
        .extensions()
        .iter()
        .map(|e| e.to_api_json())
        .collect();
    flow.write_json(StatusCode::OK, &json!({ "success": true, "data": extensions }));
}

/// Development directory with a single admin account. A real deployment
/// swaps this for a directory backed by its user storage.
async fn dev_directory() -> Arc<MemoryUserDirectory> {
    let directory = MemoryUserDirectory::new();
    let password = std::env::var("PLINTH_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    directory
        .insert(
            User {
                id: Uuid::new_v4(),
                name: "admin".to_string(),
                permissions: vec![admin::ADMIN_PERMISSION.to_string()],
            },
            password,
        )
        .await;
    directory
}
