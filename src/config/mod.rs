use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body_size_bytes: usize,
    pub enable_request_logging: bool,
}

/// Cookie session settings.
///
/// `refresh_lifetime_secs` marks the point, measured from issuance, after
/// which a still-valid session is reissued with a fresh token and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the session token
    pub cookie_name: String,
    /// Name of the cookie carrying the CSRF token
    pub csrf_cookie_name: String,
    /// Absolute session lifetime in seconds
    pub cookie_lifetime_secs: i64,
    /// Age at which a session becomes eligible for renewal, in seconds.
    /// Must be less than `cookie_lifetime_secs`.
    pub refresh_lifetime_secs: i64,
    /// Lifetime of the CSRF cookie in seconds (long-lived by design)
    pub csrf_lifetime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub enable_query_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PLINTH_PORT").or_else(|_| env::var("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("PLINTH_MAX_BODY_SIZE") {
            self.server.max_body_size_bytes = v.parse().unwrap_or(self.server.max_body_size_bytes);
        }
        if let Ok(v) = env::var("PLINTH_AUTH_COOKIE") {
            self.auth.cookie_name = v;
        }
        if let Ok(v) = env::var("PLINTH_CSRF_COOKIE") {
            self.auth.csrf_cookie_name = v;
        }
        if let Ok(v) = env::var("PLINTH_COOKIE_LIFETIME_SECS") {
            self.auth.cookie_lifetime_secs = v.parse().unwrap_or(self.auth.cookie_lifetime_secs);
        }
        if let Ok(v) = env::var("PLINTH_REFRESH_LIFETIME_SECS") {
            self.auth.refresh_lifetime_secs = v.parse().unwrap_or(self.auth.refresh_lifetime_secs);
        }
        if let Ok(v) = env::var("PLINTH_DB_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 8080,
                max_body_size_bytes: 2 * 1024 * 1024,
                enable_request_logging: true,
            },
            auth: AuthConfig::default(),
            database: DatabaseConfig {
                max_connections: 5,
                enable_query_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                max_body_size_bytes: 2 * 1024 * 1024,
                enable_request_logging: false,
            },
            auth: AuthConfig::default(),
            database: DatabaseConfig {
                max_connections: 20,
                enable_query_logging: false,
            },
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "Plinth_Auth".to_string(),
            csrf_cookie_name: "Plinth_CSRF".to_string(),
            cookie_lifetime_secs: 60 * 60,
            refresh_lifetime_secs: 45 * 60,
            csrf_lifetime_secs: 14 * 24 * 60 * 60,
        }
    }
}

static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

/// Access the process-wide configuration singleton
pub fn config() -> &'static AppConfig {
    &CONFIG
}
