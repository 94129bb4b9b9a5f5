use std::path::PathBuf;

use crate::auth::{JwtConfig, JwtError};

/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Notes |
/// |----------|---------|-------|
/// | WORK_DIR | ./data | working directory (database, logs) |
/// | DATABASE_PATH | `<WORK_DIR>/database/practice.db` | SQLite file |
/// | HTTP_PORT | 3000 | HTTP port |
/// | ENVIRONMENT | development | development / staging / production |
/// | REQUEST_TIMEOUT_MS | 30000 | per-request timeout |
/// | MAX_CONNECTIONS | 5 | database pool size |
/// | LOG_LEVEL | info | overridden by `RUST_LOG` |
/// | LOG_DIR | (unset) | enables daily rolling log files |
/// | ADMIN_USERNAME | admin | bootstrap administrator |
/// | ADMIN_PASSWORD | (generated) | bootstrap administrator password |
/// | CORS_PERMISSIVE | true | allow any origin |
/// | LOGIN_MAX_ATTEMPTS | 10 | login attempts per IP and window |
/// | LOGIN_WINDOW_SECS | 60 | login rate-limit window |
///
/// JWT settings are read by [`JwtConfig::from_env`].
///
/// ```ignore
/// WORK_DIR=/srv/practice HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub database_path: String,
    pub http_port: u16,
    /// development | staging | production | test
    pub environment: String,
    pub request_timeout_ms: u64,
    pub max_connections: u32,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub cors_permissive: bool,
    pub login_max_attempts: u32,
    pub login_window_secs: u64,
    pub jwt: JwtConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Fails only when the JWT secret is unusable.
    pub fn from_env() -> Result<Self, JwtError> {
        let work_dir = std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into());
        let database_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| {
            PathBuf::from(&work_dir)
                .join("database")
                .join("practice.db")
                .to_string_lossy()
                .into_owned()
        });

        Ok(Self {
            database_path,
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30_000),
            max_connections: env_or("MAX_CONNECTIONS", 5),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            admin_username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            admin_password: std::env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
            cors_permissive: env_or("CORS_PERMISSIVE", true),
            login_max_attempts: env_or("LOGIN_MAX_ATTEMPTS", 10),
            login_window_secs: env_or("LOGIN_WINDOW_SECS", 60),
            jwt: JwtConfig::from_env()?,
            work_dir,
        })
    }

    /// Override the working directory and port, keeping everything else
    pub fn with_overrides(
        work_dir: impl Into<String>,
        http_port: u16,
    ) -> Result<Self, JwtError> {
        let mut config = Self::from_env()?;
        config.work_dir = work_dir.into();
        config.database_path = PathBuf::from(&config.work_dir)
            .join("database")
            .join("practice.db")
            .to_string_lossy()
            .into_owned();
        config.http_port = http_port;
        Ok(config)
    }

    /// Deterministic configuration for tests (no environment access)
    pub fn for_tests() -> Self {
        Self {
            work_dir: "./target/test-data".into(),
            database_path: ":memory:".into(),
            http_port: 0,
            environment: "test".into(),
            request_timeout_ms: 30_000,
            max_connections: 1,
            log_level: "warn".into(),
            log_dir: None,
            admin_username: "admin".into(),
            admin_password: Some("admin-password".into()),
            cors_permissive: true,
            login_max_attempts: 1000,
            login_window_secs: 60,
            jwt: JwtConfig::for_tests(),
        }
    }

    /// Directory holding the database file
    pub fn database_dir(&self) -> Option<PathBuf> {
        PathBuf::from(&self.database_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_isolated() {
        let config = Config::for_tests();
        assert_eq!(config.environment, "test");
        assert!(!config.is_production());
        assert!(config.jwt.secret.len() >= 32);
        assert!(config.database_dir().is_none());
    }

    #[test]
    fn database_dir_is_parent_of_file() {
        let mut config = Config::for_tests();
        config.database_path = "/srv/practice/database/practice.db".into();
        assert_eq!(
            config.database_dir(),
            Some(PathBuf::from("/srv/practice/database"))
        );
    }
}
