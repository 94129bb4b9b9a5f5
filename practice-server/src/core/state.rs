use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;

use crate::audit::{AuditAction, AuditService};
use crate::auth::{JwtService, RateLimiter, hash_password};
use crate::core::Config;
use crate::db::DbService;
use crate::db::repository::staff_user;
use crate::utils::AppError;
use shared::models::Role;

/// Shared state handed to every handler
///
/// Cheap to clone: the pool, JWT service and rate limiter are all
/// reference-counted.
///
/// | field | purpose |
/// |-------|---------|
/// | config | immutable settings |
/// | pool | SQLite connection pool |
/// | jwt_service | token issue / validation |
/// | audit | audit trail writer |
/// | rate_limiter | login attempt windows |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub pool: SqlitePool,
    pub jwt_service: Arc<JwtService>,
    pub audit: AuditService,
    pub rate_limiter: RateLimiter,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("environment", &self.config.environment)
            .field("database_path", &self.config.database_path)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));
        let audit = AuditService::new(pool.clone());
        Self {
            config,
            pool,
            jwt_service,
            audit,
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Initialize in order:
    /// 1. database directory
    /// 2. database (migrations applied)
    /// 3. bootstrap administrator when no staff exist
    /// 4. startup audit entry
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        if let Some(dir) = config.database_dir() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::internal(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }

        let db = DbService::new(&config.database_path, config.max_connections).await?;
        let state = Self::new(config.clone(), db.pool);

        state.bootstrap_admin().await?;
        state
            .audit
            .log_as(
                AuditAction::SystemStartup,
                "system",
                "server",
                None,
                None,
                json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "environment": state.config.environment,
                }),
            )
            .await;

        Ok(state)
    }

    /// In-memory state for tests; admin password is `admin-password`
    pub async fn for_tests() -> Result<Self, AppError> {
        let db = DbService::in_memory().await?;
        let state = Self::new(Config::for_tests(), db.pool);
        state.bootstrap_admin().await?;
        Ok(state)
    }

    pub fn get_jwt_service(&self) -> Arc<JwtService> {
        self.jwt_service.clone()
    }

    /// Create the first administrator account when the staff table is empty
    ///
    /// Without `ADMIN_PASSWORD` a random password is generated and logged once.
    async fn bootstrap_admin(&self) -> Result<(), AppError> {
        if staff_user::count(&self.pool).await? > 0 {
            return Ok(());
        }

        let password = match &self.config.admin_password {
            Some(p) => p.clone(),
            None => {
                let generated = uuid::Uuid::new_v4().simple().to_string();
                tracing::warn!(
                    username = %self.config.admin_username,
                    password = %generated,
                    "No ADMIN_PASSWORD set; generated a bootstrap administrator password. Change it after first login."
                );
                generated
            }
        };

        let hash = hash_password(&password)?;
        let admin = staff_user::create(
            &self.pool,
            &self.config.admin_username,
            "Administrator",
            &hash,
            Role::Admin,
        )
        .await?;

        tracing::info!(username = %admin.username, "Bootstrap administrator created");
        self.audit
            .log_as(
                AuditAction::Created,
                "staff_user",
                admin.id,
                None,
                None,
                crate::audit::create_snapshot(&admin, "staff_user"),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_bootstraps_admin_once() {
        let state = ServerState::for_tests().await.unwrap();
        let admin = staff_user::find_by_username(&state.pool, "admin")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(crate::auth::verify_password("admin-password", &admin.hash_pass));

        state.bootstrap_admin().await.unwrap();
        assert_eq!(staff_user::count(&state.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn initialize_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: dir
                .path()
                .join("database")
                .join("practice.db")
                .to_string_lossy()
                .into_owned(),
            ..Config::for_tests()
        };
        let state = ServerState::initialize(&config).await.unwrap();
        assert!(std::path::Path::new(&config.database_path).exists());
        assert_eq!(staff_user::count(&state.pool).await.unwrap(), 1);
    }
}
