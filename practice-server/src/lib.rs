//! Practice Server - healthcare practice management backend
//!
//! # Architecture
//!
//! A single HTTP/JSON service over an embedded SQLite database:
//!
//! - **Database** (`db`): SQLite pool, migrations, per-entity repositories
//! - **Auth** (`auth`): JWT + Argon2 staff login, role permissions
//! - **Audit** (`audit`): SHA-256 chained, append-only audit trail
//! - **HTTP API** (`api`): list/get/create/update/delete per entity
//!
//! # Layout
//!
//! ```text
//! practice-server/src/
//! ├── core/          # config, state, server
//! ├── auth/          # JWT, permissions, login rate limit
//! ├── audit/         # audit trail
//! ├── api/           # HTTP routes and handlers
//! ├── routes/        # router assembly + tower layers
//! ├── middleware/    # request logging
//! ├── utils/         # errors, logger, validation
//! └── db/            # pool + repositories
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod core;
pub mod db;
pub mod middleware;
pub mod routes;
pub mod utils;

// Re-export public types
pub use auth::{CurrentUser, JwtService};
pub use core::{Config, Server, ServerState};
pub use routes::build_app;
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

// Security logging macro - supports tracing format specifiers
#[macro_export]
macro_rules! security_log {
    ($level:expr, $event:expr, $($key:ident = $value:expr),*) => {
        tracing::info!(
            target: "security",
            level = $level,
            event = $event,
            $($key = $value),*
        );
    };
}

/// Initialize logging (console plus optional daily file) from the given config
pub fn setup_environment(config: &Config) {
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
}

pub fn print_banner() {
    println!(
        r#"
    ____                  __  _
   / __ \_________ ______/ /_(_)_______
  / /_/ / ___/ __ `/ ___/ __/ / ___/ _ \
 / ____/ /  / /_/ / /__/ /_/ / /__/  __/
/_/   /_/   \__,_/\___/\__/_/\___/\___/
    "#
    );
}
