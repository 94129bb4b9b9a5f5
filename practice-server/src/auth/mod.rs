//! Authentication and authorization
//!
//! - [`JwtService`] - token issue / validation
//! - [`CurrentUser`] - authenticated user context
//! - [`require_auth`] - authentication middleware
//! - [`require_permission`] - permission middleware
//! - [`RateLimiter`] - login attempt limiting

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod rate_limit;

pub use jwt::{Claims, CurrentUser, JwtConfig, JwtError, JwtService};
pub use middleware::{require_admin, require_auth, require_permission};
pub use password::{hash_password, verify_password};
pub use permissions::permissions_for;
pub use rate_limit::{RateLimiter, login_rate_limit};
