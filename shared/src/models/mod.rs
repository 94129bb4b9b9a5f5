//! Data models
//!
//! Shared between the practice server and API clients.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY, snowflake values).

pub mod consultation;
pub mod dashboard;
pub mod discount;
pub mod form;
pub mod insurance;
pub mod invoice;
pub mod order;
pub mod patient;
pub mod pharmacy;
pub mod provider;
pub mod service;
pub mod session;
pub mod staff_user;
pub mod tag;
pub mod task;
pub mod ticket;

// Re-exports
pub use consultation::*;
pub use dashboard::*;
pub use discount::*;
pub use form::*;
pub use insurance::*;
pub use invoice::*;
pub use order::*;
pub use patient::*;
pub use pharmacy::*;
pub use provider::*;
pub use service::*;
pub use session::*;
pub use staff_user::*;
pub use tag::*;
pub use task::*;
pub use ticket::*;
