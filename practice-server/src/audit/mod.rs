//! Audit trail: tamper-evident record of every write
//!
//! ```text
//! handler write ── AuditService::log() ── AuditStorage::append() ── audit_log
//!
//! SHA-256 chain: genesis → entry₁ → entry₂ → ... → entryₙ
//! ```
//!
//! - each entry hashes its predecessor's hash plus all of its own fields
//! - no update/delete API; SQLite triggers reject both
//! - `GET /api/audit/verify` walks the chain and reports breaks

pub mod diff;
pub mod service;
pub mod storage;
pub mod types;

pub use diff::{create_delete_details, create_diff, create_snapshot};
pub use service::AuditService;
pub use storage::{AuditStorage, AuditStorageError};
pub use types::{AuditAction, AuditChainVerification, AuditEntry, AuditFilter};
