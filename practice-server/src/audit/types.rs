//! Audit trail types
//!
//! Entries are immutable. Each one carries the SHA-256 hash of its
//! predecessor, so any edit or removal breaks the chain.

use serde::{Deserialize, Serialize};

/// Audited action (closed set, never free text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    // ═══ System ═══
    SystemStartup,

    // ═══ Authentication ═══
    LoginSuccess,
    LoginFailed,
    PasswordChanged,

    // ═══ Records ═══
    Created,
    Updated,
    Deleted,
    /// Soft delete (patients, staff)
    Archived,
    StatusChanged,
    TagsChanged,

    // ═══ Billing ═══
    Issued,
    PaymentRecorded,
    Voided,

    // ═══ Clinical ═══
    Signed,

    // ═══ Messaging ═══
    MessagePosted,

    // ═══ Forms ═══
    FieldsChanged,
    Submitted,
}

impl AuditAction {
    /// Stable wire / storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemStartup => "system_startup",
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::PasswordChanged => "password_changed",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Archived => "archived",
            Self::StatusChanged => "status_changed",
            Self::TagsChanged => "tags_changed",
            Self::Issued => "issued",
            Self::PaymentRecorded => "payment_recorded",
            Self::Voided => "voided",
            Self::Signed => "signed",
            Self::MessagePosted => "message_posted",
            Self::FieldsChanged => "fields_changed",
            Self::Submitted => "submitted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit log entry
///
/// - `prev_hash`: hash of the previous entry (`genesis` for the first)
/// - `curr_hash`: hash over `prev_hash` and every stored field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number, starting at 1
    pub id: i64,
    /// Unix millis
    pub timestamp: i64,
    pub action: AuditAction,
    /// e.g. "patient", "invoice", "system"
    pub resource_type: String,
    pub resource_id: String,
    /// `None` for system events
    pub operator_id: Option<i64>,
    pub operator_name: Option<String>,
    pub details: serde_json::Value,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// Audit list filters (`GET /api/audit`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Unix millis, inclusive
    pub from: Option<i64>,
    /// Unix millis, inclusive
    pub to: Option<i64>,
    pub action: Option<AuditAction>,
    pub operator_id: Option<i64>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

/// Result of walking the hash chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainVerification {
    pub total_entries: i64,
    pub chain_intact: bool,
    /// First entry whose link or hash does not check out
    pub first_broken_id: Option<i64>,
    pub breaks: Vec<AuditChainBreak>,
}

/// Why a chain link failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// `prev_hash` differs from the previous entry's `curr_hash`
    PrevHashMismatch,
    /// Stored `curr_hash` differs from the recomputed hash
    HashMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainBreak {
    pub entry_id: i64,
    pub reason: BreakReason,
    pub expected: String,
    pub actual: String,
}
