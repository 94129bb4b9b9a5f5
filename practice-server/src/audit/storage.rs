//! Audit log storage (SQLite)
//!
//! Append-only: there is no update or delete path here, and triggers on
//! `audit_log` reject both at the database level.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;

use super::types::{
    AuditAction, AuditChainBreak, AuditChainVerification, AuditEntry, AuditFilter, BreakReason,
};
use crate::db::repository::list::{Arg, Filters, ListSpec, fetch_page};
use crate::db::repository::RepoError;
use shared::query::{ListQuery, Page, SortOrder};

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "genesis";

#[derive(Debug, Error)]
pub enum AuditStorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AuditStorageError {
    fn from(err: sqlx::Error) -> Self {
        AuditStorageError::Database(err.to_string())
    }
}

impl From<RepoError> for AuditStorageError {
    fn from(err: RepoError) -> Self {
        AuditStorageError::Database(err.to_string())
    }
}

pub type AuditStorageResult<T> = Result<T, AuditStorageError>;

impl From<AuditStorageError> for shared::error::AppError {
    fn from(err: AuditStorageError) -> Self {
        tracing::error!(error = %err, "Audit storage error");
        shared::error::AppError::internal("Audit log operation failed")
    }
}

/// Row as stored; `details` is the exact JSON text that was hashed
#[derive(Debug, Clone, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    timestamp: i64,
    action: AuditAction,
    resource_type: String,
    resource_id: String,
    operator_id: Option<i64>,
    operator_name: Option<String>,
    details: String,
    prev_hash: String,
    curr_hash: String,
}

impl AuditRow {
    fn recompute_hash(&self) -> String {
        compute_audit_hash(
            &self.prev_hash,
            self.id,
            self.timestamp,
            self.action,
            &self.resource_type,
            &self.resource_id,
            self.operator_id,
            self.operator_name.as_deref(),
            &self.details,
        )
    }
}

impl From<AuditRow> for AuditEntry {
    fn from(r: AuditRow) -> Self {
        let details = serde_json::from_str::<serde_json::Value>(&r.details)
            .unwrap_or(serde_json::Value::String(r.details));
        AuditEntry {
            id: r.id,
            timestamp: r.timestamp,
            action: r.action,
            resource_type: r.resource_type,
            resource_id: r.resource_id,
            operator_id: r.operator_id,
            operator_name: r.operator_name,
            details,
            prev_hash: r.prev_hash,
            curr_hash: r.curr_hash,
        }
    }
}

const LIST: ListSpec = ListSpec {
    table: "audit_log",
    columns: "*",
    search_columns: &["resource_id", "operator_name"],
    sort_columns: &[("id", "id"), ("timestamp", "timestamp")],
    default_sort: "id",
    default_order: SortOrder::Desc,
};

/// Audit log store
///
/// Appends are serialized so the read-last / insert pair never races.
#[derive(Clone)]
pub struct AuditStorage {
    pool: SqlitePool,
    append_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for AuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStorage").finish_non_exhaustive()
    }
}

impl AuditStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Append one entry, chaining it to the current tail
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        action: AuditAction,
        resource_type: String,
        resource_id: String,
        operator_id: Option<i64>,
        operator_name: Option<String>,
        details: serde_json::Value,
    ) -> AuditStorageResult<AuditEntry> {
        let _guard = self.append_lock.lock().await;

        let last: Option<(i64, String)> =
            sqlx::query_as("SELECT id, curr_hash FROM audit_log ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        let (id, prev_hash) = match last {
            Some((id, hash)) => (id + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let timestamp = shared::util::now_millis();
        let details_json = serde_json::to_string(&details)?;
        let curr_hash = compute_audit_hash(
            &prev_hash,
            id,
            timestamp,
            action,
            &resource_type,
            &resource_id,
            operator_id,
            operator_name.as_deref(),
            &details_json,
        );

        sqlx::query(
            "INSERT INTO audit_log (id, timestamp, action, resource_type, resource_id, operator_id, \
             operator_name, details, prev_hash, curr_hash) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(timestamp)
        .bind(action)
        .bind(&resource_type)
        .bind(&resource_id)
        .bind(operator_id)
        .bind(operator_name.as_deref())
        .bind(&details_json)
        .bind(&prev_hash)
        .bind(&curr_hash)
        .execute(&self.pool)
        .await?;

        Ok(AuditEntry {
            id,
            timestamp,
            action,
            resource_type,
            resource_id,
            operator_id,
            operator_name,
            details,
            prev_hash,
            curr_hash,
        })
    }

    /// Filtered, paginated listing (newest first by default)
    pub async fn query(
        &self,
        filter: &AuditFilter,
        query: &ListQuery,
    ) -> AuditStorageResult<Page<AuditEntry>> {
        let filters = Filters::new()
            .raw_if(
                filter.from.is_some(),
                "timestamp >= ?",
                filter.from.map(Arg::from).into_iter().collect(),
            )
            .raw_if(
                filter.to.is_some(),
                "timestamp <= ?",
                filter.to.map(Arg::from).into_iter().collect(),
            )
            .eq("action", filter.action.map(|a| a.as_str()))
            .eq("operator_id", filter.operator_id)
            .eq("resource_type", filter.resource_type.as_deref())
            .eq("resource_id", filter.resource_id.as_deref());

        let page: Page<AuditRow> = fetch_page(&self.pool, &LIST, &filters, query).await?;
        Ok(page.map(AuditEntry::from))
    }

    /// Walk the whole chain in id order
    pub async fn verify_chain(&self) -> AuditStorageResult<AuditChainVerification> {
        let rows = sqlx::query_as::<_, AuditRow>("SELECT * FROM audit_log ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut breaks = Vec::new();
        let mut expected_prev = GENESIS_HASH.to_string();
        for row in &rows {
            if row.prev_hash != expected_prev {
                breaks.push(AuditChainBreak {
                    entry_id: row.id,
                    reason: BreakReason::PrevHashMismatch,
                    expected: expected_prev.clone(),
                    actual: row.prev_hash.clone(),
                });
            }
            let recomputed = row.recompute_hash();
            if recomputed != row.curr_hash {
                breaks.push(AuditChainBreak {
                    entry_id: row.id,
                    reason: BreakReason::HashMismatch,
                    expected: recomputed,
                    actual: row.curr_hash.clone(),
                });
            }
            expected_prev = row.curr_hash.clone();
        }

        Ok(AuditChainVerification {
            total_entries: rows.len() as i64,
            chain_intact: breaks.is_empty(),
            first_broken_id: breaks.first().map(|b| b.entry_id),
            breaks,
        })
    }
}

/// SHA-256 over every stored field
///
/// - variable-length fields end with `\x00`
/// - integers are little-endian, fixed width
/// - optional fields are tagged `\x00` (none) or `\x01` + bytes (some)
#[allow(clippy::too_many_arguments)]
fn compute_audit_hash(
    prev_hash: &str,
    id: i64,
    timestamp: i64,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    operator_id: Option<i64>,
    operator_name: Option<&str>,
    details_json: &str,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(prev_hash.as_bytes());
    hasher.update(b"\x00");

    hasher.update(id.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());

    hasher.update(action.as_str().as_bytes());
    hasher.update(b"\x00");

    hasher.update(resource_type.as_bytes());
    hasher.update(b"\x00");
    hasher.update(resource_id.as_bytes());
    hasher.update(b"\x00");

    hash_optional(&mut hasher, operator_id.map(|id| id.to_string()).as_deref());
    hash_optional(&mut hasher, operator_name);

    hasher.update(details_json.as_bytes());
    hasher.update(b"\x00");

    hex::encode(hasher.finalize())
}

fn hash_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update(b"\x01");
            hasher.update(v.as_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    hasher.update(b"\x00");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use serde_json::json;

    async fn storage() -> AuditStorage {
        AuditStorage::new(test_support::pool().await)
    }

    async fn append(storage: &AuditStorage, action: AuditAction, resource_id: &str) -> AuditEntry {
        storage
            .append(
                action,
                "patient".into(),
                resource_id.into(),
                Some(7),
                Some("Front Desk".into()),
                json!({"name": "Ada Lovelace", "balance": 12.5}),
            )
            .await
            .unwrap()
    }

    #[test]
    fn hash_distinguishes_none_from_empty() {
        let a = compute_audit_hash("genesis", 1, 0, AuditAction::Created, "t", "1", None, None, "{}");
        let b = compute_audit_hash("genesis", 1, 0, AuditAction::Created, "t", "1", None, Some(""), "{}");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_separates_adjacent_fields() {
        let a = compute_audit_hash("g", 1, 0, AuditAction::Created, "ab", "cd", None, None, "{}");
        let b = compute_audit_hash("g", 1, 0, AuditAction::Created, "abc", "d", None, None, "{}");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn entries_chain_from_genesis() {
        let storage = storage().await;
        let first = append(&storage, AuditAction::Created, "1").await;
        let second = append(&storage, AuditAction::Updated, "1").await;

        assert_eq!(first.id, 1);
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.id, 2);
        assert_eq!(second.prev_hash, first.curr_hash);

        let report = storage.verify_chain().await.unwrap();
        assert!(report.chain_intact);
        assert_eq!(report.total_entries, 2);
        assert!(report.first_broken_id.is_none());
    }

    #[tokio::test]
    async fn empty_chain_is_intact() {
        let report = storage().await.verify_chain().await.unwrap();
        assert!(report.chain_intact);
        assert_eq!(report.total_entries, 0);
    }

    #[tokio::test]
    async fn updates_are_rejected_by_the_database() {
        let storage = storage().await;
        append(&storage, AuditAction::Created, "1").await;
        let result = sqlx::query("UPDATE audit_log SET resource_id = 'x'")
            .execute(&storage.pool)
            .await;
        assert!(result.is_err());
        let result = sqlx::query("DELETE FROM audit_log").execute(&storage.pool).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let storage = storage().await;
        append(&storage, AuditAction::Created, "1").await;
        append(&storage, AuditAction::Updated, "1").await;
        append(&storage, AuditAction::Deleted, "1").await;

        sqlx::query("DROP TRIGGER audit_log_no_update")
            .execute(&storage.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE audit_log SET details = '{\"name\":\"Mallory\"}' WHERE id = 2")
            .execute(&storage.pool)
            .await
            .unwrap();

        let report = storage.verify_chain().await.unwrap();
        assert!(!report.chain_intact);
        assert_eq!(report.first_broken_id, Some(2));
        assert_eq!(report.breaks.len(), 1);
        assert_eq!(report.breaks[0].reason, BreakReason::HashMismatch);
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let storage = storage().await;
        append(&storage, AuditAction::Created, "1").await;
        append(&storage, AuditAction::Created, "2").await;
        append(&storage, AuditAction::Deleted, "1").await;

        let page = storage
            .query(&AuditFilter::default(), &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].id, 3);
        assert_eq!(page.items[0].details["balance"], 12.5);

        let filter = AuditFilter {
            resource_id: Some("1".into()),
            action: Some(AuditAction::Created),
            ..Default::default()
        };
        let page = storage.query(&filter, &ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].resource_id, "1");
    }
}
