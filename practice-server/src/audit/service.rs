//! Audit service
//!
//! Handlers call [`AuditService::log`] after a successful write. Logging
//! failures are reported through tracing and never fail the request.

use super::storage::{AuditStorage, AuditStorageResult};
use super::types::*;
use crate::auth::CurrentUser;
use shared::query::{ListQuery, Page};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct AuditService {
    storage: AuditStorage,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            storage: AuditStorage::new(pool),
        }
    }

    /// Record an action performed by an authenticated user
    pub async fn log(
        &self,
        action: AuditAction,
        resource_type: &str,
        resource_id: impl ToString,
        operator: Option<&CurrentUser>,
        details: serde_json::Value,
    ) {
        self.log_as(
            action,
            resource_type,
            resource_id,
            operator.map(|u| u.id),
            operator.map(|u| u.display_name.as_str()),
            details,
        )
        .await;
    }

    /// Record an action with an explicit operator (login attempts, system events)
    pub async fn log_as(
        &self,
        action: AuditAction,
        resource_type: &str,
        resource_id: impl ToString,
        operator_id: Option<i64>,
        operator_name: Option<&str>,
        details: serde_json::Value,
    ) {
        let resource_id = resource_id.to_string();
        match self
            .storage
            .append(
                action,
                resource_type.to_string(),
                resource_id.clone(),
                operator_id,
                operator_name.map(str::to_string),
                details,
            )
            .await
        {
            Ok(entry) => {
                tracing::debug!(
                    id = entry.id,
                    action = %action,
                    resource_type,
                    resource_id = %resource_id,
                    "Audit entry written"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    action = %action,
                    resource_type,
                    resource_id = %resource_id,
                    "Failed to write audit entry"
                );
            }
        }
    }

    pub async fn query(
        &self,
        filter: &AuditFilter,
        query: &ListQuery,
    ) -> AuditStorageResult<Page<AuditEntry>> {
        self.storage.query(filter, query).await
    }

    pub async fn verify_chain(&self) -> AuditStorageResult<AuditChainVerification> {
        self.storage.verify_chain().await
    }
}
