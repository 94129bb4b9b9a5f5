//! Audit Log API Handlers

use axum::{
    Json,
    extract::{Query, State},
};

use crate::audit::{AuditChainVerification, AuditEntry, AuditFilter};
use crate::core::ServerState;
use crate::utils::AppResult;
use shared::query::{ListQuery, Page};

/// GET /api/audit - newest first
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<AuditFilter>,
) -> AppResult<Json<Page<AuditEntry>>> {
    let page = state.audit.query(&filter, &query).await?;
    Ok(Json(page))
}

/// GET /api/audit/verify - walk the whole hash chain
pub async fn verify_chain(
    State(state): State<ServerState>,
) -> AppResult<Json<AuditChainVerification>> {
    let verification = state.audit.verify_chain().await?;
    if !verification.chain_intact {
        tracing::error!(
            first_broken_id = ?verification.first_broken_id,
            breaks = verification.breaks.len(),
            "Audit chain verification failed"
        );
    }
    Ok(Json(verification))
}
