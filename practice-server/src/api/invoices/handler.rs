//! Invoice API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::invoice;
use crate::utils::validation::validate_dto;
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{
    Invoice, InvoiceCreate, InvoiceFilter, InvoiceFromOrder, InvoiceIssue, InvoiceUpdate, Payment,
    PaymentCreate,
};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "invoice";

/// Response of `POST /api/invoices/:id/payments`
#[derive(Debug, Serialize)]
pub struct PaymentRecorded {
    pub payment: Payment,
    pub invoice: Invoice,
}

async fn require(state: &ServerState, id: i64) -> AppResult<Invoice> {
    invoice::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::InvoiceNotFound, format!("Invoice {id} not found"))
    })
}

/// GET /api/invoices?status=&patient_id=&overdue=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<InvoiceFilter>,
) -> AppResult<Json<Page<Invoice>>> {
    Ok(Json(invoice::list(&state.pool, &query, &filter).await?))
}

/// GET /api/invoices/:id - with items and payments
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(require(&state, id).await?))
}

async fn audit_created(state: &ServerState, current_user: &CurrentUser, inv: &Invoice) {
    tracing::info!(invoice_number = %inv.invoice_number, total = inv.total, "Invoice drafted");
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            inv.id,
            Some(current_user),
            create_snapshot(inv, RESOURCE),
        )
        .await;
}

/// POST /api/invoices
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<InvoiceCreate>,
) -> AppResult<Json<Invoice>> {
    validate_dto(&payload)?;
    let inv = invoice::create(&state.pool, payload, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;
    audit_created(&state, &current_user, &inv).await;
    Ok(Json(inv))
}

/// POST /api/invoices/from-order
pub async fn create_from_order(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<InvoiceFromOrder>,
) -> AppResult<Json<Invoice>> {
    validate_dto(&payload)?;
    let inv = invoice::create_from_order(&state.pool, payload, current_user.id).await?;
    audit_created(&state, &current_user, &inv).await;
    Ok(Json(inv))
}

/// PUT /api/invoices/:id - drafts only
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<InvoiceUpdate>,
) -> AppResult<Json<Invoice>> {
    validate_dto(&payload)?;
    let old = require(&state, id).await?;
    let inv = invoice::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::InvoiceNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &inv, RESOURCE),
        )
        .await;
    Ok(Json(inv))
}

/// POST /api/invoices/:id/issue
pub async fn issue(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    payload: Option<Json<InvoiceIssue>>,
) -> AppResult<Json<Invoice>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let inv = invoice::issue(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::InvoiceNotFound))?;

    tracing::info!(invoice_number = %inv.invoice_number, total = inv.total, "Invoice issued");
    state
        .audit
        .log(
            AuditAction::Issued,
            RESOURCE,
            id,
            Some(&current_user),
            json!({
                "invoice_number": inv.invoice_number,
                "issue_date": inv.issue_date,
                "due_date": inv.due_date,
                "total": inv.total,
                "status": inv.status,
            }),
        )
        .await;
    Ok(Json(inv))
}

/// POST /api/invoices/:id/payments
pub async fn record_payment(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PaymentCreate>,
) -> AppResult<Json<PaymentRecorded>> {
    validate_dto(&payload)?;
    let (payment, inv) = invoice::record_payment(&state.pool, id, payload, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::InvoiceNotFound))?;

    tracing::info!(
        invoice_number = %inv.invoice_number,
        amount = payment.amount,
        balance = inv.balance,
        "Payment recorded"
    );
    state
        .audit
        .log(
            AuditAction::PaymentRecorded,
            RESOURCE,
            id,
            Some(&current_user),
            json!({
                "payment_id": payment.id,
                "amount": payment.amount,
                "method": payment.method,
                "balance": inv.balance,
                "status": inv.status,
            }),
        )
        .await;
    Ok(Json(PaymentRecorded { payment, invoice: inv }))
}

/// POST /api/invoices/:id/void
pub async fn void(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Invoice>> {
    let old = require(&state, id).await?;
    let inv = invoice::void(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::InvoiceNotFound))?;
    state
        .audit
        .log(
            AuditAction::Voided,
            RESOURCE,
            id,
            Some(&current_user),
            json!({
                "invoice_number": inv.invoice_number,
                "from": old.status,
                "amount_paid": inv.amount_paid,
            }),
        )
        .await;
    Ok(Json(inv))
}

/// DELETE /api/invoices/:id - drafts only
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Invoice>> {
    let inv = invoice::delete(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::InvoiceNotFound))?;
    state
        .audit
        .log(
            AuditAction::Deleted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "invoice_number": inv.invoice_number, "total": inv.total }),
        )
        .await;
    Ok(Json(inv))
}
