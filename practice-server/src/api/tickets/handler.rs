//! Ticket API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditAction, create_diff};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::ticket::{self, Author};
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{
    MessageCreate, Ticket, TicketCreate, TicketDetail, TicketFilter, TicketMessage, TicketUpdate,
};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "ticket";

/// Response of `POST /api/tickets/:id/messages`
#[derive(Debug, Serialize)]
pub struct MessagePosted {
    pub message: TicketMessage,
    pub ticket: Ticket,
}

fn author(user: &CurrentUser) -> Author<'_> {
    Author {
        id: user.id,
        name: &user.display_name,
    }
}

/// GET /api/tickets?status=&assignee_id=&patient_id=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<TicketFilter>,
) -> AppResult<Json<Page<Ticket>>> {
    Ok(Json(ticket::list(&state.pool, &query, &filter).await?))
}

/// GET /api/tickets/:id - with the message thread
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<TicketDetail>> {
    let detail = ticket::find_detail(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::TicketNotFound, format!("Ticket {id} not found")))?;
    Ok(Json(detail))
}

/// POST /api/tickets - opens the ticket with its first message
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<TicketCreate>,
) -> AppResult<Json<TicketDetail>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.subject, "subject")?;
    validate_required_text(&payload.body, "body")?;
    let detail = ticket::create(&state.pool, payload, author(&current_user)).await?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            detail.ticket.id,
            Some(&current_user),
            json!({
                "subject": detail.ticket.subject,
                "patient_id": detail.ticket.patient_id,
                "assignee_id": detail.ticket.assignee_id,
            }),
        )
        .await;
    Ok(Json(detail))
}

/// PUT /api/tickets/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TicketUpdate>,
) -> AppResult<Json<Ticket>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.subject, "subject")?;
    let old = ticket::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::TicketNotFound, format!("Ticket {id} not found")))?;
    let t = ticket::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::TicketNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &t, RESOURCE),
        )
        .await;
    Ok(Json(t))
}

/// POST /api/tickets/:id/messages
pub async fn post_message(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<MessageCreate>,
) -> AppResult<Json<MessagePosted>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.body, "body")?;
    let (message, t) = ticket::post_message(&state.pool, id, payload, author(&current_user))
        .await
        .map_err(|e| e.or_code(ErrorCode::TicketNotFound))?;
    state
        .audit
        .log(
            AuditAction::MessagePosted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "message_id": message.id, "is_internal": message.is_internal, "status": t.status }),
        )
        .await;
    Ok(Json(MessagePosted { message, ticket: t }))
}

/// DELETE /api/tickets/:id - removes the thread too
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = ticket::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::TicketNotFound, format!("Ticket {id} not found")))?;
    let deleted = ticket::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                json!({ "subject": old.subject, "message_count": old.message_count }),
            )
            .await;
    }
    Ok(Json(deleted))
}
