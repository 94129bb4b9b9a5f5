//! Form Builder API Handlers
//!
//! Field edits bump the template version. A submission is checked against
//! the current fields and stores the version it answered.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::{RepoError, form, patient};
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{
    FormDuplicate, FormField, FormFieldCreate, FormFieldUpdate, FormSubmission, FormTemplate,
    FormTemplateCreate, FormTemplateUpdate, MoveField, SubmissionCreate, SubmissionFilter,
    validate_answers,
};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "form_template";
const SUBMISSION_RESOURCE: &str = "form_submission";

/// Response of field edits: the field plus the re-versioned template
#[derive(Debug, Serialize)]
pub struct FieldChange {
    pub field: FormField,
    pub template: FormTemplate,
}

async fn require(state: &ServerState, id: i64) -> AppResult<FormTemplate> {
    form::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::FormTemplateNotFound, format!("Form template {id} not found"))
    })
}

fn name_taken(err: RepoError, name: &str) -> AppError {
    err.on_duplicate(ErrorCode::AlreadyExists, format!("A form named '{name}' already exists"))
}

async fn audit_fields(
    state: &ServerState,
    current_user: &CurrentUser,
    template: &FormTemplate,
    details: Value,
) {
    state
        .audit
        .log(
            AuditAction::FieldsChanged,
            RESOURCE,
            template.id,
            Some(current_user),
            details,
        )
        .await;
}

// ========== Templates ==========

/// GET /api/forms
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<FormTemplate>>> {
    Ok(Json(form::list(&state.pool, &query).await?))
}

/// GET /api/forms/:id - with ordered fields
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FormTemplate>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/forms
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<FormTemplateCreate>,
) -> AppResult<Json<FormTemplate>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.name, "name")?;
    let name = payload.name.trim().to_string();
    let template = form::create(&state.pool, payload, current_user.id)
        .await
        .map_err(|e| name_taken(e, &name))?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            template.id,
            Some(&current_user),
            create_snapshot(&template, RESOURCE),
        )
        .await;
    Ok(Json(template))
}

/// PUT /api/forms/:id - name, description and active flag
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<FormTemplateUpdate>,
) -> AppResult<Json<FormTemplate>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.name, "name")?;
    let old = require(&state, id).await?;
    let name = payload.name.clone().unwrap_or_default();
    let template = form::update(&state.pool, id, payload).await.map_err(|e| match e {
        RepoError::Duplicate(_) => name_taken(e, name.trim()),
        other => other.or_code(ErrorCode::FormTemplateNotFound),
    })?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &template, RESOURCE),
        )
        .await;
    Ok(Json(template))
}

/// DELETE /api/forms/:id - refused once the form has submissions
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<FormTemplate>> {
    let template = form::delete(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::FormTemplateNotFound))?;
    state
        .audit
        .log(
            AuditAction::Deleted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "name": template.name, "fields": template.fields.len() }),
        )
        .await;
    Ok(Json(template))
}

/// POST /api/forms/:id/duplicate
pub async fn duplicate(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    payload: Option<Json<FormDuplicate>>,
) -> AppResult<Json<FormTemplate>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    validate_dto(&payload)?;
    let copy = form::duplicate(&state.pool, id, payload, current_user.id)
        .await
        .map_err(|e| match e {
            RepoError::Duplicate(_) => AppError::with_message(
                ErrorCode::AlreadyExists,
                "A form with the copy's name already exists",
            ),
            other => other.or_code(ErrorCode::FormTemplateNotFound),
        })?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            copy.id,
            Some(&current_user),
            json!({ "name": copy.name, "duplicated_from": id }),
        )
        .await;
    Ok(Json(copy))
}

// ========== Fields ==========

/// POST /api/forms/:id/fields
pub async fn add_field(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<FormFieldCreate>,
) -> AppResult<Json<FieldChange>> {
    validate_dto(&payload)?;
    let (field, template) = form::add_field(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::FormTemplateNotFound))?;
    audit_fields(
        &state,
        &current_user,
        &template,
        json!({ "added": field.key, "position": field.position, "version": template.version }),
    )
    .await;
    Ok(Json(FieldChange { field, template }))
}

/// PUT /api/forms/:id/fields/:field_id
pub async fn update_field(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((id, field_id)): Path<(i64, i64)>,
    Json(payload): Json<FormFieldUpdate>,
) -> AppResult<Json<FieldChange>> {
    validate_dto(&payload)?;
    let old = require(&state, id).await?;
    let (field, template) = form::update_field(&state.pool, id, field_id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::FormTemplateNotFound))?;
    let before = old.fields.iter().find(|f| f.id == field_id);
    let mut details = match before {
        Some(before) => create_diff(before, &field, "form_field"),
        None => json!({}),
    };
    if let Some(obj) = details.as_object_mut() {
        obj.insert("field".into(), json!(field.key));
        obj.insert("version".into(), json!(template.version));
    }
    audit_fields(&state, &current_user, &template, details).await;
    Ok(Json(FieldChange { field, template }))
}

/// DELETE /api/forms/:id/fields/:field_id
pub async fn remove_field(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((id, field_id)): Path<(i64, i64)>,
) -> AppResult<Json<FieldChange>> {
    let (field, template) = form::remove_field(&state.pool, id, field_id)
        .await
        .map_err(|e| e.or_code(ErrorCode::FormTemplateNotFound))?;
    audit_fields(
        &state,
        &current_user,
        &template,
        json!({ "removed": field.key, "version": template.version }),
    )
    .await;
    Ok(Json(FieldChange { field, template }))
}

/// POST /api/forms/:id/fields/move
pub async fn move_field(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<MoveField>,
) -> AppResult<Json<FormTemplate>> {
    let (from, to) = (payload.from, payload.to);
    let template = form::move_field(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::FormTemplateNotFound))?;
    audit_fields(
        &state,
        &current_user,
        &template,
        json!({ "moved": { "from": from, "to": to }, "version": template.version }),
    )
    .await;
    Ok(Json(template))
}

// ========== Submissions ==========

/// POST /api/forms/:id/submissions
///
/// Every offending field is reported in `details`, keyed by field key.
pub async fn submit(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmissionCreate>,
) -> AppResult<Json<FormSubmission>> {
    let template = require(&state, id).await?;
    if !template.is_active {
        return Err(AppError::with_message(
            ErrorCode::FormTemplateInactive,
            format!("Form '{}' is inactive", template.name),
        ));
    }
    if let Some(pid) = payload.patient_id {
        patient::find_active(&state.pool, pid)
            .await
            .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;
    }
    if let Err(errors) = validate_answers(&template.fields, &payload.answers) {
        let mut err = AppError::with_message(
            ErrorCode::FormSubmissionInvalid,
            format!("{} field(s) failed validation", errors.len()),
        );
        for (key, message) in errors {
            err = err.with_detail(key, message);
        }
        return Err(err);
    }

    let submission = form::insert_submission(&state.pool, &template, payload, current_user.id).await?;
    tracing::info!(
        template_id = id,
        version = submission.template_version,
        patient_id = ?submission.patient_id,
        "Form submitted"
    );
    state
        .audit
        .log(
            AuditAction::Submitted,
            SUBMISSION_RESOURCE,
            submission.id,
            Some(&current_user),
            json!({
                "template_id": id,
                "template_version": submission.template_version,
                "patient_id": submission.patient_id,
            }),
        )
        .await;
    Ok(Json(submission))
}

/// GET /api/forms/:id/submissions?patient_id=
pub async fn template_submissions(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<SubmissionFilter>,
) -> AppResult<Json<Page<FormSubmission>>> {
    require(&state, id).await?;
    let filter = SubmissionFilter {
        template_id: Some(id),
        ..filter
    };
    Ok(Json(form::list_submissions(&state.pool, &query, &filter).await?))
}

/// GET /api/form-submissions?template_id=&patient_id=
pub async fn list_submissions(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<SubmissionFilter>,
) -> AppResult<Json<Page<FormSubmission>>> {
    Ok(Json(form::list_submissions(&state.pool, &query, &filter).await?))
}

/// GET /api/form-submissions/:id
pub async fn get_submission(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FormSubmission>> {
    let submission = form::find_submission(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::FormSubmissionNotFound, format!("Submission {id} not found"))
    })?;
    Ok(Json(submission))
}
