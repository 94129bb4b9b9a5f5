//! Session Repository
//!
//! Scheduled sessions of the same provider, or of the same patient, never
//! overlap. The check and the write are one statement, so two bookings
//! racing for the same slot cannot both land.

use super::list::{Arg, Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult, patient, provider, service};
use shared::ErrorCode;
use shared::models::{
    Session, SessionCreate, SessionFilter, SessionStatus, SessionUpdate, check_session_window,
};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, patient_id, provider_id, service_id, starts_at, ends_at, status, \
                       location, notes, created_by, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "session",
    columns: COLUMNS,
    search_columns: &["location", "notes"],
    sort_columns: &[
        ("starts_at", "starts_at"),
        ("ends_at", "ends_at"),
        ("status", "status"),
        ("created_at", "created_at"),
    ],
    default_sort: "starts_at",
    default_order: SortOrder::Asc,
};

/// Scheduled session of provider ?1 or patient ?2 overlapping [?3, ?4), other than ?5
const CLASH: &str = "SELECT 1 FROM session WHERE status = 'scheduled' AND id != ?5 \
                     AND (provider_id = ?1 OR patient_id = ?2) AND starts_at < ?4 AND ends_at > ?3";

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &SessionFilter,
) -> RepoResult<Page<Session>> {
    let filters = Filters::new()
        .eq("provider_id", filter.provider_id)
        .eq("patient_id", filter.patient_id)
        .eq("status", filter.status.map(|s| s.as_str()))
        .raw_if(
            filter.from.is_some(),
            "ends_at > ?",
            filter.from.map(Arg::from).into_iter().collect(),
        )
        .raw_if(
            filter.to.is_some(),
            "starts_at < ?",
            filter.to.map(Arg::from).into_iter().collect(),
        );
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Session>> {
    let sql = format!("SELECT {COLUMNS} FROM session WHERE id = ?");
    let session = sqlx::query_as::<_, Session>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(session)
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<Session> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Session {id} not found")))
}

/// Scheduled sessions between `from` and `to` (ms), for the dashboard
pub async fn count_scheduled_between(pool: &SqlitePool, from: i64, to: i64) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM session WHERE status = 'scheduled' AND starts_at >= ? AND starts_at < ?",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Describe the first clash for the error message
async fn clash_error(
    pool: &SqlitePool,
    provider_id: i64,
    patient_id: i64,
    starts_at: i64,
    ends_at: i64,
    exclude_id: i64,
) -> RepoResult<RepoError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM session WHERE status = 'scheduled' AND id != ?5 \
         AND (provider_id = ?1 OR patient_id = ?2) AND starts_at < ?4 AND ends_at > ?3 \
         ORDER BY starts_at LIMIT 1"
    );
    let other = sqlx::query_as::<_, Session>(&sql)
        .bind(provider_id)
        .bind(patient_id)
        .bind(starts_at)
        .bind(ends_at)
        .bind(exclude_id)
        .fetch_optional(pool)
        .await?;
    let message = match other {
        Some(s) if s.provider_id == provider_id => {
            format!("Provider already has session {} in this time slot", s.id)
        }
        Some(s) => format!("Patient already has session {} in this time slot", s.id),
        None => "Session overlaps an existing session".to_string(),
    };
    Ok(RepoError::Business(ErrorCode::SessionConflict, message))
}

/// `starts_at + length`, refusing timestamps past the representable range
fn end_from(starts_at: i64, length: i64) -> RepoResult<i64> {
    starts_at.checked_add(length).ok_or_else(|| {
        RepoError::Business(ErrorCode::SessionInvalidTime, "starts_at is out of range".into())
    })
}

fn check_window(starts_at: i64, ends_at: i64) -> RepoResult<()> {
    check_session_window(starts_at, ends_at)
        .map_err(|msg| RepoError::Business(ErrorCode::SessionInvalidTime, msg))
}

async fn require_provider(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    match provider::find_by_id(pool, id).await? {
        Some(p) if p.is_active => Ok(()),
        Some(_) => Err(RepoError::Business(
            ErrorCode::ProviderNotFound,
            format!("Provider {id} is inactive"),
        )),
        None => Err(RepoError::Business(
            ErrorCode::ProviderNotFound,
            format!("Provider {id} not found"),
        )),
    }
}

/// Service duration in ms, checking the service exists
async fn service_duration(pool: &SqlitePool, id: i64) -> RepoResult<i64> {
    let svc = service::find_by_id(pool, id).await?.ok_or_else(|| {
        RepoError::Business(ErrorCode::ServiceNotFound, format!("Service {id} not found"))
    })?;
    Ok(svc.duration_minutes * 60_000)
}

pub async fn create(pool: &SqlitePool, data: SessionCreate, created_by: i64) -> RepoResult<Session> {
    patient::find_active(pool, data.patient_id).await?;
    require_provider(pool, data.provider_id).await?;
    let ends_at = match (data.ends_at, data.service_id) {
        (Some(ends_at), Some(sid)) => {
            service_duration(pool, sid).await?;
            ends_at
        }
        (Some(ends_at), None) => ends_at,
        (None, Some(sid)) => end_from(data.starts_at, service_duration(pool, sid).await?)?,
        (None, None) => {
            return Err(RepoError::Validation(
                "ends_at is required when no service is given".into(),
            ));
        }
    };
    check_window(data.starts_at, ends_at)?;

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let sql = format!(
        "INSERT INTO session (id, patient_id, provider_id, service_id, starts_at, ends_at, status, \
         location, notes, created_by, created_at, updated_at) \
         SELECT ?6, ?2, ?1, ?7, ?3, ?4, 'scheduled', ?8, ?9, ?10, ?11, ?11 \
         WHERE NOT EXISTS ({CLASH})"
    );
    let result = sqlx::query(&sql)
        .bind(data.provider_id)
        .bind(data.patient_id)
        .bind(data.starts_at)
        .bind(ends_at)
        .bind(id)
        .bind(id)
        .bind(data.service_id)
        .bind(&data.location)
        .bind(&data.notes)
        .bind(created_by)
        .bind(now)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(clash_error(pool, data.provider_id, data.patient_id, data.starts_at, ends_at, id).await?);
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create session".into()))
}

/// Edit or reschedule a scheduled session. Moving the start without an end
/// keeps the duration.
pub async fn update(pool: &SqlitePool, id: i64, data: SessionUpdate) -> RepoResult<Session> {
    let current = require(pool, id).await?;
    if current.status != SessionStatus::Scheduled {
        return Err(RepoError::Business(
            ErrorCode::SessionInvalidTransition,
            format!("Session {id} is {}; only scheduled sessions can change", current.status.as_str()),
        ));
    }
    let provider_id = data.provider_id.unwrap_or(current.provider_id);
    if data.provider_id.is_some() {
        require_provider(pool, provider_id).await?;
    }
    if let Some(sid) = data.service_id {
        service_duration(pool, sid).await?;
    }
    let starts_at = data.starts_at.unwrap_or(current.starts_at);
    let ends_at = match data.ends_at {
        Some(ends_at) => ends_at,
        None => end_from(starts_at, current.ends_at - current.starts_at)?,
    };
    check_window(starts_at, ends_at)?;

    let sql = format!(
        "UPDATE session SET provider_id = ?1, starts_at = ?3, ends_at = ?4, \
         service_id = COALESCE(?6, service_id), location = COALESCE(?7, location), \
         notes = COALESCE(?8, notes), updated_at = ?9 \
         WHERE id = ?5 AND status = 'scheduled' AND NOT EXISTS ({CLASH})"
    );
    let result = sqlx::query(&sql)
        .bind(provider_id)
        .bind(current.patient_id)
        .bind(starts_at)
        .bind(ends_at)
        .bind(id)
        .bind(data.service_id)
        .bind(&data.location)
        .bind(&data.notes)
        .bind(shared::util::now_millis())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(clash_error(pool, provider_id, current.patient_id, starts_at, ends_at, id).await?);
    }
    require(pool, id).await
}

/// scheduled -> completed | cancelled | no_show
pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    next: SessionStatus,
) -> RepoResult<(SessionStatus, Session)> {
    let current = require(pool, id).await?;
    if !current.status.can_transition_to(next) {
        return Err(RepoError::Business(
            ErrorCode::SessionInvalidTransition,
            format!(
                "Session {id} cannot move from {} to {}",
                current.status.as_str(),
                next.as_str()
            ),
        ));
    }
    let result = sqlx::query("UPDATE session SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(next)
        .bind(shared::util::now_millis())
        .bind(id)
        .bind(current.status)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!("Session {id} changed concurrently")));
    }
    Ok((current.status, require(pool, id).await?))
}

/// Consultations written for the session keep existing; their link is nulled
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<Session> {
    let current = require(pool, id).await?;
    sqlx::query("DELETE FROM session WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(current)
}
