//! Task Repository

use super::list::{Arg, Filters, ListSpec, delete_ids, fetch_page};
use super::{RepoError, RepoResult, patient, staff_user};
use shared::ErrorCode;
use shared::models::{Task, TaskCreate, TaskFilter, TaskStatus, TaskUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use shared::util::{format_date, parse_date, today};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, title, description, status, priority, due_date, assignee_id, patient_id, \
                       created_by, completed_at, created_at, updated_at";

const OVERDUE: &str = "status != 'done' AND due_date IS NOT NULL AND due_date < ?";

const LIST: ListSpec = ListSpec {
    table: "task",
    columns: COLUMNS,
    search_columns: &["title", "description"],
    sort_columns: &[
        ("created_at", "created_at"),
        ("due_date", "due_date"),
        ("title", "title COLLATE NOCASE"),
        ("status", "status"),
        (
            "priority",
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 ELSE 3 END",
        ),
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
};

/// `caller_id` resolves the `mine` filter
pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &TaskFilter,
    caller_id: i64,
) -> RepoResult<Page<Task>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("assignee_id", filter.assignee_id)
        .eq("patient_id", filter.patient_id)
        .raw_if(
            filter.mine == Some(true),
            "assignee_id = ?",
            vec![Arg::from(caller_id)],
        )
        .raw_if(
            filter.overdue == Some(true),
            OVERDUE,
            vec![Arg::from(format_date(today()))],
        );
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Task>> {
    let sql = format!("SELECT {COLUMNS} FROM task WHERE id = ?");
    let task = sqlx::query_as::<_, Task>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(task)
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<Task> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Task {id} not found")))
}

/// `(open, overdue)` counts for the dashboard
pub async fn open_counts(pool: &SqlitePool) -> RepoResult<(i64, i64)> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {OVERDUE} THEN 1 ELSE 0 END), 0) \
         FROM task WHERE status != 'done'"
    );
    let counts: (i64, i64) = sqlx::query_as(&sql)
        .bind(format_date(today()))
        .fetch_one(pool)
        .await?;
    Ok(counts)
}

async fn check_links(
    pool: &SqlitePool,
    due_date: Option<&str>,
    assignee_id: Option<i64>,
    patient_id: Option<i64>,
) -> RepoResult<()> {
    if let Some(due) = due_date
        && parse_date(due).is_none()
    {
        return Err(RepoError::Validation(format!("due_date is not a date: {due}")));
    }
    if let Some(uid) = assignee_id
        && staff_user::find_by_id(pool, uid).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::UserNotFound,
            format!("User {uid} not found"),
        ));
    }
    if let Some(pid) = patient_id
        && patient::find_by_id(pool, pid).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::PatientNotFound,
            format!("Patient {pid} not found"),
        ));
    }
    Ok(())
}

pub async fn create(pool: &SqlitePool, data: TaskCreate, created_by: i64) -> RepoResult<Task> {
    check_links(pool, data.due_date.as_deref(), data.assignee_id, data.patient_id).await?;
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO task (id, title, description, status, priority, due_date, assignee_id, \
         patient_id, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 'todo', ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
    )
    .bind(id)
    .bind(data.title.trim())
    .bind(&data.description)
    .bind(data.priority.unwrap_or_default())
    .bind(&data.due_date)
    .bind(data.assignee_id)
    .bind(data.patient_id)
    .bind(created_by)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create task".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: TaskUpdate) -> RepoResult<Task> {
    let current = require(pool, id).await?;
    check_links(pool, data.due_date.as_deref(), data.assignee_id, data.patient_id).await?;
    let now = shared::util::now_millis();
    let status = data.status.unwrap_or(current.status);
    sqlx::query(
        "UPDATE task SET title = COALESCE(?1, title), description = COALESCE(?2, description), \
         status = ?3, priority = COALESCE(?4, priority), due_date = COALESCE(?5, due_date), \
         assignee_id = COALESCE(?6, assignee_id), patient_id = COALESCE(?7, patient_id), \
         completed_at = ?8, updated_at = ?9 WHERE id = ?10",
    )
    .bind(data.title.as_deref().map(str::trim))
    .bind(&data.description)
    .bind(status)
    .bind(data.priority)
    .bind(&data.due_date)
    .bind(data.assignee_id)
    .bind(data.patient_id)
    .bind(current.completed_at_after(status, now))
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    require(pool, id).await
}

/// Entering `done` stamps `completed_at`; leaving it clears the stamp
pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    next: TaskStatus,
) -> RepoResult<(TaskStatus, Task)> {
    let current = require(pool, id).await?;
    let now = shared::util::now_millis();
    sqlx::query("UPDATE task SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(current.completed_at_after(next, now))
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok((current.status, require(pool, id).await?))
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM task WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_many(pool: &SqlitePool, ids: &[i64]) -> RepoResult<u64> {
    delete_ids(pool, "task", ids).await
}
