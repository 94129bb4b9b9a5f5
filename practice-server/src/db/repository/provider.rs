//! Provider Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::ErrorCode;
use shared::models::{Provider, ProviderCreate, ProviderUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, first_name, last_name, credentials, specialty, npi, email, phone, \
                       is_active, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "provider",
    columns: COLUMNS,
    search_columns: &["first_name", "last_name", "specialty", "npi"],
    sort_columns: &[
        ("last_name", "last_name COLLATE NOCASE"),
        ("first_name", "first_name COLLATE NOCASE"),
        ("specialty", "specialty"),
        ("created_at", "created_at"),
    ],
    default_sort: "last_name",
    default_order: SortOrder::Asc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<Provider>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Provider>> {
    let sql = format!("SELECT {COLUMNS} FROM provider WHERE id = ?");
    let provider = sqlx::query_as::<_, Provider>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(provider)
}

pub async fn create(pool: &SqlitePool, data: ProviderCreate) -> RepoResult<Provider> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO provider (id, first_name, last_name, credentials, specialty, npi, email, phone, \
         is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
    )
    .bind(id)
    .bind(data.first_name.trim())
    .bind(data.last_name.trim())
    .bind(&data.credentials)
    .bind(&data.specialty)
    .bind(&data.npi)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create provider".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: ProviderUpdate) -> RepoResult<Provider> {
    let rows = sqlx::query(
        "UPDATE provider SET first_name = COALESCE(?1, first_name), last_name = COALESCE(?2, last_name), \
         credentials = COALESCE(?3, credentials), specialty = COALESCE(?4, specialty), \
         npi = COALESCE(?5, npi), email = COALESCE(?6, email), phone = COALESCE(?7, phone), \
         is_active = COALESCE(?8, is_active), updated_at = ?9 WHERE id = ?10",
    )
    .bind(data.first_name.as_deref().map(str::trim))
    .bind(data.last_name.as_deref().map(str::trim))
    .bind(&data.credentials)
    .bind(&data.specialty)
    .bind(&data.npi)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(data.is_active)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Provider {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Provider {id} not found")))
}

/// Sessions, orders and consultations pointing at the provider
pub async fn reference_count(pool: &SqlitePool, id: i64) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT (SELECT COUNT(*) FROM session WHERE provider_id = ?1) \
              + (SELECT COUNT(*) FROM orders WHERE provider_id = ?1) \
              + (SELECT COUNT(*) FROM consultation WHERE provider_id = ?1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Delete a provider nothing refers to; referenced providers must be deactivated
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    if reference_count(pool, id).await? > 0 {
        return Err(RepoError::Business(
            ErrorCode::ProviderInUse,
            "Provider has sessions, orders or consultations; deactivate instead".into(),
        ));
    }
    let result = sqlx::query("DELETE FROM provider WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
