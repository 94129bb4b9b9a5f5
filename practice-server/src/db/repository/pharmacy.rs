//! Pharmacy Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::ErrorCode;
use shared::models::{Pharmacy, PharmacyCreate, PharmacyUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const COLUMNS: &str = "id, name, address, city, state, postal_code, phone, fax, email, is_active, \
                       created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "pharmacy",
    columns: COLUMNS,
    search_columns: &["name", "city", "phone"],
    sort_columns: &[
        ("name", "name COLLATE NOCASE"),
        ("city", "city COLLATE NOCASE"),
        ("created_at", "created_at"),
    ],
    default_sort: "name",
    default_order: SortOrder::Asc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<Pharmacy>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Pharmacy>> {
    let sql = format!("SELECT {COLUMNS} FROM pharmacy WHERE id = ?");
    let pharmacy = sqlx::query_as::<_, Pharmacy>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(pharmacy)
}

pub async fn create(pool: &SqlitePool, data: PharmacyCreate) -> RepoResult<Pharmacy> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO pharmacy (id, name, address, city, state, postal_code, phone, fax, email, \
         is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
    )
    .bind(id)
    .bind(data.name.trim())
    .bind(&data.address)
    .bind(&data.city)
    .bind(&data.state)
    .bind(&data.postal_code)
    .bind(&data.phone)
    .bind(&data.fax)
    .bind(&data.email)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create pharmacy".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: PharmacyUpdate) -> RepoResult<Pharmacy> {
    let rows = sqlx::query(
        "UPDATE pharmacy SET name = COALESCE(?1, name), address = COALESCE(?2, address), \
         city = COALESCE(?3, city), state = COALESCE(?4, state), postal_code = COALESCE(?5, postal_code), \
         phone = COALESCE(?6, phone), fax = COALESCE(?7, fax), email = COALESCE(?8, email), \
         is_active = COALESCE(?9, is_active), updated_at = ?10 WHERE id = ?11",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(&data.address)
    .bind(&data.city)
    .bind(&data.state)
    .bind(&data.postal_code)
    .bind(&data.phone)
    .bind(&data.fax)
    .bind(&data.email)
    .bind(data.is_active)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Pharmacy {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Pharmacy {id} not found")))
}

async fn is_referenced(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE pharmacy_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(n > 0)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    if is_referenced(pool, id).await? {
        return Err(RepoError::Business(
            ErrorCode::PharmacyInUse,
            "Pharmacy is referenced by orders; deactivate instead".into(),
        ));
    }
    let result = sqlx::query("DELETE FROM pharmacy WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Bulk delete; pharmacies still referenced by orders are skipped
pub async fn delete_many(pool: &SqlitePool, ids: &[i64]) -> RepoResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "DELETE FROM pharmacy WHERE id NOT IN (SELECT pharmacy_id FROM orders WHERE pharmacy_id IS NOT NULL) AND id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}
