//! Catalog Service Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::ErrorCode;
use shared::models::{CatalogService, CatalogServiceCreate, CatalogServiceUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str =
    "id, name, code, description, price, duration_minutes, is_active, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "catalog_service",
    columns: COLUMNS,
    search_columns: &["name", "code", "description"],
    sort_columns: &[
        ("name", "name COLLATE NOCASE"),
        ("code", "code"),
        ("price", "price"),
        ("duration_minutes", "duration_minutes"),
        ("created_at", "created_at"),
    ],
    default_sort: "name",
    default_order: SortOrder::Asc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<CatalogService>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<CatalogService>> {
    let sql = format!("SELECT {COLUMNS} FROM catalog_service WHERE id = ?");
    let service = sqlx::query_as::<_, CatalogService>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(service)
}

pub async fn create(pool: &SqlitePool, data: CatalogServiceCreate) -> RepoResult<CatalogService> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO catalog_service (id, name, code, description, price, duration_minutes, is_active, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
    )
    .bind(id)
    .bind(data.name.trim())
    .bind(data.code.trim())
    .bind(&data.description)
    .bind(data.price)
    .bind(data.duration_minutes)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create service".into()))
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: CatalogServiceUpdate,
) -> RepoResult<CatalogService> {
    let rows = sqlx::query(
        "UPDATE catalog_service SET name = COALESCE(?1, name), code = COALESCE(?2, code), \
         description = COALESCE(?3, description), price = COALESCE(?4, price), \
         duration_minutes = COALESCE(?5, duration_minutes), is_active = COALESCE(?6, is_active), \
         updated_at = ?7 WHERE id = ?8",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(data.code.as_deref().map(str::trim))
    .bind(&data.description)
    .bind(data.price)
    .bind(data.duration_minutes)
    .bind(data.is_active)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Service {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Service {id} not found")))
}

/// Order items and sessions pointing at the service
pub async fn reference_count(pool: &SqlitePool, id: i64) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT (SELECT COUNT(*) FROM order_item WHERE service_id = ?1) \
              + (SELECT COUNT(*) FROM session WHERE service_id = ?1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    if reference_count(pool, id).await? > 0 {
        return Err(RepoError::Business(
            ErrorCode::ServiceInUse,
            "Service is used by orders or sessions; deactivate instead".into(),
        ));
    }
    let result = sqlx::query("DELETE FROM catalog_service WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    #[tokio::test]
    async fn codes_are_unique() {
        let pool = test_support::pool().await;
        test_support::service(&pool, "LAB-1", 40.0).await;
        let err = create(
            &pool,
            CatalogServiceCreate {
                name: "Other".into(),
                code: "LAB-1".into(),
                description: None,
                price: 1.0,
                duration_minutes: 15,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn sort_by_price_desc() {
        let pool = test_support::pool().await;
        test_support::service(&pool, "A", 10.0).await;
        test_support::service(&pool, "B", 30.0).await;
        test_support::service(&pool, "C", 20.0).await;
        let page = list(
            &pool,
            &ListQuery::default().order_by("price", SortOrder::Desc),
        )
        .await
        .unwrap();
        let codes: Vec<_> = page.items.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, ["B", "C", "A"]);
    }

    #[tokio::test]
    async fn update_price() {
        let pool = test_support::pool().await;
        let s = test_support::service(&pool, "X", 10.0).await;
        let updated = update(
            &pool,
            s.id,
            CatalogServiceUpdate {
                price: Some(12.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.price, 12.5);
        assert_eq!(updated.duration_minutes, 30);
        assert!(delete(&pool, s.id).await.unwrap());
    }
}
