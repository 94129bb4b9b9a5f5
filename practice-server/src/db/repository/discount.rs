//! Discount Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use chrono::NaiveDate;
use shared::ErrorCode;
use shared::models::{Discount, DiscountCreate, DiscountUpdate, normalize_code};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str =
    "id, name, code, kind, value, valid_from, valid_until, is_active, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "discount",
    columns: COLUMNS,
    search_columns: &["name", "code"],
    sort_columns: &[
        ("name", "name COLLATE NOCASE"),
        ("code", "code"),
        ("value", "value"),
        ("valid_until", "valid_until"),
        ("created_at", "created_at"),
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<Discount>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Discount>> {
    let sql = format!("SELECT {COLUMNS} FROM discount WHERE id = ?");
    let discount = sqlx::query_as::<_, Discount>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(discount)
}

/// Look up by code; input is normalized the same way codes are stored
pub async fn find_by_code(pool: &SqlitePool, code: &str) -> RepoResult<Option<Discount>> {
    let sql = format!("SELECT {COLUMNS} FROM discount WHERE code = ?");
    let discount = sqlx::query_as::<_, Discount>(&sql)
        .bind(normalize_code(code))
        .fetch_optional(pool)
        .await?;
    Ok(discount)
}

/// Resolve a code entered on an order or invoice; it must exist and apply on `today`
pub async fn resolve_code(pool: &SqlitePool, code: &str, today: NaiveDate) -> RepoResult<Discount> {
    let Some(discount) = find_by_code(pool, code).await? else {
        return Err(RepoError::Business(
            ErrorCode::DiscountNotFound,
            format!("Discount code {} not found", normalize_code(code)),
        ));
    };
    if !discount.is_applicable(today) {
        return Err(RepoError::Business(
            ErrorCode::DiscountInvalid,
            format!("Discount code {} is inactive or outside its validity window", discount.code),
        ));
    }
    Ok(discount)
}

pub async fn create(pool: &SqlitePool, data: DiscountCreate) -> RepoResult<Discount> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO discount (id, name, code, kind, value, valid_from, valid_until, is_active, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
    )
    .bind(id)
    .bind(data.name.trim())
    .bind(normalize_code(&data.code))
    .bind(data.kind)
    .bind(data.value)
    .bind(&data.valid_from)
    .bind(&data.valid_until)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create discount".into()))
}

/// Partial update. Cross-field rules are checked by the caller against the
/// merged row before calling this.
pub async fn update(pool: &SqlitePool, id: i64, data: DiscountUpdate) -> RepoResult<Discount> {
    let rows = sqlx::query(
        "UPDATE discount SET name = COALESCE(?1, name), code = COALESCE(?2, code), \
         kind = COALESCE(?3, kind), value = COALESCE(?4, value), \
         valid_from = COALESCE(?5, valid_from), valid_until = COALESCE(?6, valid_until), \
         is_active = COALESCE(?7, is_active), updated_at = ?8 WHERE id = ?9",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(data.code.as_deref().map(normalize_code))
    .bind(data.kind)
    .bind(data.value)
    .bind(&data.valid_from)
    .bind(&data.valid_until)
    .bind(data.is_active)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Discount {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Discount {id} not found")))
}

/// Orders and invoices keep their computed amounts; their `discount_id` is nulled
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM discount WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use shared::models::DiscountKind;

    fn spring() -> DiscountCreate {
        DiscountCreate {
            name: "Spring".into(),
            code: " spring24 ".into(),
            kind: DiscountKind::Percentage,
            value: 10.0,
            valid_from: Some("2024-03-01".into()),
            valid_until: None,
        }
    }

    #[tokio::test]
    async fn code_is_stored_upper_case_and_found_by_any_case() {
        let pool = test_support::pool().await;
        let d = create(&pool, spring()).await.unwrap();
        assert_eq!(d.code, "SPRING24");
        assert_eq!(d.kind, DiscountKind::Percentage);

        let found = find_by_code(&pool, "Spring24").await.unwrap().unwrap();
        assert_eq!(found.id, d.id);
        assert!(find_by_code(&pool, "WINTER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_checks_window() {
        let pool = test_support::pool().await;
        create(&pool, spring()).await.unwrap();
        let march = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let february = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();

        assert!(resolve_code(&pool, "spring24", march).await.is_ok());
        assert!(matches!(
            resolve_code(&pool, "spring24", february).await,
            Err(RepoError::Business(ErrorCode::DiscountInvalid, _))
        ));
        assert!(matches!(
            resolve_code(&pool, "nope", march).await,
            Err(RepoError::Business(ErrorCode::DiscountNotFound, _))
        ));
    }

    #[tokio::test]
    async fn duplicate_code_after_normalization() {
        let pool = test_support::pool().await;
        create(&pool, spring()).await.unwrap();
        let err = create(
            &pool,
            DiscountCreate {
                code: "SPRING24".into(),
                ..spring()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let pool = test_support::pool().await;
        let d = create(&pool, spring()).await.unwrap();
        let updated = update(
            &pool,
            d.id,
            DiscountUpdate {
                kind: Some(DiscountKind::Fixed),
                value: Some(15.0),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.kind, DiscountKind::Fixed);
        assert_eq!(updated.value, 15.0);
        assert!(!updated.is_active);
        assert_eq!(updated.valid_from.as_deref(), Some("2024-03-01"));

        assert!(delete(&pool, d.id).await.unwrap());
        assert!(matches!(
            update(&pool, d.id, DiscountUpdate::default()).await,
            Err(RepoError::NotFound(_))
        ));
    }
}
