//! Staff User Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::models::{Role, StaffUser};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str =
    "id, username, display_name, role, is_active, hash_pass, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "staff_user",
    columns: COLUMNS,
    search_columns: &["username", "display_name"],
    sort_columns: &[
        ("username", "username"),
        ("display_name", "display_name COLLATE NOCASE"),
        ("role", "role"),
        ("created_at", "created_at"),
    ],
    default_sort: "username",
    default_order: SortOrder::Asc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<StaffUser>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<StaffUser>> {
    let sql = format!("SELECT {COLUMNS} FROM staff_user WHERE id = ?");
    let user = sqlx::query_as::<_, StaffUser>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> RepoResult<Option<StaffUser>> {
    let sql = format!("SELECT {COLUMNS} FROM staff_user WHERE username = ?");
    let user = sqlx::query_as::<_, StaffUser>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// `hash_pass` must already be an Argon2 PHC string
pub async fn create(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
    hash_pass: &str,
    role: Role,
) -> RepoResult<StaffUser> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO staff_user (id, username, display_name, role, is_active, hash_pass, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
    )
    .bind(id)
    .bind(username)
    .bind(display_name)
    .bind(role)
    .bind(hash_pass)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create staff user".into()))
}

/// Partial update; `None` keeps the current value
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    display_name: Option<&str>,
    role: Option<Role>,
    is_active: Option<bool>,
    hash_pass: Option<&str>,
) -> RepoResult<StaffUser> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE staff_user SET display_name = COALESCE(?1, display_name), role = COALESCE(?2, role), \
         is_active = COALESCE(?3, is_active), hash_pass = COALESCE(?4, hash_pass), updated_at = ?5 WHERE id = ?6",
    )
    .bind(display_name)
    .bind(role)
    .bind(is_active)
    .bind(hash_pass)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Staff user {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Staff user {id} not found")))
}

pub async fn count(pool: &SqlitePool) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staff_user")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn count_active_admins(pool: &SqlitePool) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM staff_user WHERE role = 'admin' AND is_active = 1",
    )
    .fetch_one(pool)
    .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    #[tokio::test]
    async fn create_find_update() {
        let pool = test_support::pool().await;
        let user = create(&pool, "dr.lee", "Dr Lee", "$argon2id$x", Role::Clinician)
            .await
            .unwrap();
        assert!(user.is_active);
        assert_eq!(user.role, Role::Clinician);

        let found = find_by_username(&pool, "dr.lee").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let updated = update(&pool, user.id, Some("Dr. Lee"), Some(Role::Admin), None, None)
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Dr. Lee");
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.hash_pass, "$argon2id$x");
        assert_eq!(count_active_admins(&pool).await.unwrap(), 1);

        update(&pool, user.id, None, None, Some(false), None).await.unwrap();
        assert_eq!(count_active_admins(&pool).await.unwrap(), 0);
        assert_eq!(count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_username() {
        let pool = test_support::pool().await;
        create(&pool, "sam", "Sam", "h", Role::Billing).await.unwrap();
        let err = create(&pool, "sam", "Sam 2", "h", Role::Billing)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_missing_user() {
        let pool = test_support::pool().await;
        let err = update(&pool, 42, Some("x"), None, None, None).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_searches_display_name() {
        let pool = test_support::pool().await;
        create(&pool, "amy", "Amy Front", "h", Role::FrontDesk).await.unwrap();
        create(&pool, "bob", "Bob Billing", "h", Role::Billing).await.unwrap();
        let page = list(&pool, &ListQuery::default().with_search("billing"))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].username, "bob");
    }
}
