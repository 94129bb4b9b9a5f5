//! Tag Repository

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::models::{DEFAULT_TAG_COLOR, Tag, TagCreate, TagUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const LIST: ListSpec = ListSpec {
    table: "tag",
    columns: "id, name, color, created_at",
    search_columns: &["name"],
    sort_columns: &[("name", "name COLLATE NOCASE"), ("created_at", "created_at")],
    default_sort: "name",
    default_order: SortOrder::Asc,
};

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<Tag>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Tag>> {
    let tag = sqlx::query_as::<_, Tag>("SELECT id, name, color, created_at FROM tag WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(tag)
}

pub async fn create(pool: &SqlitePool, data: TagCreate) -> RepoResult<Tag> {
    let id = shared::util::snowflake_id();
    sqlx::query("INSERT INTO tag (id, name, color, created_at) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(data.name.trim())
        .bind(data.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR))
        .bind(shared::util::now_millis())
        .execute(pool)
        .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create tag".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: TagUpdate) -> RepoResult<Tag> {
    let rows = sqlx::query(
        "UPDATE tag SET name = COALESCE(?1, name), color = COALESCE(?2, color) WHERE id = ?3",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(&data.color)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Tag {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Tag {id} not found")))
}

/// Delete a tag; `patient_tag` rows go with it (ON DELETE CASCADE)
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM tag WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{patient, test_support};

    fn tag(name: &str, color: Option<&str>) -> TagCreate {
        TagCreate {
            name: name.into(),
            color: color.map(Into::into),
        }
    }

    #[tokio::test]
    async fn default_color_and_case_insensitive_names() {
        let pool = test_support::pool().await;
        let vip = create(&pool, tag("VIP", None)).await.unwrap();
        assert_eq!(vip.color, DEFAULT_TAG_COLOR);

        let err = create(&pool, tag("vip", Some("#000000"))).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn delete_detaches_from_patients() {
        let pool = test_support::pool().await;
        let vip = create(&pool, tag("VIP", None)).await.unwrap();
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        patient::set_tags(&pool, ada.id, &[vip.id]).await.unwrap();

        assert!(delete(&pool, vip.id).await.unwrap());
        assert!(patient::tags_for(&pool, ada.id).await.unwrap().is_empty());
        assert!(!delete(&pool, vip.id).await.unwrap());
    }

    #[tokio::test]
    async fn update_color_only() {
        let pool = test_support::pool().await;
        let t = create(&pool, tag("Allergy", None)).await.unwrap();
        let updated = update(
            &pool,
            t.id,
            TagUpdate {
                name: None,
                color: Some("#FF0000".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Allergy");
        assert_eq!(updated.color, "#FF0000");
    }
}
