//! Insurance Record Repository
//!
//! At most one primary record per patient: raising `is_primary` on one
//! record clears it on the others in the same transaction.

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::models::{InsuranceCreate, InsuranceFilter, InsuranceRecord, InsuranceUpdate};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::{Sqlite, SqlitePool, Transaction};

const COLUMNS: &str = "id, patient_id, carrier, plan_name, policy_number, group_number, \
                       holder_name, holder_relationship, coverage_percent, valid_from, \
                       valid_until, is_primary, is_active, notes, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "insurance_record",
    columns: COLUMNS,
    search_columns: &["carrier", "plan_name", "policy_number"],
    sort_columns: &[
        ("carrier", "carrier COLLATE NOCASE"),
        ("valid_until", "valid_until"),
        ("is_primary", "is_primary"),
        ("created_at", "created_at"),
    ],
    default_sort: "is_primary",
    default_order: SortOrder::Desc,
};

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &InsuranceFilter,
) -> RepoResult<Page<InsuranceRecord>> {
    let filters = Filters::new().eq("patient_id", filter.patient_id);
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<InsuranceRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM insurance_record WHERE id = ?");
    let record = sqlx::query_as::<_, InsuranceRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// All records of one patient, primary first
pub async fn for_patient(pool: &SqlitePool, patient_id: i64) -> RepoResult<Vec<InsuranceRecord>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM insurance_record WHERE patient_id = ? \
         ORDER BY is_primary DESC, created_at DESC"
    );
    let records = sqlx::query_as::<_, InsuranceRecord>(&sql)
        .bind(patient_id)
        .fetch_all(pool)
        .await?;
    Ok(records)
}

async fn clear_primary(
    tx: &mut Transaction<'_, Sqlite>,
    patient_id: i64,
    keep_id: i64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE insurance_record SET is_primary = 0, updated_at = ? \
         WHERE patient_id = ? AND id != ? AND is_primary = 1",
    )
    .bind(now)
    .bind(patient_id)
    .bind(keep_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn create(pool: &SqlitePool, data: InsuranceCreate) -> RepoResult<InsuranceRecord> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO insurance_record (id, patient_id, carrier, plan_name, policy_number, \
         group_number, holder_name, holder_relationship, coverage_percent, valid_from, valid_until, \
         is_primary, is_active, notes, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?14, ?14)",
    )
    .bind(id)
    .bind(data.patient_id)
    .bind(data.carrier.trim())
    .bind(&data.plan_name)
    .bind(data.policy_number.trim())
    .bind(&data.group_number)
    .bind(&data.holder_name)
    .bind(data.holder_relationship.unwrap_or_default())
    .bind(data.coverage_percent)
    .bind(&data.valid_from)
    .bind(&data.valid_until)
    .bind(data.is_primary)
    .bind(&data.notes)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    if data.is_primary {
        clear_primary(&mut tx, data.patient_id, id, now).await?;
    }
    tx.commit().await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create insurance record".into()))
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: InsuranceUpdate,
) -> RepoResult<InsuranceRecord> {
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;
    let patient_id: Option<i64> =
        sqlx::query_scalar("SELECT patient_id FROM insurance_record WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(patient_id) = patient_id else {
        return Err(RepoError::NotFound(format!("Insurance record {id} not found")));
    };
    sqlx::query(
        "UPDATE insurance_record SET carrier = COALESCE(?1, carrier), \
         plan_name = COALESCE(?2, plan_name), policy_number = COALESCE(?3, policy_number), \
         group_number = COALESCE(?4, group_number), holder_name = COALESCE(?5, holder_name), \
         holder_relationship = COALESCE(?6, holder_relationship), \
         coverage_percent = COALESCE(?7, coverage_percent), valid_from = COALESCE(?8, valid_from), \
         valid_until = COALESCE(?9, valid_until), is_primary = COALESCE(?10, is_primary), \
         is_active = COALESCE(?11, is_active), notes = COALESCE(?12, notes), updated_at = ?13 \
         WHERE id = ?14",
    )
    .bind(data.carrier.as_deref().map(str::trim))
    .bind(&data.plan_name)
    .bind(data.policy_number.as_deref().map(str::trim))
    .bind(&data.group_number)
    .bind(&data.holder_name)
    .bind(data.holder_relationship)
    .bind(data.coverage_percent)
    .bind(&data.valid_from)
    .bind(&data.valid_until)
    .bind(data.is_primary)
    .bind(data.is_active)
    .bind(&data.notes)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if data.is_primary == Some(true) {
        clear_primary(&mut tx, patient_id, id, now).await?;
    }
    tx.commit().await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Insurance record {id} not found")))
}

/// Invoices referring to the record keep their amounts; the link is nulled
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM insurance_record WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use shared::models::HolderRelationship;

    fn policy(patient_id: i64, number: &str, is_primary: bool) -> InsuranceCreate {
        InsuranceCreate {
            patient_id,
            carrier: "Acme Health".into(),
            plan_name: Some("Gold".into()),
            policy_number: number.into(),
            group_number: None,
            holder_name: None,
            holder_relationship: None,
            coverage_percent: 80.0,
            valid_from: Some("2024-01-01".into()),
            valid_until: None,
            is_primary,
            notes: None,
        }
    }

    #[tokio::test]
    async fn one_primary_per_patient() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let bob = test_support::patient(&pool, "Bob", "Stone").await;

        let a = create(&pool, policy(ada.id, "A-1", true)).await.unwrap();
        let other = create(&pool, policy(bob.id, "B-1", true)).await.unwrap();
        assert_eq!(a.holder_relationship, HolderRelationship::Holder);

        let b = create(&pool, policy(ada.id, "A-2", true)).await.unwrap();
        assert!(b.is_primary);
        assert!(!find_by_id(&pool, a.id).await.unwrap().unwrap().is_primary);
        // other patients are untouched
        assert!(find_by_id(&pool, other.id).await.unwrap().unwrap().is_primary);

        let a = update(
            &pool,
            a.id,
            InsuranceUpdate {
                is_primary: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(a.is_primary);
        let records = for_patient(&pool, ada.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a.id);
        assert!(!records[1].is_primary);
    }

    #[tokio::test]
    async fn list_by_patient() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let bob = test_support::patient(&pool, "Bob", "Stone").await;
        create(&pool, policy(ada.id, "A-1", false)).await.unwrap();
        create(&pool, policy(bob.id, "B-1", false)).await.unwrap();

        let page = list(
            &pool,
            &ListQuery::default(),
            &InsuranceFilter {
                patient_id: Some(ada.id),
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].policy_number, "A-1");
    }

    #[tokio::test]
    async fn unknown_patient_is_rejected() {
        let pool = test_support::pool().await;
        let err = create(&pool, policy(42, "X", false)).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn update_missing_record() {
        let pool = test_support::pool().await;
        let err = update(&pool, 1, InsuranceUpdate::default()).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }
}
