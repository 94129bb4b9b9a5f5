//! Consultation Repository
//!
//! Notes are editable while draft. Signing freezes them.

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult, patient, provider, session};
use shared::ErrorCode;
use shared::models::{
    Consultation, ConsultationCreate, ConsultationFilter, ConsultationStatus, ConsultationUpdate,
};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, patient_id, provider_id, session_id, consulted_at, chief_complaint, \
                       subjective, objective, assessment, \"plan\", status, signed_at, signed_by, \
                       created_by, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "consultation",
    columns: COLUMNS,
    search_columns: &["chief_complaint", "assessment"],
    sort_columns: &[
        ("consulted_at", "consulted_at"),
        ("status", "status"),
        ("created_at", "created_at"),
    ],
    default_sort: "consulted_at",
    default_order: SortOrder::Desc,
};

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &ConsultationFilter,
) -> RepoResult<Page<Consultation>> {
    let status = filter.status.map(|s| match s {
        ConsultationStatus::Draft => "draft",
        ConsultationStatus::Signed => "signed",
    });
    let filters = Filters::new()
        .eq("patient_id", filter.patient_id)
        .eq("provider_id", filter.provider_id)
        .eq("status", status);
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Consultation>> {
    let sql = format!("SELECT {COLUMNS} FROM consultation WHERE id = ?");
    let consultation = sqlx::query_as::<_, Consultation>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(consultation)
}

async fn require_draft(pool: &SqlitePool, id: i64) -> RepoResult<Consultation> {
    let current = find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Consultation {id} not found")))?;
    if current.status == ConsultationStatus::Signed {
        return Err(RepoError::Business(
            ErrorCode::ConsultationSigned,
            format!("Consultation {id} is signed and cannot be changed"),
        ));
    }
    Ok(current)
}

pub async fn create(
    pool: &SqlitePool,
    data: ConsultationCreate,
    created_by: i64,
) -> RepoResult<Consultation> {
    patient::find_active(pool, data.patient_id).await?;
    if provider::find_by_id(pool, data.provider_id).await?.is_none() {
        return Err(RepoError::Business(
            ErrorCode::ProviderNotFound,
            format!("Provider {} not found", data.provider_id),
        ));
    }
    if let Some(sid) = data.session_id {
        let s = session::find_by_id(pool, sid).await?.ok_or_else(|| {
            RepoError::Business(ErrorCode::SessionNotFound, format!("Session {sid} not found"))
        })?;
        if s.patient_id != data.patient_id {
            return Err(RepoError::Validation(format!(
                "Session {sid} belongs to another patient"
            )));
        }
    }

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO consultation (id, patient_id, provider_id, session_id, consulted_at, \
         chief_complaint, subjective, objective, assessment, \"plan\", status, created_by, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'draft', ?11, ?12, ?12)",
    )
    .bind(id)
    .bind(data.patient_id)
    .bind(data.provider_id)
    .bind(data.session_id)
    .bind(data.consulted_at.unwrap_or(now))
    .bind(data.chief_complaint.trim())
    .bind(&data.subjective)
    .bind(&data.objective)
    .bind(&data.assessment)
    .bind(&data.plan)
    .bind(created_by)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create consultation".into()))
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: ConsultationUpdate,
) -> RepoResult<Consultation> {
    require_draft(pool, id).await?;
    let result = sqlx::query(
        "UPDATE consultation SET consulted_at = COALESCE(?1, consulted_at), \
         chief_complaint = COALESCE(?2, chief_complaint), subjective = COALESCE(?3, subjective), \
         objective = COALESCE(?4, objective), assessment = COALESCE(?5, assessment), \
         \"plan\" = COALESCE(?6, \"plan\"), updated_at = ?7 WHERE id = ?8 AND status = 'draft'",
    )
    .bind(data.consulted_at)
    .bind(data.chief_complaint.as_deref().map(str::trim))
    .bind(&data.subjective)
    .bind(&data.objective)
    .bind(&data.assessment)
    .bind(&data.plan)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!("Consultation {id} was signed concurrently")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Consultation {id} not found")))
}

/// draft -> signed
pub async fn sign(pool: &SqlitePool, id: i64, signed_by: i64) -> RepoResult<Consultation> {
    require_draft(pool, id).await?;
    let now = shared::util::now_millis();
    let result = sqlx::query(
        "UPDATE consultation SET status = 'signed', signed_at = ?1, signed_by = ?2, updated_at = ?1 \
         WHERE id = ?3 AND status = 'draft'",
    )
    .bind(now)
    .bind(signed_by)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!("Consultation {id} was signed concurrently")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Consultation {id} not found")))
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<Consultation> {
    let current = require_draft(pool, id).await?;
    sqlx::query("DELETE FROM consultation WHERE id = ? AND status = 'draft'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    fn note(patient_id: i64, provider_id: i64) -> ConsultationCreate {
        ConsultationCreate {
            patient_id,
            provider_id,
            session_id: None,
            consulted_at: Some(1_710_000_000_000),
            chief_complaint: "Headache".into(),
            subjective: Some("Two days".into()),
            objective: None,
            assessment: None,
            plan: Some("Rest, fluids".into()),
        }
    }

    #[tokio::test]
    async fn signed_notes_are_immutable() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let kim = test_support::provider(&pool, "Kim").await;

        let c = create(&pool, note(ada.id, kim.id), 3).await.unwrap();
        assert_eq!(c.status, ConsultationStatus::Draft);
        assert_eq!(c.plan.as_deref(), Some("Rest, fluids"));

        let c = update(
            &pool,
            c.id,
            ConsultationUpdate {
                assessment: Some("Tension headache".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(c.assessment.as_deref(), Some("Tension headache"));

        let signed = sign(&pool, c.id, 3).await.unwrap();
        assert_eq!(signed.status, ConsultationStatus::Signed);
        assert_eq!(signed.signed_by, Some(3));
        assert!(signed.signed_at.is_some());

        for err in [
            update(&pool, c.id, ConsultationUpdate::default()).await.unwrap_err(),
            sign(&pool, c.id, 3).await.unwrap_err(),
            delete(&pool, c.id).await.unwrap_err(),
        ] {
            assert!(matches!(err, RepoError::Business(ErrorCode::ConsultationSigned, _)));
        }
    }

    #[tokio::test]
    async fn filters_and_delete() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let bob = test_support::patient(&pool, "Bob", "Stone").await;
        let kim = test_support::provider(&pool, "Kim").await;

        let a = create(&pool, note(ada.id, kim.id), 1).await.unwrap();
        let b = create(&pool, note(bob.id, kim.id), 1).await.unwrap();
        sign(&pool, b.id, 1).await.unwrap();

        let page = list(
            &pool,
            &ListQuery::default(),
            &ConsultationFilter {
                status: Some(ConsultationStatus::Signed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].patient_id, bob.id);

        delete(&pool, a.id).await.unwrap();
        assert!(find_by_id(&pool, a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_provider() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let err = create(&pool, note(ada.id, 404), 1).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::ProviderNotFound, _)));
    }
}
