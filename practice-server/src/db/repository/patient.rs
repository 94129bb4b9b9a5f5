//! Patient Repository

use super::list::{Arg, Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::models::{Patient, PatientCreate, PatientFilter, PatientUpdate, Tag};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const COLUMNS: &str = "id, first_name, last_name, date_of_birth, gender, email, phone, address, \
                       city, state, postal_code, notes, is_active, created_at, updated_at";

const LIST: ListSpec = ListSpec {
    table: "patient",
    columns: COLUMNS,
    search_columns: &["first_name", "last_name", "email", "phone"],
    sort_columns: &[
        ("last_name", "last_name COLLATE NOCASE"),
        ("first_name", "first_name COLLATE NOCASE"),
        ("date_of_birth", "date_of_birth"),
        ("created_at", "created_at"),
    ],
    default_sort: "last_name",
    default_order: SortOrder::Asc,
};

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &PatientFilter,
) -> RepoResult<Page<Patient>> {
    let filters = Filters::new().eq("is_active", filter.is_active).raw_if(
        filter.tag_id.is_some(),
        "id IN (SELECT patient_id FROM patient_tag WHERE tag_id = ?)",
        filter.tag_id.map(Arg::from).into_iter().collect(),
    );
    let mut page: Page<Patient> = fetch_page(pool, &LIST, &filters, query).await?;
    for patient in &mut page.items {
        patient.tags = tags_for(pool, patient.id).await?;
    }
    Ok(page)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Patient>> {
    let sql = format!("SELECT {COLUMNS} FROM patient WHERE id = ?");
    let patient = sqlx::query_as::<_, Patient>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match patient {
        Some(mut p) => {
            p.tags = tags_for(pool, p.id).await?;
            Ok(Some(p))
        }
        None => Ok(None),
    }
}

/// Patient that exists and is not archived
pub async fn find_active(pool: &SqlitePool, id: i64) -> RepoResult<Patient> {
    let patient = find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Patient {id} not found")))?;
    if !patient.is_active {
        return Err(RepoError::Business(
            shared::ErrorCode::PatientArchived,
            format!("Patient {id} is archived"),
        ));
    }
    Ok(patient)
}

pub async fn tags_for(pool: &SqlitePool, patient_id: i64) -> RepoResult<Vec<Tag>> {
    let tags = sqlx::query_as::<_, Tag>(
        "SELECT t.id, t.name, t.color, t.created_at FROM tag t \
         JOIN patient_tag pt ON pt.tag_id = t.id WHERE pt.patient_id = ? ORDER BY t.name COLLATE NOCASE",
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await?;
    Ok(tags)
}

pub async fn create(pool: &SqlitePool, data: PatientCreate) -> RepoResult<Patient> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO patient (id, first_name, last_name, date_of_birth, gender, email, phone, address, \
         city, state, postal_code, notes, is_active, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?13)",
    )
    .bind(id)
    .bind(data.first_name.trim())
    .bind(data.last_name.trim())
    .bind(&data.date_of_birth)
    .bind(data.gender.unwrap_or_default())
    .bind(&data.email)
    .bind(&data.phone)
    .bind(&data.address)
    .bind(&data.city)
    .bind(&data.state)
    .bind(&data.postal_code)
    .bind(&data.notes)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    replace_tags(&mut tx, id, &data.tag_ids).await?;
    tx.commit().await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create patient".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: PatientUpdate) -> RepoResult<Patient> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE patient SET first_name = COALESCE(?1, first_name), last_name = COALESCE(?2, last_name), \
         date_of_birth = COALESCE(?3, date_of_birth), gender = COALESCE(?4, gender), \
         email = COALESCE(?5, email), phone = COALESCE(?6, phone), address = COALESCE(?7, address), \
         city = COALESCE(?8, city), state = COALESCE(?9, state), postal_code = COALESCE(?10, postal_code), \
         notes = COALESCE(?11, notes), is_active = COALESCE(?12, is_active), updated_at = ?13 WHERE id = ?14",
    )
    .bind(data.first_name.as_deref().map(str::trim))
    .bind(data.last_name.as_deref().map(str::trim))
    .bind(&data.date_of_birth)
    .bind(data.gender)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(&data.address)
    .bind(&data.city)
    .bind(&data.state)
    .bind(&data.postal_code)
    .bind(&data.notes)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Patient {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Patient {id} not found")))
}

/// Soft delete: patients are never removed, only deactivated
pub async fn archive(pool: &SqlitePool, id: i64) -> RepoResult<Patient> {
    update(
        pool,
        id,
        PatientUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
}

/// Archive several patients, returning how many were active before
pub async fn archive_many(pool: &SqlitePool, ids: &[i64]) -> RepoResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE patient SET is_active = 0, updated_at = ");
    qb.push_bind(shared::util::now_millis());
    qb.push(" WHERE is_active = 1 AND id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Replace the patient's tag set
pub async fn set_tags(pool: &SqlitePool, id: i64, tag_ids: &[i64]) -> RepoResult<Patient> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query("UPDATE patient SET updated_at = ? WHERE id = ?")
        .bind(shared::util::now_millis())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Patient {id} not found")));
    }
    replace_tags(&mut tx, id, tag_ids).await?;
    tx.commit().await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Patient {id} not found")))
}

async fn replace_tags(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    patient_id: i64,
    tag_ids: &[i64],
) -> RepoResult<()> {
    sqlx::query("DELETE FROM patient_tag WHERE patient_id = ?")
        .bind(patient_id)
        .execute(&mut **tx)
        .await?;
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO patient_tag (patient_id, tag_id) VALUES (?, ?)")
            .bind(patient_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
