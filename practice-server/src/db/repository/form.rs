//! Form Builder Repository
//!
//! Field edits are computed on the in-memory field list and written back
//! as a whole: the template's rows are replaced in one transaction and
//! its `version` is bumped. Submissions record the version they answered.

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult};
use shared::ErrorCode;
use shared::models::{
    self as forms, FormDuplicate, FormField, FormFieldCreate, FormFieldInput, FormFieldUpdate,
    FormSubmission, FormTemplate, FormTemplateCreate, FormTemplateUpdate, MoveField,
    SubmissionCreate, SubmissionFilter,
};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::types::Json;
use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};

const COLUMNS: &str =
    "id, name, description, is_active, version, created_by, created_at, updated_at";

const FIELD_COLUMNS: &str = "id, template_id, \"key\", label, kind, required, placeholder, \
                             help_text, options, min, max, max_length, position";

const SUBMISSION_COLUMNS: &str =
    "id, template_id, template_version, patient_id, answers, submitted_by, created_at";

const LIST: ListSpec = ListSpec {
    table: "form_template",
    columns: COLUMNS,
    search_columns: &["name", "description"],
    sort_columns: &[
        ("name", "name COLLATE NOCASE"),
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
    ],
    default_sort: "name",
    default_order: SortOrder::Asc,
};

const SUBMISSION_LIST: ListSpec = ListSpec {
    table: "form_submission",
    columns: SUBMISSION_COLUMNS,
    search_columns: &[],
    sort_columns: &[("created_at", "created_at")],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
};

// ── Templates ───────────────────────────────────────────────────────

pub async fn list(pool: &SqlitePool, query: &ListQuery) -> RepoResult<Page<FormTemplate>> {
    fetch_page(pool, &LIST, &Filters::new(), query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<FormTemplate>> {
    let sql = format!("SELECT {COLUMNS} FROM form_template WHERE id = ?");
    let template = sqlx::query_as::<_, FormTemplate>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match template {
        Some(mut template) => {
            template.fields = fields_for(pool, id).await?;
            Ok(Some(template))
        }
        None => Ok(None),
    }
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<FormTemplate> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Form template {id} not found")))
}

pub async fn fields_for<'e, E>(executor: E, template_id: i64) -> RepoResult<Vec<FormField>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {FIELD_COLUMNS} FROM form_field WHERE template_id = ? ORDER BY position");
    let fields = sqlx::query_as::<_, FormField>(&sql)
        .bind(template_id)
        .fetch_all(executor)
        .await?;
    Ok(fields)
}

async fn insert_fields(tx: &mut Transaction<'_, Sqlite>, fields: &[FormField]) -> RepoResult<()> {
    for field in fields {
        sqlx::query(
            "INSERT INTO form_field (id, template_id, \"key\", label, kind, required, placeholder, \
             help_text, options, min, max, max_length, position) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(field.id)
        .bind(field.template_id)
        .bind(&field.key)
        .bind(&field.label)
        .bind(field.kind)
        .bind(field.required)
        .bind(&field.placeholder)
        .bind(&field.help_text)
        .bind(Json(&field.options))
        .bind(field.min)
        .bind(field.max)
        .bind(field.max_length)
        .bind(field.position)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn check_definitions(fields: &[FormFieldInput]) -> RepoResult<()> {
    forms::check_fields(fields).map_err(RepoError::Validation)
}

async fn insert_template(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    fields: Vec<FormFieldInput>,
    created_by: i64,
) -> RepoResult<FormTemplate> {
    check_definitions(&fields)?;
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let rows: Vec<FormField> = fields
        .into_iter()
        .enumerate()
        .map(|(i, input)| input.into_field(shared::util::snowflake_id(), id, i as i64))
        .collect();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO form_template (id, name, description, is_active, version, created_by, \
         created_at, updated_at) VALUES (?1, ?2, ?3, 1, 1, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(name.trim())
    .bind(description)
    .bind(created_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    insert_fields(&mut tx, &rows).await?;
    tx.commit().await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create form template".into()))
}

pub async fn create(
    pool: &SqlitePool,
    data: FormTemplateCreate,
    created_by: i64,
) -> RepoResult<FormTemplate> {
    insert_template(
        pool,
        &data.name,
        data.description.as_deref(),
        data.fields,
        created_by,
    )
    .await
}

/// Name, description and active flag; fields have their own operations
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: FormTemplateUpdate,
) -> RepoResult<FormTemplate> {
    let rows = sqlx::query(
        "UPDATE form_template SET name = COALESCE(?1, name), \
         description = COALESCE(?2, description), is_active = COALESCE(?3, is_active), \
         updated_at = ?4 WHERE id = ?5",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(&data.description)
    .bind(data.is_active)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Form template {id} not found")));
    }
    require(pool, id).await
}

pub async fn count_submissions(pool: &SqlitePool, template_id: i64) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM form_submission WHERE template_id = ?")
        .bind(template_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Templates with submissions must be deactivated instead
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<FormTemplate> {
    let current = require(pool, id).await?;
    if count_submissions(pool, id).await? > 0 {
        return Err(RepoError::Business(
            ErrorCode::FormHasSubmissions,
            format!("Form '{}' has submissions; deactivate it instead", current.name),
        ));
    }
    sqlx::query("DELETE FROM form_template WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(current)
}

/// Copy a template with fresh field ids, starting over at version 1
pub async fn duplicate(
    pool: &SqlitePool,
    id: i64,
    data: FormDuplicate,
    created_by: i64,
) -> RepoResult<FormTemplate> {
    let source = require(pool, id).await?;
    let name = data
        .name
        .unwrap_or_else(|| format!("{} (copy)", source.name));
    let fields = source.fields.iter().map(FormFieldInput::from).collect();
    insert_template(
        pool,
        &name,
        source.description.as_deref(),
        fields,
        created_by,
    )
    .await
}

// ── Fields ──────────────────────────────────────────────────────────

/// Replace all field rows of a template and bump its version.
///
/// `read_version` is the version the edit was computed from; a template
/// changed in between is left untouched and reported as a conflict.
async fn save_fields(
    pool: &SqlitePool,
    template_id: i64,
    read_version: i64,
    fields: &[FormField],
) -> RepoResult<FormTemplate> {
    let mut tx = pool.begin().await?;
    let bumped = sqlx::query(
        "UPDATE form_template SET version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
    )
    .bind(shared::util::now_millis())
    .bind(template_id)
    .bind(read_version)
    .execute(&mut *tx)
    .await?;
    if bumped.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Form template {template_id} changed since version {read_version}; reload and retry"
        )));
    }
    sqlx::query("DELETE FROM form_field WHERE template_id = ?")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
    insert_fields(&mut tx, fields).await?;
    tx.commit().await?;
    require(pool, template_id).await
}

fn key_taken(fields: &[FormField], key: &str, except_id: Option<i64>) -> RepoResult<()> {
    if fields.iter().any(|f| f.key == key && Some(f.id) != except_id) {
        return Err(RepoError::Business(
            ErrorCode::FormFieldKeyExists,
            format!("Field key '{key}' already exists in this form"),
        ));
    }
    Ok(())
}

fn field_not_found(field_id: i64) -> RepoError {
    RepoError::Business(
        ErrorCode::FormFieldNotFound,
        format!("Field {field_id} not found in this form"),
    )
}

/// Append, or insert at `position` (clamped to the end)
pub async fn add_field(
    pool: &SqlitePool,
    template_id: i64,
    data: FormFieldCreate,
) -> RepoResult<(FormField, FormTemplate)> {
    let template = require(pool, template_id).await?;
    data.field.check().map_err(RepoError::Validation)?;
    key_taken(&template.fields, &data.field.key, None)?;

    let field_id = shared::util::snowflake_id();
    let version = template.version;
    let mut fields = template.fields;
    let field = data.field.into_field(field_id, template_id, 0);
    forms::insert_field(&mut fields, field, data.position);
    let template = save_fields(pool, template_id, version, &fields).await?;
    let field = template
        .fields
        .iter()
        .find(|f| f.id == field_id)
        .cloned()
        .ok_or_else(|| field_not_found(field_id))?;
    Ok((field, template))
}

/// Partial update of one field; the merged definition is re-checked
pub async fn update_field(
    pool: &SqlitePool,
    template_id: i64,
    field_id: i64,
    data: FormFieldUpdate,
) -> RepoResult<(FormField, FormTemplate)> {
    let template = require(pool, template_id).await?;
    let mut fields = template.fields;
    let index = fields
        .iter()
        .position(|f| f.id == field_id)
        .ok_or_else(|| field_not_found(field_id))?;

    let merged = data.merge_into(FormFieldInput::from(&fields[index]));
    merged.check().map_err(RepoError::Validation)?;
    key_taken(&fields, &merged.key, Some(field_id))?;
    let position = fields[index].position;
    fields[index] = merged.into_field(field_id, template_id, position);

    let template = save_fields(pool, template_id, template.version, &fields).await?;
    let field = template
        .fields
        .iter()
        .find(|f| f.id == field_id)
        .cloned()
        .ok_or_else(|| field_not_found(field_id))?;
    Ok((field, template))
}

pub async fn remove_field(
    pool: &SqlitePool,
    template_id: i64,
    field_id: i64,
) -> RepoResult<(FormField, FormTemplate)> {
    let template = require(pool, template_id).await?;
    let version = template.version;
    let mut fields = template.fields;
    let removed = forms::remove_field(&mut fields, field_id).ok_or_else(|| field_not_found(field_id))?;
    let template = save_fields(pool, template_id, version, &fields).await?;
    Ok((removed, template))
}

pub async fn move_field(pool: &SqlitePool, template_id: i64, data: MoveField) -> RepoResult<FormTemplate> {
    let template = require(pool, template_id).await?;
    let version = template.version;
    let mut fields = template.fields;
    forms::move_field(&mut fields, data.from, data.to).map_err(RepoError::Validation)?;
    save_fields(pool, template_id, version, &fields).await
}

// ── Submissions ─────────────────────────────────────────────────────

pub async fn list_submissions(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &SubmissionFilter,
) -> RepoResult<Page<FormSubmission>> {
    let filters = Filters::new()
        .eq("template_id", filter.template_id)
        .eq("patient_id", filter.patient_id);
    fetch_page(pool, &SUBMISSION_LIST, &filters, query).await
}

pub async fn find_submission(pool: &SqlitePool, id: i64) -> RepoResult<Option<FormSubmission>> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM form_submission WHERE id = ?");
    let submission = sqlx::query_as::<_, FormSubmission>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(submission)
}

/// Store answers already validated against `template`'s fields
pub async fn insert_submission(
    pool: &SqlitePool,
    template: &FormTemplate,
    data: SubmissionCreate,
    submitted_by: i64,
) -> RepoResult<FormSubmission> {
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO form_submission (id, template_id, template_version, patient_id, answers, \
         submitted_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(template.id)
    .bind(template.version)
    .bind(data.patient_id)
    .bind(Json(&data.answers))
    .bind(submitted_by)
    .bind(shared::util::now_millis())
    .execute(pool)
    .await?;
    find_submission(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to store form submission".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use serde_json::json;
    use shared::models::FieldKind;

    fn field(key: &str, kind: FieldKind) -> FormFieldInput {
        FormFieldInput {
            key: key.into(),
            label: key.to_uppercase(),
            kind,
            required: false,
            placeholder: None,
            help_text: None,
            options: if kind.is_choice() {
                vec!["yes".into(), "no".into()]
            } else {
                vec![]
            },
            min: None,
            max: None,
            max_length: None,
        }
    }

    async fn intake(pool: &SqlitePool) -> FormTemplate {
        create(
            pool,
            FormTemplateCreate {
                name: "Intake".into(),
                description: Some("New patient intake".into()),
                fields: vec![
                    field("name", FieldKind::Text),
                    field("smoker", FieldKind::Radio),
                    field("weight", FieldKind::Number),
                ],
            },
            1,
        )
        .await
        .unwrap()
    }

    fn keys(template: &FormTemplate) -> Vec<&str> {
        template.fields.iter().map(|f| f.key.as_str()).collect()
    }

    #[tokio::test]
    async fn create_stores_fields_in_order() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;
        assert_eq!(t.version, 1);
        assert_eq!(keys(&t), ["name", "smoker", "weight"]);
        assert_eq!(t.fields[1].options, ["yes", "no"]);
        let positions: Vec<_> = t.fields.iter().map(|f| f.position).collect();
        assert_eq!(positions, [0, 1, 2]);
    }

    #[tokio::test]
    async fn invalid_definitions_are_rejected() {
        let pool = test_support::pool().await;
        let err = create(
            &pool,
            FormTemplateCreate {
                name: "Broken".into(),
                description: None,
                fields: vec![field("a", FieldKind::Text), field("a", FieldKind::Number)],
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
        assert_eq!(list(&pool, &ListQuery::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn field_edits_bump_version_and_keep_positions_contiguous() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;

        let (added, t) = add_field(
            &pool,
            t.id,
            FormFieldCreate {
                field: field("allergies", FieldKind::Textarea),
                position: Some(1),
            },
        )
        .await
        .unwrap();
        assert_eq!(added.position, 1);
        assert_eq!(t.version, 2);
        assert_eq!(keys(&t), ["name", "allergies", "smoker", "weight"]);

        let t = move_field(&pool, t.id, MoveField { from: 3, to: 0 }).await.unwrap();
        assert_eq!(keys(&t), ["weight", "name", "allergies", "smoker"]);
        assert_eq!(t.version, 3);

        let (removed, t) = remove_field(&pool, t.id, added.id).await.unwrap();
        assert_eq!(removed.key, "allergies");
        assert_eq!(keys(&t), ["weight", "name", "smoker"]);
        let positions: Vec<_> = t.fields.iter().map(|f| f.position).collect();
        assert_eq!(positions, [0, 1, 2]);

        let err = move_field(&pool, t.id, MoveField { from: 0, to: 3 }).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn stale_field_edit_is_refused() {
        let pool = test_support::pool().await;
        let stale = intake(&pool).await;

        let (_, current) = add_field(
            &pool,
            stale.id,
            FormFieldCreate {
                field: field("allergies", FieldKind::Textarea),
                position: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(current.version, 2);

        // An edit computed from version 1 must not clobber the added field
        let mut fields = stale.fields.clone();
        fields.pop();
        let err = save_fields(&pool, stale.id, stale.version, &fields).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let reloaded = require(&pool, stale.id).await.unwrap();
        assert_eq!(reloaded.version, 2);
        assert_eq!(keys(&reloaded), ["name", "smoker", "weight", "allergies"]);
    }

    #[tokio::test]
    async fn missing_field_leaves_version_alone() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;
        let err = remove_field(&pool, t.id, -1).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::FormFieldNotFound, _)));
        assert_eq!(require(&pool, t.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn field_keys_stay_unique() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;
        let err = add_field(
            &pool,
            t.id,
            FormFieldCreate {
                field: field("smoker", FieldKind::Checkbox),
                position: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::FormFieldKeyExists, _)));

        let weight = t.fields[2].id;
        let err = update_field(
            &pool,
            t.id,
            weight,
            FormFieldUpdate {
                key: Some("name".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::FormFieldKeyExists, _)));

        let (updated, _) = update_field(
            &pool,
            t.id,
            weight,
            FormFieldUpdate {
                max: Some(Some(400.0)),
                required: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.key, "weight");
        assert_eq!(updated.max, Some(400.0));
        assert!(updated.required);
        assert_eq!(updated.position, 2);
    }

    #[tokio::test]
    async fn number_field_becomes_text_in_place() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;
        let weight = t.fields[2].id;
        update_field(
            &pool,
            t.id,
            weight,
            FormFieldUpdate {
                min: Some(Some(0.0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (updated, t) = update_field(
            &pool,
            t.id,
            weight,
            FormFieldUpdate {
                kind: Some(FieldKind::Text),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.id, weight);
        assert_eq!(updated.kind, FieldKind::Text);
        assert_eq!(updated.min, None);
        assert_eq!(updated.position, 2);
        assert_eq!(t.version, 3);
    }

    #[tokio::test]
    async fn duplicate_copies_fields() {
        let pool = test_support::pool().await;
        let t = intake(&pool).await;
        add_field(
            &pool,
            t.id,
            FormFieldCreate {
                field: field("notes", FieldKind::Textarea),
                position: None,
            },
        )
        .await
        .unwrap();

        let copy = duplicate(&pool, t.id, FormDuplicate { name: None }, 2).await.unwrap();
        assert_eq!(copy.name, "Intake (copy)");
        assert_eq!(copy.version, 1);
        assert_eq!(keys(&copy), ["name", "smoker", "weight", "notes"]);
        assert!(copy.fields.iter().all(|f| f.template_id == copy.id));

        let err = duplicate(&pool, t.id, FormDuplicate { name: Some("intake".into()) }, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn submissions_pin_version_and_block_delete() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let t = intake(&pool).await;

        let answers = json!({"name": "Ada", "smoker": "no", "weight": 61.5});
        let sub = insert_submission(
            &pool,
            &t,
            SubmissionCreate {
                patient_id: Some(ada.id),
                answers: answers.as_object().cloned().unwrap(),
            },
            4,
        )
        .await
        .unwrap();
        assert_eq!(sub.template_version, 1);
        assert_eq!(sub.answers["smoker"], "no");

        let page = list_submissions(
            &pool,
            &ListQuery::default(),
            &SubmissionFilter {
                template_id: None,
                patient_id: Some(ada.id),
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);

        let err = delete(&pool, t.id).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::FormHasSubmissions, _)));

        let empty = create(
            &pool,
            FormTemplateCreate {
                name: "Empty".into(),
                description: None,
                fields: vec![],
            },
            1,
        )
        .await
        .unwrap();
        delete(&pool, empty.id).await.unwrap();
    }
}
