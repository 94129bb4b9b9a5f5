//! Ticket Repository
//!
//! `last_message_at` and `message_count` are maintained on the ticket row
//! whenever a message is posted.

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult, patient, staff_user};
use shared::ErrorCode;
use shared::models::{
    MessageCreate, Ticket, TicketCreate, TicketDetail, TicketFilter, TicketMessage, TicketStatus,
    TicketUpdate,
};
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::{Sqlite, SqlitePool, Transaction};

const COLUMNS: &str = "id, subject, patient_id, status, priority, created_by, assignee_id, \
                       last_message_at, message_count, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, ticket_id, author_id, author_name, body, is_internal, created_at";

const LIST: ListSpec = ListSpec {
    table: "ticket",
    columns: COLUMNS,
    search_columns: &["subject"],
    sort_columns: &[
        ("last_message_at", "last_message_at"),
        ("created_at", "created_at"),
        ("subject", "subject COLLATE NOCASE"),
        ("status", "status"),
        (
            "priority",
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 ELSE 3 END",
        ),
    ],
    default_sort: "last_message_at",
    default_order: SortOrder::Desc,
};

/// Message author
#[derive(Debug, Clone, Copy)]
pub struct Author<'a> {
    pub id: i64,
    pub name: &'a str,
}

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &TicketFilter,
) -> RepoResult<Page<Ticket>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("assignee_id", filter.assignee_id)
        .eq("patient_id", filter.patient_id);
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Ticket>> {
    let sql = format!("SELECT {COLUMNS} FROM ticket WHERE id = ?");
    let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(ticket)
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<Ticket> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Ticket {id} not found")))
}

/// Ticket with its thread, oldest message first
pub async fn find_detail(pool: &SqlitePool, id: i64) -> RepoResult<Option<TicketDetail>> {
    let Some(ticket) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let messages = messages_for(pool, id).await?;
    Ok(Some(TicketDetail { ticket, messages }))
}

pub async fn messages_for(pool: &SqlitePool, ticket_id: i64) -> RepoResult<Vec<TicketMessage>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM ticket_message WHERE ticket_id = ? ORDER BY created_at, id"
    );
    let messages = sqlx::query_as::<_, TicketMessage>(&sql)
        .bind(ticket_id)
        .fetch_all(pool)
        .await?;
    Ok(messages)
}

/// Tickets not yet resolved or closed
pub async fn count_open(pool: &SqlitePool) -> RepoResult<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM ticket WHERE status IN ('open', 'pending')",
    )
    .fetch_one(pool)
    .await?;
    Ok(n)
}

async fn check_links(
    pool: &SqlitePool,
    assignee_id: Option<i64>,
    patient_id: Option<i64>,
) -> RepoResult<()> {
    if let Some(uid) = assignee_id
        && staff_user::find_by_id(pool, uid).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::UserNotFound,
            format!("User {uid} not found"),
        ));
    }
    if let Some(pid) = patient_id
        && patient::find_by_id(pool, pid).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::PatientNotFound,
            format!("Patient {pid} not found"),
        ));
    }
    Ok(())
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    ticket_id: i64,
    author: Author<'_>,
    body: &str,
    is_internal: bool,
    now: i64,
) -> RepoResult<i64> {
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO ticket_message (id, ticket_id, author_id, author_name, body, is_internal, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(ticket_id)
    .bind(author.id)
    .bind(author.name)
    .bind(body)
    .bind(is_internal)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// Open a ticket with its first message
pub async fn create(
    pool: &SqlitePool,
    data: TicketCreate,
    author: Author<'_>,
) -> RepoResult<TicketDetail> {
    check_links(pool, data.assignee_id, data.patient_id).await?;
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO ticket (id, subject, patient_id, status, priority, created_by, assignee_id, \
         last_message_at, message_count, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6, ?7, 1, ?7, ?7)",
    )
    .bind(id)
    .bind(data.subject.trim())
    .bind(data.patient_id)
    .bind(data.priority.unwrap_or_default())
    .bind(author.id)
    .bind(data.assignee_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    insert_message(&mut tx, id, author, &data.body, false, now).await?;
    tx.commit().await?;
    find_detail(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create ticket".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: TicketUpdate) -> RepoResult<Ticket> {
    check_links(pool, data.assignee_id, None).await?;
    let rows = sqlx::query(
        "UPDATE ticket SET subject = COALESCE(?1, subject), priority = COALESCE(?2, priority), \
         assignee_id = COALESCE(?3, assignee_id), status = COALESCE(?4, status), updated_at = ?5 \
         WHERE id = ?6",
    )
    .bind(data.subject.as_deref().map(str::trim))
    .bind(data.priority)
    .bind(data.assignee_id)
    .bind(data.status)
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Ticket {id} not found")));
    }
    require(pool, id).await
}

/// Append to the thread. Closed tickets refuse; resolved ones re-open.
pub async fn post_message(
    pool: &SqlitePool,
    id: i64,
    data: MessageCreate,
    author: Author<'_>,
) -> RepoResult<(TicketMessage, Ticket)> {
    let current = require(pool, id).await?;
    let Some(next) = current.status.after_message() else {
        return Err(RepoError::Business(
            ErrorCode::TicketClosed,
            format!("Ticket {id} is closed"),
        ));
    };
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE ticket SET status = ?, last_message_at = ?, message_count = message_count + 1, \
         updated_at = ? WHERE id = ? AND status != 'closed'",
    )
    .bind(next)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Business(
            ErrorCode::TicketClosed,
            format!("Ticket {id} is closed"),
        ));
    }
    let message_id = insert_message(&mut tx, id, author, &data.body, data.is_internal, now).await?;
    tx.commit().await?;

    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM ticket_message WHERE id = ?");
    let message = sqlx::query_as::<_, TicketMessage>(&sql)
        .bind(message_id)
        .fetch_one(pool)
        .await?;
    Ok((message, require(pool, id).await?))
}

/// Delete a ticket and its thread
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM ticket WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    const ME: Author<'static> = Author {
        id: 5,
        name: "Front Desk",
    };

    fn ticket(subject: &str) -> TicketCreate {
        TicketCreate {
            subject: subject.into(),
            patient_id: None,
            priority: None,
            assignee_id: None,
            body: "Patient called about results".into(),
        }
    }

    fn message(body: &str) -> MessageCreate {
        MessageCreate {
            body: body.into(),
            is_internal: false,
        }
    }

    #[tokio::test]
    async fn create_starts_thread() {
        let pool = test_support::pool().await;
        let detail = create(&pool, ticket("Lab results"), ME).await.unwrap();
        assert_eq!(detail.ticket.status, TicketStatus::Open);
        assert_eq!(detail.ticket.message_count, 1);
        assert_eq!(detail.ticket.created_by, ME.id);
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].author_name, "Front Desk");
    }

    #[tokio::test]
    async fn messages_reopen_resolved_and_bounce_off_closed() {
        let pool = test_support::pool().await;
        let id = create(&pool, ticket("Refill"), ME).await.unwrap().ticket.id;

        update(
            &pool,
            id,
            TicketUpdate {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let (msg, t) = post_message(&pool, id, message("Still out of pills"), ME)
            .await
            .unwrap();
        assert_eq!(msg.body, "Still out of pills");
        assert_eq!(t.status, TicketStatus::Open);
        assert_eq!(t.message_count, 2);
        assert_eq!(t.last_message_at, msg.created_at);

        update(
            &pool,
            id,
            TicketUpdate {
                status: Some(TicketStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let err = post_message(&pool, id, message("hello?"), ME).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::TicketClosed, _)));
        assert_eq!(messages_for(&pool, id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filters_and_open_count() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        create(
            &pool,
            TicketCreate {
                patient_id: Some(ada.id),
                ..ticket("About Ada")
            },
            ME,
        )
        .await
        .unwrap();
        let other = create(&pool, ticket("Other"), ME).await.unwrap();
        update(
            &pool,
            other.ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = list(
            &pool,
            &ListQuery::default(),
            &TicketFilter {
                patient_id: Some(ada.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].subject, "About Ada");
        assert_eq!(count_open(&pool).await.unwrap(), 1);

        assert!(delete(&pool, other.ticket.id).await.unwrap());
        assert!(messages_for(&pool, other.ticket.id).await.unwrap().is_empty());
    }
}
