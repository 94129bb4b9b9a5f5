//! Ticket Model (internal messaging)

use super::task::Priority;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Status after a new message; `None` when posting is refused
    pub fn after_message(&self) -> Option<TicketStatus> {
        match self {
            Self::Closed => None,
            Self::Resolved => Some(Self::Open),
            other => Some(*other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Ticket {
    pub id: i64,
    pub subject: String,
    pub patient_id: Option<i64>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub created_by: i64,
    pub assignee_id: Option<i64>,
    pub last_message_at: i64,
    pub message_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub body: String,
    /// Staff-only note
    pub is_internal: bool,
    pub created_at: i64,
}

/// Ticket with its message thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TicketCreate {
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    pub patient_id: Option<i64>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<i64>,
    /// First message
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TicketUpdate {
    #[validate(length(min = 1, max = 200))]
    pub subject: Option<String>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<i64>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MessageCreate {
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub assignee_id: Option<i64>,
    pub patient_id: Option<i64>,
}
