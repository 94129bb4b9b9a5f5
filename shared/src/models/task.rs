//! Task Model

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

/// Priority shared by tasks and tickets
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    /// YYYY-MM-DD
    pub due_date: Option<String>,
    pub assignee_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub created_by: i64,
    /// Set while status is `done`
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// `completed_at` after moving from the current status to `next`
    pub fn completed_at_after(&self, next: TaskStatus, now: i64) -> Option<i64> {
        match (self.status, next) {
            (TaskStatus::Done, TaskStatus::Done) => self.completed_at,
            (_, TaskStatus::Done) => Some(now),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaskCreate {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub assignee_id: Option<i64>,
    pub patient_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TaskUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub assignee_id: Option<i64>,
    pub patient_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub patient_id: Option<i64>,
    /// Not done and due before today
    pub overdue: Option<bool>,
    /// Assigned to the caller
    pub mine: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: TaskStatus, completed_at: Option<i64>) -> Task {
        Task {
            id: 1,
            title: "Call back".into(),
            description: None,
            status,
            priority: Priority::Medium,
            due_date: None,
            assignee_id: None,
            patient_id: None,
            created_by: 1,
            completed_at,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn completion_timestamp() {
        assert_eq!(task(TaskStatus::Todo, None).completed_at_after(TaskStatus::Done, 50), Some(50));
        assert_eq!(
            task(TaskStatus::Done, Some(10)).completed_at_after(TaskStatus::Done, 50),
            Some(10)
        );
        assert_eq!(
            task(TaskStatus::Done, Some(10)).completed_at_after(TaskStatus::InProgress, 50),
            None
        );
    }

    #[test]
    fn priority_order() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Low < Priority::Medium);
    }
}
