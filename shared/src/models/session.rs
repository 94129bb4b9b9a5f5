//! Scheduled Session Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Longest bookable session (12 hours, ms)
pub const MAX_SESSION_MS: i64 = 12 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Completed)
                | (Self::Scheduled, Self::Cancelled)
                | (Self::Scheduled, Self::NoShow)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

/// Appointment between a patient and a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Session {
    pub id: i64,
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: Option<i64>,
    /// Unix millis
    pub starts_at: i64,
    /// Unix millis, exclusive
    pub ends_at: i64,
    pub status: SessionStatus,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionCreate {
    pub patient_id: i64,
    pub provider_id: i64,
    pub service_id: Option<i64>,
    pub starts_at: i64,
    /// Defaults to `starts_at` + service duration
    pub ends_at: Option<i64>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Update / reschedule (scheduled sessions only)
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SessionUpdate {
    pub provider_id: Option<i64>,
    pub service_id: Option<i64>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusUpdate {
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub provider_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub status: Option<SessionStatus>,
    /// Sessions ending after this instant (ms)
    pub from: Option<i64>,
    /// Sessions starting before this instant (ms)
    pub to: Option<i64>,
}

/// Check the time window of a session
pub fn check_session_window(starts_at: i64, ends_at: i64) -> Result<(), String> {
    if ends_at <= starts_at {
        return Err("ends_at must be after starts_at".into());
    }
    match ends_at.checked_sub(starts_at) {
        Some(length) if length <= MAX_SESSION_MS => {}
        _ => return Err("session cannot be longer than 12 hours".into()),
    }
    Ok(())
}

/// Half-open intervals `[a_start, a_end)` and `[b_start, b_end)` overlap
pub fn overlaps(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 60 * 60 * 1000;

    #[test]
    fn window_rules() {
        assert!(check_session_window(0, HOUR).is_ok());
        assert!(check_session_window(0, 12 * HOUR).is_ok());
        assert!(check_session_window(0, 12 * HOUR + 1).is_err());
        assert!(check_session_window(HOUR, HOUR).is_err());
        assert!(check_session_window(HOUR, 0).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        assert!(check_session_window(i64::MIN, i64::MAX).is_err());
        assert!(check_session_window(i64::MIN, 0).is_err());
        assert!(check_session_window(i64::MAX - HOUR, i64::MAX).is_ok());
    }

    #[test]
    fn back_to_back_sessions_do_not_overlap() {
        assert!(!overlaps(0, HOUR, HOUR, 2 * HOUR));
        assert!(!overlaps(HOUR, 2 * HOUR, 0, HOUR));
        assert!(overlaps(0, HOUR, HOUR - 1, 2 * HOUR));
        assert!(overlaps(0, 3 * HOUR, HOUR, 2 * HOUR));
    }

    #[test]
    fn only_scheduled_moves() {
        use SessionStatus::*;
        assert!(Scheduled.can_transition_to(NoShow));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!Scheduled.can_transition_to(Scheduled));
    }
}
