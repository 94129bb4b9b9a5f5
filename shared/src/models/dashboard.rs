//! Dashboard summary

use serde::{Deserialize, Serialize};

/// Front-page counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardSummary {
    pub active_patients: i64,
    pub sessions_today: i64,
    pub open_tasks: i64,
    pub overdue_tasks: i64,
    pub open_tickets: i64,
    /// Sum of balances on issued invoices
    pub outstanding_balance: f64,
}
