//! Dashboard Repository

use super::{RepoResult, invoice, session, task, ticket};
use chrono::{Days, NaiveDate};
use shared::models::DashboardSummary;
use sqlx::SqlitePool;

/// `[start, end)` of a UTC day in millis
fn day_bounds(day: NaiveDate) -> (i64, i64) {
    let start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp_millis());
    let end = day
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc().timestamp_millis());
    match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => (0, 0),
    }
}

pub async fn summary(pool: &SqlitePool) -> RepoResult<DashboardSummary> {
    let active_patients =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM patient WHERE is_active = 1")
            .fetch_one(pool)
            .await?;
    let (from, to) = day_bounds(shared::util::today());
    let sessions_today = session::count_scheduled_between(pool, from, to).await?;
    let (open_tasks, overdue_tasks) = task::open_counts(pool).await?;

    Ok(DashboardSummary {
        active_patients,
        sessions_today,
        open_tasks,
        overdue_tasks,
        open_tickets: ticket::count_open(pool).await?,
        outstanding_balance: invoice::outstanding_balance(pool).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    #[test]
    fn day_bounds_span_one_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (start, end) = day_bounds(day);
        assert_eq!(end - start, 86_400_000);
        assert_eq!(start, 1_709_251_200_000);
    }

    #[tokio::test]
    async fn empty_practice() {
        let pool = test_support::pool().await;
        assert_eq!(summary(&pool).await.unwrap(), DashboardSummary::default());
    }

    #[tokio::test]
    async fn counts_active_patients() {
        let pool = test_support::pool().await;
        test_support::patient(&pool, "Ada", "Lovelace").await;
        let bob = test_support::patient(&pool, "Bob", "Stone").await;
        sqlx::query("UPDATE patient SET is_active = 0 WHERE id = ?")
            .bind(bob.id)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(summary(&pool).await.unwrap().active_patients, 1);
    }
}
