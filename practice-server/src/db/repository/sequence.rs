//! Human-readable document numbers
//!
//! Counters live in `number_sequence`, one row per scope (`order:20240315`,
//! `invoice:202403`). The upsert is a single statement, so concurrent
//! writers never hand out the same value.

use super::RepoResult;
use chrono::NaiveDate;
use sqlx::{Sqlite, SqliteExecutor};

/// Increment and return the counter for `scope` (first value is 1)
pub async fn next_value<'e, E>(executor: E, scope: &str) -> RepoResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let value: i64 = sqlx::query_scalar::<Sqlite, i64>(
        "INSERT INTO number_sequence (scope, value) VALUES (?, 1) \
         ON CONFLICT(scope) DO UPDATE SET value = value + 1 RETURNING value",
    )
    .bind(scope)
    .fetch_one(executor)
    .await?;
    Ok(value)
}

/// `ORD-YYYYMMDD-NNNN`, numbered per day
pub async fn next_order_number<'e, E>(executor: E, on: NaiveDate) -> RepoResult<String>
where
    E: SqliteExecutor<'e>,
{
    let day = on.format("%Y%m%d").to_string();
    let n = next_value(executor, &format!("order:{day}")).await?;
    Ok(format!("ORD-{day}-{n:04}"))
}

/// `INV-YYYYMM-NNNN`, numbered per month
pub async fn next_invoice_number<'e, E>(executor: E, on: NaiveDate) -> RepoResult<String>
where
    E: SqliteExecutor<'e>,
{
    let month = on.format("%Y%m").to_string();
    let n = next_value(executor, &format!("invoice:{month}")).await?;
    Ok(format!("INV-{month}-{n:04}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;

    #[tokio::test]
    async fn numbers_are_scoped_and_sequential() {
        let pool = test_support::pool().await;
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        assert_eq!(next_order_number(&pool, d1).await.unwrap(), "ORD-20240315-0001");
        assert_eq!(next_order_number(&pool, d1).await.unwrap(), "ORD-20240315-0002");
        assert_eq!(next_order_number(&pool, d2).await.unwrap(), "ORD-20240316-0001");

        assert_eq!(next_invoice_number(&pool, d1).await.unwrap(), "INV-202403-0001");
        assert_eq!(next_invoice_number(&pool, d2).await.unwrap(), "INV-202403-0002");
    }
}
