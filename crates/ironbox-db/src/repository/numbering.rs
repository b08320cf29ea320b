//! # Numbering Service
//!
//! Human-legible identifiers derived from what is already stored.
//!
//! ```text
//! sale number     YYYYMMDD-NNNN      20261019-0007   (sequence per day)
//! customer code   CYYYYMMNNNN        C2026100012     (sequence per month)
//! refund number   RF-<original>      RF-20261019-0007
//!                 RF-<original>-N    RF-20261019-0007-2 (second refund, ...)
//! ```
//!
//! Every function takes the caller's open transaction. The MAX() read and the
//! insert that uses its result must share that transaction; otherwise two
//! commits can read the same maximum. If they still collide, the UNIQUE
//! constraint rejects the second insert and the caller re-runs the whole
//! transaction (`DbError::is_retryable`). A duplicate is never written.

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::debug;

use ironbox_core::REFUND_PREFIX;

use crate::error::DbResult;

/// Formats a sale number from its day and sequence.
pub fn format_sale_number(day: NaiveDate, seq: i64) -> String {
    format!("{}-{:04}", day.format("%Y%m%d"), seq)
}

/// Formats a customer code from any day of its month and a sequence.
pub fn format_customer_code(month: NaiveDate, seq: i64) -> String {
    format!("C{}{:04}", month.format("%Y%m"), seq)
}

/// Next sale number for `day`: one past the highest sequence issued that day.
pub async fn next_sale_number(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<String> {
    let prefix = format!("{}-", day.format("%Y%m%d"));

    // "YYYYMMDD-" is 9 characters; the sequence starts at position 10.
    let max_seq: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(substr(sale_number, 10) AS INTEGER))
        FROM sales
        WHERE sale_number LIKE ?1 || '%'
        "#,
    )
    .bind(&prefix)
    .fetch_one(&mut *conn)
    .await?;

    let number = format_sale_number(day, max_seq.unwrap_or(0) + 1);
    debug!(sale_number = %number, "Reserved sale number");
    Ok(number)
}

/// Next customer code for the month containing `month`.
pub async fn next_customer_code(
    conn: &mut SqliteConnection,
    month: NaiveDate,
) -> DbResult<String> {
    let prefix = format!("C{}", month.format("%Y%m"));

    // "CYYYYMM" is 7 characters; the sequence starts at position 8.
    let max_seq: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(substr(customer_code, 8) AS INTEGER))
        FROM clients
        WHERE customer_code LIKE ?1 || '%'
        "#,
    )
    .bind(&prefix)
    .fetch_one(&mut *conn)
    .await?;

    let code = format_customer_code(month, max_seq.unwrap_or(0) + 1);
    debug!(customer_code = %code, "Reserved customer code");
    Ok(code)
}

/// Number for the next refund of `original_sale_id`.
///
/// The first refund is `RF-<original>`; later partial refunds of the same
/// sale get `-2`, `-3`, ... so the UNIQUE constraint still holds.
pub async fn next_refund_number(
    conn: &mut SqliteConnection,
    original_sale_id: &str,
    original_number: &str,
) -> DbResult<String> {
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE refund_of_sale_id = ?1")
            .bind(original_sale_id)
            .fetch_one(&mut *conn)
            .await?;

    let number = if existing == 0 {
        format!("{}{}", REFUND_PREFIX, original_number)
    } else {
        format!("{}{}-{}", REFUND_PREFIX, original_number, existing + 1)
    };
    debug!(sale_number = %number, "Reserved refund number");
    Ok(number)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn insert_sale_number(conn: &mut SqliteConnection, number: &str) {
        sqlx::query(
            r#"
            INSERT INTO sales (id, sale_number, actor_id, subtotal_cents, tax_cents,
                discount_cents, total_cents, payment_method, payment_status, created_at)
            VALUES (?1, ?2, 'cashier', 0, 0, 0, 0, 'cash', 'pending', '2026-10-19T10:00:00+00:00')
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(number)
        .execute(conn)
        .await
        .unwrap();
    }

    #[test]
    fn test_formats() {
        assert_eq!(format_sale_number(day(2026, 10, 19), 7), "20261019-0007");
        assert_eq!(format_sale_number(day(2026, 10, 19), 12345), "20261019-12345");
        assert_eq!(format_customer_code(day(2026, 10, 19), 12), "C2026100012");
    }

    #[tokio::test]
    async fn test_sale_numbers_scoped_per_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let today = day(2026, 10, 19);

        assert_eq!(next_sale_number(&mut conn, today).await.unwrap(), "20261019-0001");

        insert_sale_number(&mut conn, "20261019-0001").await;
        insert_sale_number(&mut conn, "20261019-0002").await;
        insert_sale_number(&mut conn, "20261018-0041").await;
        insert_sale_number(&mut conn, "RF-20261019-0001").await;

        assert_eq!(next_sale_number(&mut conn, today).await.unwrap(), "20261019-0003");
        assert_eq!(
            next_sale_number(&mut conn, day(2026, 10, 18)).await.unwrap(),
            "20261018-0042"
        );
        assert_eq!(
            next_sale_number(&mut conn, day(2026, 10, 20)).await.unwrap(),
            "20261020-0001"
        );
    }

    #[tokio::test]
    async fn test_customer_codes_scoped_per_month() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO clients (id, customer_code, first_name, last_name, created_at)
            VALUES ('c1', 'C2026100009', 'Ana', 'Silva', '2026-10-01T09:00:00+00:00')
            "#,
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        assert_eq!(
            next_customer_code(&mut conn, day(2026, 10, 31)).await.unwrap(),
            "C2026100010"
        );
        assert_eq!(
            next_customer_code(&mut conn, day(2026, 11, 1)).await.unwrap(),
            "C2026110001"
        );
    }
}
