//! # Sale Repository
//!
//! Sale headers, lines and payments.
//!
//! ## Write Path
//! Writes take the caller's connection so the Sale Transaction Manager can
//! run the whole commit in one transaction:
//! ```text
//! BEGIN
//!   insert_sale ─► insert_item × N ─► (Stock Ledger) ─► insert_payment
//! COMMIT
//! ```
//!
//! ## Derived Amounts
//! `amount_paid_cents` is the sum of the sale's payments and
//! `amount_due_cents` is `total - paid`. Both are computed in the SELECT,
//! never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use ironbox_core::{Payment, PaymentStatus, RefundState, Sale, SaleItem};

use crate::error::{DbError, DbResult};

const SALE_SELECT: &str = r#"
    SELECT
        s.id, s.sale_number, s.client_id, s.actor_id,
        s.subtotal_cents, s.tax_cents, s.discount_cents, s.total_cents,
        s.payment_method, s.payment_status,
        COALESCE((SELECT SUM(p.amount_cents) FROM payments p WHERE p.sale_id = s.id), 0)
            AS amount_paid_cents,
        s.total_cents
            - COALESCE((SELECT SUM(p.amount_cents) FROM payments p WHERE p.sale_id = s.id), 0)
            AS amount_due_cents,
        s.notes, s.refund_of_sale_id, s.created_at
    FROM sales s
"#;

const ITEM_COLUMNS: &str = r#"
    id, sale_id, product_id, sku_snapshot, name_snapshot, quantity,
    unit_price_cents, discount_cents, tax_rate_bps, line_total_cents,
    refund_of_item_id, created_at
"#;

const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// Filter for sale history queries. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaleFilter {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    /// Refund sales are left out unless this is set.
    #[serde(default)]
    pub include_refunds: bool,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_number, client_id, actor_id, subtotal_cents, tax_cents,
                discount_cents, total_cents, payment_method, payment_status,
                notes, refund_of_sale_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_number)
        .bind(&sale.client_id)
        .bind(&sale.actor_id)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.payment_status)
        .bind(&sale.notes)
        .bind(&sale.refund_of_sale_id)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &sale.sale_number),
            other => other,
        })?;

        debug!(id = %sale.id, sale_number = %sale.sale_number, "Sale row inserted");
        Ok(())
    }

    pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, sku_snapshot, name_snapshot, quantity,
                unit_price_cents, discount_cents, tax_rate_bps, line_total_cents,
                refund_of_item_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.discount_cents)
        .bind(item.tax_rate_bps)
        .bind(item.line_total_cents)
        .bind(&item.refund_of_item_id)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, sale_id, method, amount_cents, tendered_cents, change_cents,
                reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(payment.tendered_cents)
        .bind(payment.change_cents)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(sale_id = %payment.sale_id, amount = payment.amount_cents, "Payment recorded");
        Ok(())
    }

    /// The only update a committed sale ever receives.
    pub async fn set_payment_status(
        conn: &mut SqliteConnection,
        sale_id: &str,
        status: PaymentStatus,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE sales SET payment_status = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(status)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{SALE_SELECT} WHERE s.id = ?1");

        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }

    pub async fn items_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY rowid");

        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(items)
    }

    /// Units already refunded per original line of `sale_id`, keyed by item id.
    pub async fn refunded_quantities(
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT r.refund_of_item_id, -SUM(r.quantity)
            FROM sale_items r
            JOIN sale_items o ON o.id = r.refund_of_item_id
            WHERE o.sale_id = ?1
            GROUP BY r.refund_of_item_id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Sale> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    pub async fn get_by_number(&self, sale_number: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{SALE_SELECT} WHERE s.sale_number = ?1");

        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(sale_number.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::items_in(&mut conn, sale_id).await
    }

    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, sale_id, method, amount_cents, tendered_cents, change_cents,
                   reference, created_at
            FROM payments
            WHERE sale_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Refund sales issued against `sale_id`, oldest first.
    pub async fn refunds_of(&self, sale_id: &str) -> DbResult<Vec<Sale>> {
        let sql = format!("{SALE_SELECT} WHERE s.refund_of_sale_id = ?1 ORDER BY s.created_at, s.rowid");

        let refunds = sqlx::query_as::<_, Sale>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(refunds)
    }

    /// How much of an original sale has been refunded so far.
    pub async fn refund_state(&self, sale_id: &str) -> DbResult<RefundState> {
        let (sold, refunded): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE((SELECT SUM(quantity) FROM sale_items WHERE sale_id = ?1), 0),
                COALESCE((
                    SELECT -SUM(r.quantity)
                    FROM sale_items r
                    JOIN sale_items o ON o.id = r.refund_of_item_id
                    WHERE o.sale_id = ?1
                ), 0)
            "#,
        )
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RefundState::from_quantities(sold, refunded))
    }

    /// Sales matching `filter`, newest first.
    pub async fn search(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let sql = format!(
            r#"
            {SALE_SELECT}
            WHERE (?1 IS NULL OR s.created_at >= ?1)
              AND (?2 IS NULL OR s.created_at <= ?2)
              AND (?3 IS NULL OR s.client_id = ?3)
              AND (?4 IS NULL OR s.actor_id = ?4)
              AND (?5 IS NULL OR s.payment_status = ?5)
              AND (?6 = 1 OR s.refund_of_sale_id IS NULL)
            ORDER BY s.created_at DESC, s.rowid DESC
            LIMIT ?7
            "#
        );

        let limit = i64::from(filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));

        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(filter.from)
            .bind(filter.to)
            .bind(&filter.client_id)
            .bind(&filter.actor_id)
            .bind(filter.payment_status)
            .bind(filter.include_refunds)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = sales.len(), "Sale search");
        Ok(sales)
    }
}
