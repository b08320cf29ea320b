//! # Stock Ledger
//!
//! The only component allowed to change a product's on-hand quantity.
//!
//! ## One Call, Two Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StockLedger::apply(conn, adjustment)                                   │
//! │                                                                         │
//! │   1. UPDATE products                                                    │
//! │        SET quantity = quantity + delta                                  │
//! │      WHERE id = ? AND quantity + delta >= 0      ← check and write in   │
//! │      RETURNING quantity                            one statement        │
//! │                                                                         │
//! │   2. INSERT INTO stock_movements (...)           ← exactly one row      │
//! │                                                                         │
//! │   Both run on the caller's transaction. A crash between them rolls     │
//! │   both back.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconciliation Invariant
//! `opening_stock + Σ quantity_delta == quantity` for every product, always.
//! [`StockLedger::reconcile`] checks it from storage alone.

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ironbox_core::{MovementType, Product, ReferenceType, StockMovement, ValidationError};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::product::PRODUCT_COLUMNS;

// =============================================================================
// Adjustment Request
// =============================================================================

/// One requested stock change.
///
/// ## Example
/// ```rust,ignore
/// let adj = StockAdjustment::sale(&product.id, 2, &sale.id).actor(Some("cashier-1".into()));
/// let on_hand = StockLedger::apply(&mut tx, &adj).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: String,
    /// Signed change. `In` must be positive, `Out` negative.
    pub delta: i64,
    pub movement_type: MovementType,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub actor_id: Option<String>,
}

impl StockAdjustment {
    pub fn new(
        product_id: impl Into<String>,
        delta: i64,
        movement_type: MovementType,
        reference_type: ReferenceType,
    ) -> Self {
        StockAdjustment {
            product_id: product_id.into(),
            delta,
            movement_type,
            reference_type,
            reference_id: None,
            notes: None,
            actor_id: None,
        }
    }

    /// `out` / `sale` movement of `-quantity`.
    pub fn sale(product_id: impl Into<String>, quantity: i64, sale_id: impl Into<String>) -> Self {
        Self::new(product_id, -quantity, MovementType::Out, ReferenceType::Sale)
            .reference(sale_id)
    }

    /// `in` / `refund` movement of `+quantity`, referencing the original sale.
    pub fn refund(
        product_id: impl Into<String>,
        quantity: i64,
        original_sale_id: impl Into<String>,
    ) -> Self {
        Self::new(product_id, quantity, MovementType::In, ReferenceType::Refund)
            .reference(original_sale_id)
    }

    /// `in` / `purchase` movement for received goods.
    pub fn purchase(product_id: impl Into<String>, quantity: i64) -> Self {
        Self::new(product_id, quantity, MovementType::In, ReferenceType::Purchase)
    }

    /// `adjustment` / `adjustment` movement of either sign.
    pub fn correction(product_id: impl Into<String>, delta: i64) -> Self {
        Self::new(
            product_id,
            delta,
            MovementType::Adjustment,
            ReferenceType::Adjustment,
        )
    }

    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn actor(mut self, actor_id: Option<String>) -> Self {
        self.actor_id = actor_id;
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self.movement_type {
            MovementType::In if self.delta <= 0 => Err(ValidationError::MustBePositive {
                field: "quantity_delta".to_string(),
            }),
            MovementType::Out if self.delta >= 0 => Err(ValidationError::InvalidFormat {
                field: "quantity_delta".to_string(),
                reason: "out movements must be negative".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Result of checking one product against its movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub product_id: String,
    pub sku: String,
    pub opening_stock: i64,
    pub movement_total: i64,
    pub on_hand: i64,
    pub balanced: bool,
}

#[derive(Debug, FromRow)]
struct ReconciliationRow {
    id: String,
    sku: String,
    opening_stock: i64,
    movement_total: i64,
    quantity: i64,
}

impl From<ReconciliationRow> for Reconciliation {
    fn from(row: ReconciliationRow) -> Self {
        Reconciliation {
            balanced: row.opening_stock + row.movement_total == row.quantity,
            product_id: row.id,
            sku: row.sku,
            opening_stock: row.opening_stock,
            movement_total: row.movement_total,
            on_hand: row.quantity,
        }
    }
}

const RECONCILE_SELECT: &str = r#"
    SELECT
        p.id,
        p.sku,
        p.opening_stock,
        COALESCE((SELECT SUM(m.quantity_delta) FROM stock_movements m WHERE m.product_id = p.id), 0)
            AS movement_total,
        p.quantity
    FROM products p
"#;

const MOVEMENTS_QUERY: &str = r#"
    SELECT id, product_id, movement_type, quantity_delta, reference_type,
           reference_id, notes, actor_id, created_at
    FROM stock_movements
    WHERE (?1 IS NULL OR product_id = ?1)
      AND (?2 IS NULL OR created_at >= ?2)
    ORDER BY created_at DESC, rowid DESC
    LIMIT ?3
"#;

// =============================================================================
// Stock Ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Applies one adjustment on the caller's connection and returns the new
    /// on-hand quantity.
    ///
    /// ## Errors
    /// - `InsufficientStock` for `in`/`out` movements that would go below zero
    /// - `NegativeStock` for adjustments that would go below zero
    /// - `NotFound` for an unknown product
    ///
    /// Nothing is written when an error is returned.
    pub async fn apply(conn: &mut SqliteConnection, adj: &StockAdjustment) -> DbResult<i64> {
        adj.validate()?;

        let now = Utc::now();

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET quantity = quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND quantity + ?2 >= 0
            RETURNING quantity
            "#,
        )
        .bind(&adj.product_id)
        .bind(adj.delta)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let new_quantity = match updated {
            Some(quantity) => quantity,
            None => return Err(Self::refusal(conn, adj).await),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, movement_type, quantity_delta, reference_type,
                reference_id, notes, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&adj.product_id)
        .bind(adj.movement_type)
        .bind(adj.delta)
        .bind(adj.reference_type)
        .bind(&adj.reference_id)
        .bind(&adj.notes)
        .bind(&adj.actor_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(
            product_id = %adj.product_id,
            delta = adj.delta,
            movement_type = adj.movement_type.as_str(),
            new_quantity,
            "Stock movement recorded"
        );

        Ok(new_quantity)
    }

    /// Works out why the conditional update matched no row.
    async fn refusal(conn: &mut SqliteConnection, adj: &StockAdjustment) -> DbError {
        let current: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
                .bind(&adj.product_id)
                .fetch_optional(&mut *conn)
                .await;

        match current {
            Err(e) => e.into(),
            Ok(None) => DbError::not_found("Product", &adj.product_id),
            Ok(Some(on_hand)) if adj.movement_type == MovementType::Adjustment => {
                DbError::NegativeStock {
                    product_id: adj.product_id.clone(),
                    on_hand,
                    delta: adj.delta,
                }
            }
            Ok(Some(available)) => DbError::InsufficientStock {
                product_id: adj.product_id.clone(),
                available,
                requested: -adj.delta,
            },
        }
    }

    /// Applies one adjustment in its own transaction.
    pub async fn adjust(&self, adj: &StockAdjustment) -> DbResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        let quantity = Self::apply(&mut tx, adj).await?;
        tx.commit().await?;

        info!(
            product_id = %adj.product_id,
            delta = adj.delta,
            quantity,
            "Stock adjusted"
        );
        Ok(quantity)
    }

    /// Records received goods as an `in` / `purchase` movement.
    pub async fn receive(
        &self,
        product_id: &str,
        quantity: i64,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> DbResult<i64> {
        let adj = StockAdjustment::purchase(product_id, quantity)
            .notes(notes)
            .actor(actor_id);
        self.adjust(&adj).await
    }

    /// Sets on-hand quantity to `target` through an adjustment of
    /// `target - current`. The read and the write share one transaction.
    pub async fn set_quantity(
        &self,
        product_id: &str,
        target: i64,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> DbResult<i64> {
        if target < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "quantity".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;

        let current: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = current.ok_or_else(|| DbError::not_found("Product", product_id))?;

        let adj = StockAdjustment::correction(product_id, target - current)
            .notes(notes)
            .actor(actor_id);
        let quantity = Self::apply(&mut tx, &adj).await?;
        tx.commit().await?;

        info!(product_id = %product_id, from = current, to = quantity, "Stock quantity set");
        Ok(quantity)
    }

    /// Movement history, newest first, fetched lazily.
    ///
    /// `product_id = None` covers every product; `limit = None` streams every
    /// matching row.
    pub fn movements_for(
        &self,
        product_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> BoxStream<'_, DbResult<StockMovement>> {
        let limit = limit.map(i64::from).unwrap_or(-1);

        sqlx::query_as::<_, StockMovement>(MOVEMENTS_QUERY)
            .bind(product_id.map(str::to_owned))
            .bind(since)
            .bind(limit)
            .fetch(&self.pool)
            .map_err(DbError::from)
            .boxed()
    }

    /// Collected form of [`movements_for`](Self::movements_for).
    pub async fn movements(
        &self,
        product_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> DbResult<Vec<StockMovement>> {
        self.movements_for(product_id, since, limit)
            .try_collect()
            .await
    }

    /// Active products at or below their minimum stock level, most depleted
    /// first.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE is_active = 1 AND quantity <= min_stock_level
            ORDER BY (quantity - min_stock_level) ASC, name ASC
            "#
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Low stock products");
        Ok(products)
    }

    pub async fn reconcile(&self, product_id: &str) -> DbResult<Reconciliation> {
        let sql = format!("{RECONCILE_SELECT} WHERE p.id = ?1");

        let row = sqlx::query_as::<_, ReconciliationRow>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        Ok(row.into())
    }

    /// Reconciles every product, ordered by SKU.
    pub async fn reconcile_all(&self) -> DbResult<Vec<Reconciliation>> {
        let sql = format!("{RECONCILE_SELECT} ORDER BY p.sku");

        let rows = sqlx::query_as::<_, ReconciliationRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Reconciliation::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
