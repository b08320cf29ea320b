//! # Sale Transaction Manager
//!
//! Turns sale drafts into durable sales, and sales into refunds.
//!
//! ## Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  commit(draft_id, method, tendered, notes)                              │
//! │                                                                         │
//! │  DraftStore::begin_commit ── EmptySale? ──► error, draft unchanged      │
//! │       │ (draft now Committing)                                          │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE ───────────────────────────────────────────────────    │
//! │    next_sale_number(today)          ← same transaction as the insert    │
//! │    INSERT sales                                                         │
//! │    INSERT sale_items × N                                                │
//! │    StockLedger::apply(out, sale) × N ← conditional UPDATE per product   │
//! │    INSERT payments (tendered > 0)                                       │
//! │  COMMIT ────────────────────────────────────────────────────────────    │
//! │       │                                                                 │
//! │       ├── ok ─────────────► draft removed, CommitReceipt                │
//! │       ├── busy / dup no. ─► ROLLBACK, retry once, then Concurrency      │
//! │       └── other ──────────► ROLLBACK, draft back to Drafting,           │
//! │                              CommitFailed { cause }                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Refund
//! A refund is a new sale with negative amounts, negative lines pointing at
//! the original lines, `in` / `refund` stock movements referencing the
//! original sale, and one negative payment. The original sale is never
//! touched. Refundable quantity per line is what was sold minus what
//! earlier refunds already took back.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use ironbox_core::validation::{
    validate_non_negative, validate_payment_amount, validate_reason, validate_text,
};
use ironbox_core::{
    compute_totals, plan_refund, DraftView, LineInput, Money, Payment, PaymentMethod,
    PaymentStatus, Product, RefundLine, RefundState, RefundableLine, Sale, SaleDraft, SaleItem,
    StockMovement, TaxRate,
};
use ironbox_db::{
    next_refund_number, next_sale_number, Database, Reconciliation, SaleFilter, SaleRepository,
    StockAdjustment, StockLedger,
};

use crate::config::RegisterConfig;
use crate::drafts::DraftStore;
use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Receipts
// =============================================================================

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub sale_id: String,
    pub sale_number: String,
    pub total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    /// Cash handed back: `tendered - total` when positive.
    pub change: Money,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    pub refund_sale_id: String,
    pub sale_number: String,
    /// Negative.
    pub total: Money,
    /// State of the original sale after this refund.
    pub refund_state: RefundState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub amount_applied: Money,
    pub change: Money,
    pub amount_due: Money,
    pub payment_status: PaymentStatus,
}

/// A sale with everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetail {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<Payment>,
    /// Always `None` for refund sales.
    pub refund_state: RefundState,
    /// Refund sales issued against this sale, oldest first.
    pub refunds: Vec<Sale>,
}

// =============================================================================
// Manager
// =============================================================================

pub struct SaleTransactionManager {
    db: Database,
    drafts: DraftStore,
    tax_rate: TaxRate,
}

impl SaleTransactionManager {
    /// `tax_rate` is the configured rate used by the global-discount path.
    pub fn new(db: Database, tax_rate: TaxRate) -> Self {
        SaleTransactionManager {
            db,
            drafts: DraftStore::new(),
            tax_rate,
        }
    }

    pub fn from_config(db: Database, config: &RegisterConfig) -> Self {
        Self::new(db, config.tax_rate())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn open_drafts(&self) -> usize {
        self.drafts.len()
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Opens a draft for `actor_id`, optionally attributed to a client.
    pub async fn start_draft(
        &self,
        actor_id: &str,
        client_id: Option<&str>,
    ) -> LedgerResult<String> {
        validate_text("actor_id", actor_id, 100)?;

        if let Some(client_id) = client_id {
            if !self.db.clients().exists(client_id).await? {
                return Err(LedgerError::ClientNotFound(client_id.to_string()));
            }
        }

        let draft_id = Uuid::new_v4().to_string();
        self.drafts.insert(SaleDraft::new(
            draft_id.clone(),
            actor_id.trim(),
            client_id.map(str::to_string),
            self.tax_rate,
        ));

        info!(draft_id = %draft_id, actor_id = %actor_id, "Draft started");
        Ok(draft_id)
    }

    /// Adds a product by id. The product is read fresh; its price and tax
    /// rate are frozen into the line.
    pub async fn add_item(
        &self,
        draft_id: &str,
        product_id: &str,
        quantity: i64,
        unit_price: Option<Money>,
        discount: Option<Money>,
    ) -> LedgerResult<DraftView> {
        self.drafts.ensure_editable(draft_id)?;

        let product = self
            .db
            .products()
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))?;

        self.add_product(draft_id, &product, quantity, unit_price, discount)
    }

    /// Adds a product by scanned SKU or barcode at its catalog price.
    pub async fn add_item_by_code(
        &self,
        draft_id: &str,
        code: &str,
        quantity: i64,
    ) -> LedgerResult<DraftView> {
        self.drafts.ensure_editable(draft_id)?;

        let product = self
            .db
            .products()
            .find_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(code.to_string()))?;

        self.add_product(draft_id, &product, quantity, None, None)
    }

    fn add_product(
        &self,
        draft_id: &str,
        product: &Product,
        quantity: i64,
        unit_price: Option<Money>,
        discount: Option<Money>,
    ) -> LedgerResult<DraftView> {
        let ((), view) = self.drafts.update(draft_id, |draft| {
            draft.add_item(product, quantity, unit_price, discount)
        })?;

        if view.totals.clamped_lines > 0 {
            warn!(
                draft_id = %draft_id,
                clamped_lines = view.totals.clamped_lines,
                "Line total clamped at zero; discount exceeds unit price"
            );
        }
        Ok(view)
    }

    pub fn remove_item(
        &self,
        draft_id: &str,
        product_id: &str,
        quantity: Option<i64>,
    ) -> LedgerResult<DraftView> {
        let ((), view) = self
            .drafts
            .update(draft_id, |draft| draft.remove_item(product_id, quantity))?;
        Ok(view)
    }

    /// Sets the single global discount, replacing any earlier one.
    pub fn apply_discount(&self, draft_id: &str, amount: Money) -> LedgerResult<DraftView> {
        let ((), view) = self
            .drafts
            .update(draft_id, |draft| draft.apply_discount(amount))?;
        Ok(view)
    }

    pub fn draft_view(&self, draft_id: &str) -> LedgerResult<DraftView> {
        self.drafts.view(draft_id)
    }

    /// Discards a draft. No storage is touched.
    pub fn void_draft(&self, draft_id: &str, reason: &str) -> LedgerResult<()> {
        let draft = self.drafts.void(draft_id)?;
        info!(
            draft_id = %draft_id,
            lines = draft.lines().len(),
            reason = %reason,
            "Draft voided"
        );
        Ok(())
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commits a draft as one atomic sale.
    ///
    /// On failure nothing is persisted and the draft is editable again.
    pub async fn commit(
        &self,
        draft_id: &str,
        payment_method: PaymentMethod,
        amount_tendered: Money,
        notes: Option<String>,
    ) -> LedgerResult<CommitReceipt> {
        validate_non_negative("amount_tendered", amount_tendered.cents())?;
        if payment_method == PaymentMethod::Refund {
            return Err(LedgerError::validation(
                "payment method 'refund' is reserved for refund sales",
            ));
        }

        // Dropping the guard (error or cancelled future) reopens the draft.
        let guard = self.drafts.begin_commit(draft_id)?;
        let draft = guard.draft();

        let result = match self
            .try_commit(draft, payment_method, amount_tendered, notes.as_deref())
            .await
        {
            Err(e) if e.is_concurrency() => {
                warn!(draft_id = %draft_id, error = %e, "Commit conflict, retrying once");
                self.try_commit(draft, payment_method, amount_tendered, notes.as_deref())
                    .await
            }
            other => other,
        }
        .map_err(LedgerError::commit_failed);

        if result.is_ok() {
            guard.complete();
        }

        match &result {
            Ok(receipt) => info!(
                sale_id = %receipt.sale_id,
                sale_number = %receipt.sale_number,
                total = %receipt.total,
                status = ?receipt.payment_status,
                "Sale committed"
            ),
            Err(e) => warn!(draft_id = %draft_id, error = %e, "Commit rolled back"),
        }
        result
    }

    async fn try_commit(
        &self,
        draft: &SaleDraft,
        method: PaymentMethod,
        tendered: Money,
        notes: Option<&str>,
    ) -> LedgerResult<CommitReceipt> {
        let mut tx = self.db.begin_write().await?;

        match write_sale(&mut tx, draft, method, tendered, notes).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed; connection will discard the transaction");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Refund
    // =========================================================================

    /// Refunds some or all of a committed sale.
    ///
    /// Lines are priced at the original unit price and per-unit discount,
    /// taxed at the rate snapshotted on the original line. The sale's global
    /// discount is not pro-rated, so refunding every unit of a sale that had
    /// one returns more than was charged: a 45.20 sale with a 9.98 global
    /// discount refunds as -56.48.
    pub async fn refund(
        &self,
        sale_id: &str,
        items: &[RefundLine],
        reason: &str,
        actor_id: &str,
    ) -> LedgerResult<RefundReceipt> {
        validate_reason(reason)?;
        validate_text("actor_id", actor_id, 100)?;

        let result = match self.try_refund(sale_id, items, reason, actor_id).await {
            Err(e) if e.is_concurrency() => {
                warn!(sale_id = %sale_id, error = %e, "Refund conflict, retrying once");
                self.try_refund(sale_id, items, reason, actor_id).await
            }
            other => other,
        }?;

        info!(
            refund_sale_id = %result.refund_sale_id,
            sale_number = %result.sale_number,
            original_sale_id = %sale_id,
            total = %result.total,
            "Refund committed"
        );
        Ok(result)
    }

    async fn try_refund(
        &self,
        sale_id: &str,
        items: &[RefundLine],
        reason: &str,
        actor_id: &str,
    ) -> LedgerResult<RefundReceipt> {
        let mut tx = self.db.begin_write().await?;

        match write_refund(&mut tx, sale_id, items, reason, actor_id, self.tax_rate).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed; connection will discard the transaction");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Appends a payment to a sale that still has an amount due.
    ///
    /// The applied amount is capped at what is due; the rest is change.
    pub async fn add_payment(
        &self,
        sale_id: &str,
        amount: Money,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> LedgerResult<PaymentReceipt> {
        validate_payment_amount(amount.cents())?;
        if method == PaymentMethod::Refund {
            return Err(LedgerError::validation(
                "payment method 'refund' is reserved for refund sales",
            ));
        }

        let mut tx = self.db.begin_write().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;

        if sale.is_refund() {
            return Err(LedgerError::validation("refund sales do not take payments"));
        }
        let due = sale.amount_due();
        if !due.is_positive() {
            return Err(LedgerError::validation(format!(
                "sale {} is already fully paid",
                sale.sale_number
            )));
        }

        let applied = amount.min(due);
        let change = amount - applied;
        let remaining = due - applied;
        let status = if remaining.is_zero() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Partial
        };

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale.id.clone(),
            method,
            amount_cents: applied.cents(),
            tendered_cents: Some(amount.cents()),
            change_cents: Some(change.cents()),
            reference,
            created_at: Utc::now(),
        };

        SaleRepository::insert_payment(&mut tx, &payment).await?;
        SaleRepository::set_payment_status(&mut tx, &sale.id, status).await?;
        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            applied = %applied,
            remaining = %remaining,
            status = ?status,
            "Payment added"
        );

        Ok(PaymentReceipt {
            payment_id: payment.id,
            amount_applied: applied,
            change,
            amount_due: remaining,
            payment_status: status,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_sale(&self, sale_id: &str) -> LedgerResult<SaleDetail> {
        let sales = self.db.sales();

        let sale = sales.get_by_id(sale_id).await?;
        let items = sales.get_items(sale_id).await?;
        let payments = sales.get_payments(sale_id).await?;
        let refund_state = if sale.is_refund() {
            RefundState::None
        } else {
            sales.refund_state(sale_id).await?
        };

        let refunds = if sale.is_refund() {
            Vec::new()
        } else {
            sales.refunds_of(sale_id).await?
        };

        Ok(SaleDetail {
            sale,
            items,
            payments,
            refund_state,
            refunds,
        })
    }

    /// Same as [`get_sale`](Self::get_sale), looked up by receipt number.
    pub async fn get_sale_by_number(&self, sale_number: &str) -> LedgerResult<SaleDetail> {
        let sale = self
            .db
            .sales()
            .get_by_number(sale_number)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_number.to_string()))?;

        self.get_sale(&sale.id).await
    }

    pub async fn search_sales(&self, filter: &SaleFilter) -> LedgerResult<Vec<Sale>> {
        Ok(self.db.sales().search(filter).await?)
    }

    pub async fn low_stock_products(&self) -> LedgerResult<Vec<Product>> {
        Ok(self.db.ledger().low_stock().await?)
    }

    /// Movement history, newest first.
    pub async fn movements_for(
        &self,
        product_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> LedgerResult<Vec<StockMovement>> {
        Ok(self.db.ledger().movements(product_id, since, limit).await?)
    }

    // =========================================================================
    // Stock operations
    // =========================================================================

    pub async fn receive_stock(
        &self,
        product_id: &str,
        quantity: i64,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> LedgerResult<i64> {
        Ok(self
            .db
            .ledger()
            .receive(product_id, quantity, notes, actor_id)
            .await?)
    }

    /// Signed correction; cannot take stock below zero.
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        delta: i64,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> LedgerResult<i64> {
        if delta == 0 {
            return Err(LedgerError::validation("adjustment of zero units"));
        }
        let adj = StockAdjustment::correction(product_id, delta)
            .notes(notes)
            .actor(actor_id);
        Ok(self.db.ledger().adjust(&adj).await?)
    }

    pub async fn set_quantity(
        &self,
        product_id: &str,
        target: i64,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> LedgerResult<i64> {
        Ok(self
            .db
            .ledger()
            .set_quantity(product_id, target, notes, actor_id)
            .await?)
    }

    pub async fn reconcile(&self, product_id: &str) -> LedgerResult<Reconciliation> {
        Ok(self.db.ledger().reconcile(product_id).await?)
    }

    pub async fn reconcile_all(&self) -> LedgerResult<Vec<Reconciliation>> {
        Ok(self.db.ledger().reconcile_all().await?)
    }
}

// =============================================================================
// Transaction bodies
// =============================================================================

/// Every write of a commit, on one open transaction.
async fn write_sale(
    conn: &mut SqliteConnection,
    draft: &SaleDraft,
    method: PaymentMethod,
    tendered: Money,
    notes: Option<&str>,
) -> LedgerResult<CommitReceipt> {
    let totals = draft.totals();
    let total = totals.total;
    let now = Utc::now();

    let sale_id = Uuid::new_v4().to_string();
    let sale_number = next_sale_number(conn, Local::now().date_naive()).await?;

    let applied = tendered.min(total);
    let change = (tendered - total).max(Money::zero());
    let payment_status = PaymentStatus::from_tender(tendered, total);

    let sale = Sale {
        id: sale_id.clone(),
        sale_number: sale_number.clone(),
        client_id: draft.client_id().map(str::to_string),
        actor_id: draft.actor_id().to_string(),
        subtotal_cents: totals.subtotal.cents(),
        tax_cents: totals.tax.cents(),
        discount_cents: totals.discount.cents(),
        total_cents: total.cents(),
        payment_method: method,
        payment_status,
        amount_paid_cents: applied.cents(),
        amount_due_cents: (total - applied).cents(),
        notes: notes.map(str::to_string),
        refund_of_sale_id: None,
        created_at: now,
    };
    SaleRepository::insert_sale(conn, &sale).await?;

    for line in draft.lines() {
        let item = SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            product_id: line.product_id.clone(),
            sku_snapshot: line.sku.clone(),
            name_snapshot: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            discount_cents: line.per_unit_discount.cents(),
            tax_rate_bps: line.tax_rate.bps(),
            line_total_cents: line.line_total.cents(),
            refund_of_item_id: None,
            created_at: now,
        };
        SaleRepository::insert_item(conn, &item).await?;
    }

    for line in draft.lines() {
        let adj = StockAdjustment::sale(&line.product_id, line.quantity, &sale_id)
            .actor(Some(draft.actor_id().to_string()));
        StockLedger::apply(conn, &adj).await?;
    }

    if tendered.is_positive() {
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            method,
            amount_cents: applied.cents(),
            tendered_cents: Some(tendered.cents()),
            change_cents: Some(change.cents()),
            reference: None,
            created_at: now,
        };
        SaleRepository::insert_payment(conn, &payment).await?;
    }

    Ok(CommitReceipt {
        sale_id,
        sale_number,
        total,
        amount_paid: applied,
        amount_due: total - applied,
        change,
        payment_status,
    })
}

/// Every read and write of a refund, on one open transaction.
async fn write_refund(
    conn: &mut SqliteConnection,
    sale_id: &str,
    requests: &[RefundLine],
    reason: &str,
    actor_id: &str,
    current_rate: TaxRate,
) -> LedgerResult<RefundReceipt> {
    let original = SaleRepository::fetch(conn, sale_id)
        .await?
        .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;

    if original.is_refund() {
        return Err(LedgerError::validation(format!(
            "{} is a refund and cannot be refunded",
            original.sale_number
        )));
    }

    let items = SaleRepository::items_in(conn, sale_id).await?;
    let already = SaleRepository::refunded_quantities(conn, sale_id).await?;

    let refundable: Vec<RefundableLine> = items
        .iter()
        .map(|item| RefundableLine {
            item_id: item.id.clone(),
            product_id: item.product_id.clone(),
            sold: item.quantity,
            refunded: already.get(&item.id).copied().unwrap_or(0),
        })
        .collect();

    let allocations = plan_refund(&refundable, requests)?;

    // Original prices, discounts and tax rates; no global discount.
    let mut lines = Vec::with_capacity(allocations.len());
    for alloc in &allocations {
        let item = items
            .iter()
            .find(|i| i.id == alloc.item_id)
            .ok_or_else(|| LedgerError::ProductNotInSale(alloc.product_id.clone()))?;
        lines.push((item, alloc.quantity));
    }

    let inputs: Vec<LineInput> = lines
        .iter()
        .map(|(item, qty)| LineInput {
            quantity: *qty,
            unit_price: Money::from_cents(item.unit_price_cents),
            per_unit_discount: Money::from_cents(item.discount_cents),
            tax_rate: TaxRate::from_bps(item.tax_rate_bps),
        })
        .collect();
    let totals = compute_totals(&inputs, Money::zero(), current_rate);

    let now = Utc::now();
    let refund_id = Uuid::new_v4().to_string();
    let sale_number = next_refund_number(conn, &original.id, &original.sale_number).await?;
    let total = -totals.total;

    let refund = Sale {
        id: refund_id.clone(),
        sale_number: sale_number.clone(),
        client_id: original.client_id.clone(),
        actor_id: actor_id.trim().to_string(),
        subtotal_cents: -totals.subtotal.cents(),
        tax_cents: -totals.tax.cents(),
        discount_cents: 0,
        total_cents: total.cents(),
        payment_method: PaymentMethod::Refund,
        payment_status: PaymentStatus::Completed,
        amount_paid_cents: total.cents(),
        amount_due_cents: 0,
        notes: Some(reason.trim().to_string()),
        refund_of_sale_id: Some(original.id.clone()),
        created_at: now,
    };
    SaleRepository::insert_sale(conn, &refund).await?;

    for ((item, qty), priced) in lines.iter().zip(&totals.lines) {
        let line = SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: refund_id.clone(),
            product_id: item.product_id.clone(),
            sku_snapshot: item.sku_snapshot.clone(),
            name_snapshot: item.name_snapshot.clone(),
            quantity: -qty,
            unit_price_cents: item.unit_price_cents,
            discount_cents: item.discount_cents,
            tax_rate_bps: item.tax_rate_bps,
            line_total_cents: -priced.line_total.cents(),
            refund_of_item_id: Some(item.id.clone()),
            created_at: now,
        };
        SaleRepository::insert_item(conn, &line).await?;
    }

    for (item, qty) in &lines {
        let adj = StockAdjustment::refund(&item.product_id, *qty, &original.id)
            .notes(Some(reason.trim().to_string()))
            .actor(Some(actor_id.trim().to_string()));
        StockLedger::apply(conn, &adj).await?;
    }

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        sale_id: refund_id.clone(),
        method: PaymentMethod::Refund,
        amount_cents: total.cents(),
        tendered_cents: None,
        change_cents: None,
        reference: Some(original.sale_number.clone()),
        created_at: now,
    };
    SaleRepository::insert_payment(conn, &payment).await?;

    let sold: i64 = refundable.iter().map(|l| l.sold).sum();
    let refunded: i64 = refundable.iter().map(|l| l.refunded).sum::<i64>()
        + allocations.iter().map(|a| a.quantity).sum::<i64>();

    Ok(RefundReceipt {
        refund_sale_id: refund_id,
        sale_number,
        total,
        refund_state: RefundState::from_quantities(sold, refunded),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::ErrorCode;
    use ironbox_core::{MovementType, NewClient, NewProduct, ReferenceType};
    use ironbox_db::DbConfig;

    const CASHIER: &str = "cashier-1";

    fn hammer() -> NewProduct {
        NewProduct {
            sku: "HAM001".to_string(),
            barcode: Some("123456789012".to_string()),
            name: "Claw Hammer 16oz".to_string(),
            description: None,
            cost_cents: 1250,
            price_cents: 2499,
            tax_rate_bps: 1300,
            opening_stock: 30,
            min_stock_level: 10,
        }
    }

    fn tape() -> NewProduct {
        NewProduct {
            sku: "TAP005".to_string(),
            barcode: None,
            name: "Duct Tape Silver 50mm".to_string(),
            description: None,
            cost_cents: 420,
            price_cents: 899,
            tax_rate_bps: 1300,
            opening_stock: 0,
            min_stock_level: 10,
        }
    }

    async fn setup() -> (SaleTransactionManager, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(hammer()).await.unwrap();
        (
            SaleTransactionManager::new(db, TaxRate::from_bps(1300)),
            product,
        )
    }

    async fn draft_with(manager: &SaleTransactionManager, product: &Product, qty: i64) -> String {
        let draft_id = manager.start_draft(CASHIER, None).await.unwrap();
        manager
            .add_item(&draft_id, &product.id, qty, None, None)
            .await
            .unwrap();
        draft_id
    }

    async fn count(manager: &SaleTransactionManager, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(manager.database().pool())
            .await
            .unwrap()
    }

    async fn on_hand(manager: &SaleTransactionManager, product: &Product) -> i64 {
        manager
            .database()
            .products()
            .get_by_id(&product.id)
            .await
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn test_commit_fully_paid() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        let view = manager.draft_view(&draft_id).unwrap();
        assert_eq!(view.totals.subtotal_cents, 4998);
        assert_eq!(view.totals.tax_cents, 650);
        assert_eq!(view.totals.total_cents, 5648);

        let receipt = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(6000), None)
            .await
            .unwrap();

        assert_eq!(receipt.payment_status, PaymentStatus::Completed);
        assert_eq!(receipt.amount_due, Money::zero());
        assert_eq!(receipt.change.cents(), 352);
        assert_eq!(
            receipt.sale_number,
            format!("{}-0001", Local::now().format("%Y%m%d"))
        );

        assert_eq!(on_hand(&manager, &p).await, 28);

        let movements = manager.movements_for(Some(&p.id), None, None).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(movements[0].quantity_delta, -2);
        assert_eq!(movements[0].reference_id.as_deref(), Some(receipt.sale_id.as_str()));

        let detail = manager.get_sale(&receipt.sale_id).await.unwrap();
        assert_eq!(detail.sale.total_cents, 5648);
        assert_eq!(detail.sale.amount_due_cents, 0);
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].unit_price_cents, 2499);
        assert_eq!(detail.payments.len(), 1);
        assert_eq!(detail.payments[0].amount_cents, 5648);
        assert_eq!(detail.payments[0].tendered_cents, Some(6000));
        assert_eq!(detail.refund_state, RefundState::None);

        // Draft is gone after a successful commit
        assert!(matches!(
            manager.draft_view(&draft_id),
            Err(LedgerError::DraftNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_partial_then_pay_rest() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        let receipt = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(3000), None)
            .await
            .unwrap();
        assert_eq!(receipt.payment_status, PaymentStatus::Partial);
        assert_eq!(receipt.amount_due.cents(), 2648);

        let paid = manager
            .add_payment(&receipt.sale_id, Money::from_cents(3000), PaymentMethod::DebitCard, None)
            .await
            .unwrap();
        assert_eq!(paid.amount_applied.cents(), 2648);
        assert_eq!(paid.change.cents(), 352);
        assert_eq!(paid.payment_status, PaymentStatus::Completed);

        let sale = manager.get_sale(&receipt.sale_id).await.unwrap().sale;
        assert_eq!(sale.payment_status, PaymentStatus::Completed);
        assert_eq!(sale.amount_paid_cents, 5648);
        assert_eq!(sale.amount_due_cents, 0);

        assert!(matches!(
            manager
                .add_payment(&receipt.sale_id, Money::from_cents(100), PaymentMethod::Cash, None)
                .await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_without_tender_is_pending() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 1).await;

        let receipt = manager
            .commit(&draft_id, PaymentMethod::CreditCard, Money::zero(), Some("on account".into()))
            .await
            .unwrap();

        assert_eq!(receipt.payment_status, PaymentStatus::Pending);
        assert_eq!(receipt.amount_due.cents(), 2824);
        assert_eq!(count(&manager, "payments").await, 0);
    }

    #[tokio::test]
    async fn test_empty_draft_commit_rejected() {
        let (manager, _) = setup().await;
        let draft_id = manager.start_draft(CASHIER, None).await.unwrap();

        assert!(matches!(
            manager
                .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
                .await,
            Err(LedgerError::EmptySale)
        ));
        assert_eq!(count(&manager, "sales").await, 0);
    }

    #[tokio::test]
    async fn test_add_item_without_stock_leaves_draft_unchanged() {
        let (manager, _) = setup().await;
        let empty = manager.database().products().insert(tape()).await.unwrap();
        let draft_id = manager.start_draft(CASHIER, None).await.unwrap();

        let err = manager
            .add_item(&draft_id, &empty.id, 1, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock { available: 0, requested: 1, .. }
        ));

        let view = manager.draft_view(&draft_id).unwrap();
        assert!(view.lines.is_empty());
        assert_eq!(view.totals.total_cents, 0);
    }

    #[tokio::test]
    async fn test_add_item_lookup_failures() {
        let (manager, p) = setup().await;
        let draft_id = manager.start_draft(CASHIER, None).await.unwrap();

        assert!(matches!(
            manager.add_item(&draft_id, "missing", 1, None, None).await,
            Err(LedgerError::ProductNotFound(_))
        ));
        assert!(matches!(
            manager.add_item("no-draft", &p.id, 1, None, None).await,
            Err(LedgerError::DraftNotFound(_))
        ));

        let view = manager
            .add_item_by_code(&draft_id, "123456789012", 1)
            .await
            .unwrap();
        assert_eq!(view.lines[0].sku, "HAM001");
    }

    #[tokio::test]
    async fn test_start_draft_unknown_client() {
        let (manager, _) = setup().await;

        assert!(matches!(
            manager.start_draft(CASHIER, Some("ghost")).await,
            Err(LedgerError::ClientNotFound(_))
        ));

        let client = manager
            .database()
            .clients()
            .create(NewClient {
                first_name: "Ana".into(),
                last_name: "Silva".into(),
                email: None,
                phone: None,
            })
            .await
            .unwrap();

        let draft_id = manager.start_draft(CASHIER, Some(&client.id)).await.unwrap();
        assert_eq!(
            manager.draft_view(&draft_id).unwrap().client_id.as_deref(),
            Some(client.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_global_discount_uses_current_rate() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        let view = manager
            .apply_discount(&draft_id, Money::from_cents(998))
            .unwrap();
        assert_eq!(view.totals.discount_cents, 998);
        assert_eq!(view.totals.tax_cents, 520);
        assert_eq!(view.totals.total_cents, 4520);

        assert!(matches!(
            manager.apply_discount(&draft_id, Money::from_cents(10_000)),
            Err(LedgerError::Validation(_))
        ));

        let receipt = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(4520), None)
            .await
            .unwrap();
        let sale = manager.get_sale(&receipt.sale_id).await.unwrap().sale;
        assert_eq!(sale.discount_cents, 998);
        assert_eq!(sale.total_cents, sale.subtotal_cents - sale.discount_cents + sale.tax_cents);

        // The global discount is not pro-rated back.
        let refund = manager
            .refund(&receipt.sale_id, &[RefundLine::new(&p.id, 2)], "returned", CASHIER)
            .await
            .unwrap();
        assert_eq!(refund.total.cents(), -5648);
        assert_eq!(refund.refund_state, RefundState::Full);
    }

    #[tokio::test]
    async fn test_void_draft_writes_nothing() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 3).await;

        manager.void_draft(&draft_id, "customer left").unwrap();

        assert_eq!(manager.open_drafts(), 0);
        assert_eq!(count(&manager, "sales").await, 0);
        assert_eq!(count(&manager, "stock_movements").await, 0);
        assert_eq!(on_hand(&manager, &p).await, 30);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_everything() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        // Fails after sales and sale_items rows are written.
        sqlx::query(
            r#"
            CREATE TRIGGER inject_fault BEFORE INSERT ON stock_movements
            BEGIN
                SELECT RAISE(ABORT, 'injected fault');
            END
            "#,
        )
        .execute(manager.database().pool())
        .await
        .unwrap();

        let err = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(6000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::CommitFailed { .. }));

        assert_eq!(count(&manager, "sales").await, 0);
        assert_eq!(count(&manager, "sale_items").await, 0);
        assert_eq!(count(&manager, "stock_movements").await, 0);
        assert_eq!(count(&manager, "payments").await, 0);
        assert_eq!(on_hand(&manager, &p).await, 30);

        // The draft is editable again and commits once the fault is gone.
        manager
            .add_item(&draft_id, &p.id, 1, None, None)
            .await
            .unwrap();

        sqlx::query("DROP TRIGGER inject_fault")
            .execute(manager.database().pool())
            .await
            .unwrap();

        let receipt = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(10_000), None)
            .await
            .unwrap();
        assert!(receipt.sale_number.ends_with("-0001"));
        assert_eq!(on_hand(&manager, &p).await, 27);
    }

    #[tokio::test]
    async fn test_stock_taken_by_earlier_commit() {
        let (manager, p) = setup().await;
        let first = draft_with(&manager, &p, 20).await;
        let second = draft_with(&manager, &p, 20).await;

        manager
            .commit(&first, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap();

        let err = manager
            .commit(&second, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap_err();
        match err {
            LedgerError::CommitFailed { cause } => assert!(matches!(
                *cause,
                LedgerError::InsufficientStock { available: 10, requested: 20, .. }
            )),
            other => panic!("expected CommitFailed, got {other:?}"),
        }

        assert_eq!(count(&manager, "sales").await, 1);
        assert_eq!(on_hand(&manager, &p).await, 10);
        assert!(manager.draft_view(&second).is_ok());
    }

    #[tokio::test]
    async fn test_busy_twice_reports_concurrency() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        // Every attempt, including the retry, sees a locked database.
        sqlx::query(
            r#"
            CREATE TRIGGER always_locked BEFORE INSERT ON stock_movements
            BEGIN
                SELECT RAISE(ABORT, 'database is locked');
            END
            "#,
        )
        .execute(manager.database().pool())
        .await
        .unwrap();

        let err = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap_err();
        assert!(err.is_concurrency(), "got {err:?}");
        assert_eq!(err.code(), ErrorCode::Concurrency);

        assert_eq!(count(&manager, "sales").await, 0);
        assert_eq!(on_hand(&manager, &p).await, 30);
        manager
            .add_item(&draft_id, &p.id, 1, None, None)
            .await
            .unwrap();

        sqlx::query("DROP TRIGGER always_locked")
            .execute(manager.database().pool())
            .await
            .unwrap();

        let receipt = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap();
        assert!(receipt.sale_number.ends_with("-0001"));
        assert_eq!(on_hand(&manager, &p).await, 27);
    }

    #[tokio::test]
    async fn test_cancelled_commit_reopens_draft() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;

        // Hold the only connection so the commit parks waiting for it.
        let conn = manager.database().pool().acquire().await.unwrap();
        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            manager.commit(&draft_id, PaymentMethod::Cash, Money::zero(), None),
        )
        .await;
        assert!(timed_out.is_err());
        drop(conn);

        assert_eq!(count(&manager, "sales").await, 0);
        assert_eq!(manager.open_drafts(), 1);
        manager
            .add_item(&draft_id, &p.id, 1, None, None)
            .await
            .unwrap();

        manager
            .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap();
        assert_eq!(manager.open_drafts(), 0);
        assert_eq!(on_hand(&manager, &p).await, 27);
    }

    #[tokio::test]
    async fn test_concurrent_commits_get_distinct_numbers() {
        let (manager, p) = setup().await;
        let a = draft_with(&manager, &p, 2).await;
        let b = draft_with(&manager, &p, 3).await;

        let (ra, rb) = tokio::join!(
            manager.commit(&a, PaymentMethod::Cash, Money::zero(), None),
            manager.commit(&b, PaymentMethod::Cash, Money::zero(), None),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_ne!(ra.sale_number, rb.sale_number);
        assert_eq!(on_hand(&manager, &p).await, 25);
        assert!(manager.reconcile(&p.id).await.unwrap().balanced);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_commits_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("register.db")))
            .await
            .unwrap();
        let p = db.products().insert(hammer()).await.unwrap();
        let manager = Arc::new(SaleTransactionManager::new(db, TaxRate::from_bps(1300)));

        let mut drafts = Vec::new();
        for _ in 0..8 {
            drafts.push(draft_with(&manager, &p, 1).await);
        }

        let handles: Vec<_> = drafts
            .into_iter()
            .map(|draft_id| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager
                        .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
                        .await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().sale_number);
        }
        numbers.sort();

        let day = Local::now().format("%Y%m%d");
        let expected: Vec<_> = (1..=8).map(|seq| format!("{day}-{seq:04}")).collect();
        assert_eq!(numbers, expected);

        assert_eq!(on_hand(&manager, &p).await, 22);
        assert_eq!(count(&manager, "stock_movements").await, 8);
        assert!(manager.reconcile(&p.id).await.unwrap().balanced);
        assert_eq!(manager.open_drafts(), 0);

        manager.database().close().await;
    }

    #[tokio::test]
    async fn test_refund_one_unit() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;
        let sale = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(6000), None)
            .await
            .unwrap();

        let refund = manager
            .refund(&sale.sale_id, &[RefundLine::new(&p.id, 1)], "damaged handle", CASHIER)
            .await
            .unwrap();

        assert_eq!(refund.total.cents(), -2824);
        assert_eq!(refund.sale_number, format!("RF-{}", sale.sale_number));
        assert_eq!(refund.refund_state, RefundState::Partial);
        assert_eq!(on_hand(&manager, &p).await, 29);

        let movements = manager.movements_for(Some(&p.id), None, Some(1)).await.unwrap();
        assert_eq!(movements[0].movement_type, MovementType::In);
        assert_eq!(movements[0].reference_type, ReferenceType::Refund);
        assert_eq!(movements[0].quantity_delta, 1);
        assert_eq!(movements[0].reference_id.as_deref(), Some(sale.sale_id.as_str()));

        let detail = manager.get_sale(&refund.refund_sale_id).await.unwrap();
        assert_eq!(detail.sale.payment_method, PaymentMethod::Refund);
        assert_eq!(detail.sale.payment_status, PaymentStatus::Completed);
        assert_eq!(detail.sale.subtotal_cents, -2499);
        assert_eq!(detail.sale.tax_cents, -325);
        assert_eq!(detail.sale.amount_due_cents, 0);
        assert_eq!(detail.items[0].quantity, -1);
        assert!(detail.items[0].refund_of_item_id.is_some());

        // Original untouched
        let original = manager.get_sale(&sale.sale_id).await.unwrap();
        assert_eq!(original.sale.total_cents, 5648);
        assert_eq!(original.sale.payment_status, PaymentStatus::Completed);
        assert_eq!(original.refund_state, RefundState::Partial);
    }

    #[tokio::test]
    async fn test_repeated_partial_refunds_are_bounded() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;
        let sale = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(6000), None)
            .await
            .unwrap();

        let first = manager
            .refund(&sale.sale_id, &[RefundLine::new(&p.id, 1)], "wrong size", CASHIER)
            .await
            .unwrap();
        let second = manager
            .refund(&sale.sale_id, &[RefundLine::new(&p.id, 1)], "wrong size", CASHIER)
            .await
            .unwrap();
        assert_eq!(second.sale_number, format!("RF-{}-2", sale.sale_number));
        assert_eq!(second.refund_state, RefundState::Full);

        let err = manager
            .refund(&sale.sale_id, &[RefundLine::new(&p.id, 1)], "wrong size", CASHIER)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::RefundExceedsOriginal { requested: 1, refundable: 0, .. }
        ));

        assert_eq!(on_hand(&manager, &p).await, 30);
        assert_eq!(count(&manager, "stock_movements").await, 3);

        let detail = manager.get_sale_by_number(&sale.sale_number).await.unwrap();
        assert_eq!(detail.sale.id, sale.sale_id);
        assert_eq!(detail.refund_state, RefundState::Full);
        let refund_ids: Vec<_> = detail.refunds.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            refund_ids,
            [first.refund_sale_id.as_str(), second.refund_sale_id.as_str()]
        );
        assert!(manager
            .get_sale(&first.refund_sale_id)
            .await
            .unwrap()
            .refunds
            .is_empty());
        assert!(matches!(
            manager.get_sale_by_number("20000101-9999").await,
            Err(LedgerError::SaleNotFound(_))
        ));

        // A refund sale cannot be refunded
        assert!(matches!(
            manager
                .refund(&first.refund_sale_id, &[RefundLine::new(&p.id, 1)], "again", CASHIER)
                .await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_refund_rejections_write_nothing() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 2).await;
        let sale = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::from_cents(6000), None)
            .await
            .unwrap();

        assert!(matches!(
            manager
                .refund("missing", &[RefundLine::new(&p.id, 1)], "reason", CASHIER)
                .await,
            Err(LedgerError::SaleNotFound(_))
        ));
        assert!(matches!(
            manager
                .refund(&sale.sale_id, &[RefundLine::new(&p.id, 3)], "reason", CASHIER)
                .await,
            Err(LedgerError::RefundExceedsOriginal { .. })
        ));
        assert!(matches!(
            manager
                .refund(&sale.sale_id, &[RefundLine::new("other", 1)], "reason", CASHIER)
                .await,
            Err(LedgerError::ProductNotInSale(_))
        ));
        assert!(matches!(
            manager
                .refund(&sale.sale_id, &[RefundLine::new(&p.id, 1)], "  ", CASHIER)
                .await,
            Err(LedgerError::Validation(_))
        ));

        assert_eq!(count(&manager, "sales").await, 1);
        assert_eq!(on_hand(&manager, &p).await, 28);
    }

    #[tokio::test]
    async fn test_ledger_reconciles_after_mixed_activity() {
        let (manager, p) = setup().await;

        let a = draft_with(&manager, &p, 4).await;
        let sale = manager
            .commit(&a, PaymentMethod::Cash, Money::from_cents(20_000), None)
            .await
            .unwrap();
        manager
            .refund(&sale.sale_id, &[RefundLine::new(&p.id, 2)], "returned", CASHIER)
            .await
            .unwrap();
        manager.receive_stock(&p.id, 12, None, None).await.unwrap();
        manager
            .adjust_stock(&p.id, -3, Some("breakage".into()), Some(CASHIER.into()))
            .await
            .unwrap();
        manager.set_quantity(&p.id, 40, None, None).await.unwrap();

        let rec = manager.reconcile(&p.id).await.unwrap();
        assert!(rec.balanced);
        assert_eq!(rec.on_hand, 40);
        assert_eq!(rec.opening_stock + rec.movement_total, 40);

        assert!(matches!(
            manager.adjust_stock(&p.id, -41, None, None).await,
            Err(LedgerError::InsufficientStock { .. })
        ));
        assert!(manager.reconcile_all().await.unwrap().iter().all(|r| r.balanced));
    }

    #[tokio::test]
    async fn test_search_and_low_stock() {
        let (manager, p) = setup().await;
        let draft_id = draft_with(&manager, &p, 21).await;
        let sale = manager
            .commit(&draft_id, PaymentMethod::Cash, Money::zero(), None)
            .await
            .unwrap();

        let low = manager.low_stock_products().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].quantity, 9);

        let pending = manager
            .search_sales(&SaleFilter {
                payment_status: Some(PaymentStatus::Pending),
                actor_id: Some(CASHIER.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, sale.sale_id);
    }
}
