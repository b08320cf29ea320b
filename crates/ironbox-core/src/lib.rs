//! # ironbox-core: Pure Business Logic for Ironbox POS
//!
//! This crate holds everything about a sale that can be decided without
//! touching storage: money arithmetic, the pricing & totals engine, the
//! in-memory sale draft and refund allocation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ironbox POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              External UI / CLI (not part of this repo)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ironbox-register (Sale Transaction Manager)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ ironbox-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ │   │
//! │  │   │  types  │ │  money  │ │ pricing │ │  draft  │ │  refund  │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO GLOBAL SETTINGS • PURE FUNCTIONS    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │       ironbox-db (SQLite, Stock Ledger, Numbering Service)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, StockMovement, Payment, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Totals engine (subtotal, tax, total with half-up rounding)
//! - [`draft`] - The in-progress cart owned by one cashier session
//! - [`refund`] - Allocation of refund requests onto original sale lines
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use ironbox_core::money::Money;
//! use ironbox_core::pricing::{compute_totals, LineInput};
//! use ironbox_core::types::TaxRate;
//!
//! let line = LineInput {
//!     quantity: 2,
//!     unit_price: Money::from_cents(2499),
//!     per_unit_discount: Money::zero(),
//!     tax_rate: TaxRate::from_bps(1300),
//! };
//!
//! let totals = compute_totals(&[line], Money::zero(), TaxRate::from_bps(1300));
//! assert_eq!(totals.subtotal.cents(), 4998);
//! assert_eq!(totals.tax.cents(), 650);
//! assert_eq!(totals.total.cents(), 5648);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod draft;
pub mod error;
pub mod money;
pub mod pricing;
pub mod refund;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use draft::{DraftTotals, DraftView, SaleDraft, SaleLineItem};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{compute_totals, LineInput, Totals};
pub use refund::{plan_refund, RefundAllocation, RefundLine, RefundableLine};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale draft.
///
/// ## Business Reason
/// Prevents runaway carts and ensures reasonable transaction sizes.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in a sale draft.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Prefix carried by every refund sale number (`RF-20261019-0001`).
pub const REFUND_PREFIX: &str = "RF-";
