//! # Ledger Error Type
//!
//! The discriminated error every register operation returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Ironbox POS                            │
//! │                                                                         │
//! │  CoreError (draft / pricing / refund planning) ──┐                      │
//! │                                                  │                      │
//! │  DbError (storage / Stock Ledger) ───────────────┼──► LedgerError       │
//! │                                                  │        │             │
//! │  ValidationError (input) ────────────────────────┘        ▼             │
//! │                                                     ErrorReport         │
//! │                                                     { code, message }   │
//! │                                                                         │
//! │  Commit failures wrap the original error:                              │
//! │    CommitFailed { cause: InsufficientStock { .. } }                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is swallowed here; every failure reaches the caller.

use serde::Serialize;
use thiserror::Error;

use ironbox_core::{CoreError, ValidationError};
use ironbox_db::DbError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input rejected before anything changed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {sku} is not active")]
    ProductInactive { sku: String },

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// ## When This Occurs
    /// - `add_item` asks for more than is on hand
    /// - at commit, another sale took the stock first (wrapped in `CommitFailed`)
    /// - an adjustment would take stock below zero
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    #[error("Sale has no items")]
    EmptySale,

    #[error("Sale draft not found: {0}")]
    DraftNotFound(String),

    /// The draft is being committed; it cannot change until the commit ends.
    #[error("Sale draft {0} cannot be edited while it is being committed")]
    DraftNotEditable(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Refund of {requested} x {product_id} exceeds refundable quantity {refundable}")]
    RefundExceedsOriginal {
        product_id: String,
        requested: i64,
        refundable: i64,
    },

    #[error("Product {0} was not sold on the original sale")]
    ProductNotInSale(String),

    /// A concurrent writer won twice in a row (number collision or lock).
    #[error("Concurrent update conflict: {0}")]
    Concurrency(String),

    /// The commit transaction was rolled back. Nothing from it persisted.
    #[error("Commit failed: {cause}")]
    CommitFailed {
        #[source]
        cause: Box<LedgerError>,
    },

    #[error("Storage error: {0}")]
    Storage(#[source] DbError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// Wraps a failure from inside the commit transaction.
    ///
    /// Concurrency failures are not wrapped; the caller sees them directly.
    pub fn commit_failed(cause: LedgerError) -> Self {
        match cause {
            LedgerError::Concurrency(_) | LedgerError::CommitFailed { .. } => cause,
            other => LedgerError::CommitFailed {
                cause: Box::new(other),
            },
        }
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, LedgerError::Concurrency(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            LedgerError::ProductInactive { .. } => ErrorCode::ProductInactive,
            LedgerError::ClientNotFound(_) => ErrorCode::ClientNotFound,
            LedgerError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            LedgerError::EmptySale => ErrorCode::EmptySale,
            LedgerError::DraftNotFound(_) => ErrorCode::DraftNotFound,
            LedgerError::DraftNotEditable(_) => ErrorCode::DraftNotEditable,
            LedgerError::SaleNotFound(_) => ErrorCode::SaleNotFound,
            LedgerError::RefundExceedsOriginal { .. } => ErrorCode::RefundExceedsOriginal,
            LedgerError::ProductNotInSale(_) => ErrorCode::ProductNotInSale,
            LedgerError::Concurrency(_) => ErrorCode::Concurrency,
            LedgerError::CommitFailed { .. } => ErrorCode::CommitFailed,
            LedgerError::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Serializable form for a UI.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            // Storage details go to the log, not the screen.
            LedgerError::Storage(e) => {
                tracing::error!(error = %e, "Storage operation failed");
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };

        ErrorReport {
            code: self.code(),
            message,
            cause: match self {
                LedgerError::CommitFailed { cause } => Some(cause.code()),
                _ => None,
            },
        }
    }
}

/// Machine-readable error codes.
///
/// ## Usage in a Frontend
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK': showStockWarning(e.message); break;
///   case 'COMMIT_FAILED':      retryOrReport(e.cause);      break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ProductNotFound,
    ProductInactive,
    ClientNotFound,
    InsufficientStock,
    EmptySale,
    DraftNotFound,
    DraftNotEditable,
    SaleNotFound,
    RefundExceedsOriginal,
    ProductNotInSale,
    Concurrency,
    CommitFailed,
    StorageError,
}

/// What a UI receives when an operation fails.
///
/// ```json
/// { "code": "COMMIT_FAILED", "message": "Commit failed: ...", "cause": "INSUFFICIENT_STOCK" }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorCode>,
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductInactive { sku } => LedgerError::ProductInactive { sku },
            CoreError::InsufficientStock {
                sku,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                product: sku,
                available,
                requested,
            },
            CoreError::EmptySale => LedgerError::EmptySale,
            CoreError::RefundExceedsOriginal {
                product_id,
                requested,
                refundable,
            } => LedgerError::RefundExceedsOriginal {
                product_id,
                requested,
                refundable,
            },
            CoreError::ProductNotInSale(id) => LedgerError::ProductNotInSale(id),
            CoreError::Validation(v) => v.into(),
            other @ (CoreError::ItemNotInDraft(_)
            | CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::DiscountExceedsSubtotal { .. }) => {
                LedgerError::Validation(other.to_string())
            }
        }
    }
}

/// ## Error Mapping
/// ```text
/// NotFound { Product | Client | Sale } → *NotFound
/// InsufficientStock / NegativeStock   → InsufficientStock
/// Validation                          → Validation
/// Busy, duplicate sale_number/code    → Concurrency
/// Other                               → Storage
/// ```
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        if err.is_retryable() {
            return LedgerError::Concurrency(err.to_string());
        }

        match err {
            DbError::NotFound { entity, id } => match entity.as_str() {
                "Product" => LedgerError::ProductNotFound(id),
                "Client" => LedgerError::ClientNotFound(id),
                "Sale" => LedgerError::SaleNotFound(id),
                _ => LedgerError::Storage(DbError::NotFound { entity, id }),
            },
            DbError::InsufficientStock {
                product_id,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                product: product_id,
                available,
                requested,
            },
            DbError::NegativeStock {
                product_id,
                on_hand,
                delta,
            } => LedgerError::InsufficientStock {
                product: product_id,
                available: on_hand,
                requested: -delta,
            },
            DbError::Validation(v) => v.into(),
            other => LedgerError::Storage(other),
        }
    }
}

/// Transaction control (`BEGIN`, `COMMIT`) reports raw sqlx errors; they
/// take the same path as repository errors, so a busy `COMMIT` becomes
/// `Concurrency`.
impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}
