//! # Error Types
//!
//! Domain-specific error types for ironbox-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ironbox-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations (draft, refund)       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ironbox-db errors (separate crate)                                    │
//! │  └── DbError          - Storage failures, ledger refusals              │
//! │                                                                         │
//! │  ironbox-register errors                                               │
//! │  └── LedgerError      - What the UI sees (discriminated, coded)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is raised *before* any state changes: a draft that returns
/// one of these is exactly as it was before the call.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product is archived and cannot be sold.
    #[error("Product {sku} is not active")]
    ProductInactive { sku: String },

    /// Insufficient stock to add the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Draft (qty: 5)
    ///      │
    ///      ▼
    /// Check on-hand: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "HAM001", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 HAM001 in stock"
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Commit requested on a draft without lines.
    #[error("Sale has no items")]
    EmptySale,

    /// Remove requested for a product that has no line in the draft.
    #[error("Product {0} is not in the sale draft")]
    ItemNotInDraft(String),

    /// Draft has exceeded maximum allowed lines.
    #[error("Sale draft cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Global discount larger than the draft subtotal.
    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },

    /// Refund asks for more units than remain refundable on the original sale.
    #[error(
        "Refund of {requested} x {product_id} exceeds refundable quantity {refundable}"
    )]
    RefundExceedsOriginal {
        product_id: String,
        requested: i64,
        refundable: i64,
    },

    /// Refund names a product that was not part of the original sale.
    #[error("Product {0} was not sold on the original sale")]
    ProductNotInSale(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Update request carried no fields.
    #[error("{entity} update has no fields to change")]
    EmptyUpdate { entity: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "HAM001".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for HAM001: available 3, requested 5"
        );

        let err = CoreError::DiscountExceedsSubtotal {
            discount: Money::from_cents(1500),
            subtotal: Money::from_cents(999),
        };
        assert_eq!(err.to_string(), "Discount $15.00 exceeds subtotal $9.99");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");

        let err = ValidationError::EmptyUpdate {
            entity: "Product".to_string(),
        };
        assert_eq!(err.to_string(), "Product update has no fields to change");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
