//! # Validation Module
//!
//! Boundary checks run before any draft mutation or storage write.
//!
//! ```text
//! caller input ──► validate_*() ──► SaleDraft / repositories ──► SQLite
//!                      │                                           │
//!                      └── ValidationError, nothing touched        └── NOT NULL,
//!                                                                      UNIQUE, FK
//! ```
//!
//! ## Usage
//! ```rust
//! use ironbox_core::validation::{validate_quantity, validate_sku};
//!
//! assert!(validate_sku("HAM001").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{NewClient, NewProduct};
use crate::MAX_ITEM_QUANTITY;

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU: 1-50 characters of letters, digits, `-` or `_`.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a barcode: digits only, 8 to 14 long (EAN-8 through GTIN-14).
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();
    let len = barcode.len();

    if !(8..=14).contains(&len) || !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be 8 to 14 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a required free-text field with a length cap.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Trims a search term. Empty is allowed; more than 100 characters is not.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

/// A refund must say why it happened.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_text("reason", reason, 500)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: 1..=999.
///
/// ```text
/// add_item(qty: 5)
///      │
///      ├── qty <= 0?   → MustBePositive
///      ├── qty > 999?  → OutOfRange
///      └── OK
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Rejects negative amounts (prices, costs, discounts, tendered cash).
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    validate_non_negative("price", cents)
}

/// Payments appended after commit must move money.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// 0 to 10000 bps (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_sku(&product.sku)?;
    validate_product_name(&product.name)?;
    if let Some(barcode) = &product.barcode {
        validate_barcode(barcode)?;
    }
    validate_non_negative("cost", product.cost_cents)?;
    validate_price_cents(product.price_cents)?;
    validate_tax_rate_bps(product.tax_rate_bps)?;
    validate_non_negative("opening_stock", product.opening_stock)?;
    validate_non_negative("min_stock_level", product.min_stock_level)?;
    Ok(())
}

pub fn validate_new_client(client: &NewClient) -> ValidationResult<()> {
    validate_text("first_name", &client.first_name, 100)?;
    validate_text("last_name", &client.last_name, 100)?;
    if let Some(email) = &client.email {
        if !email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "must contain @".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
