//! # Database Error Types
//!
//! Error types for database operations and Stock Ledger refusals.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        Stock Ledger refusal                 │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  DbError (this module) ← categorised: constraint, busy, stock          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError (ironbox-register) ← discriminated, coded for the UI      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ironbox_core::ValidationError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate SKU or barcode
    /// - Two commits racing for the same sale number
    /// - Two client inserts racing for the same customer code
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another connection holds the write lock (`SQLITE_BUSY`).
    ///
    /// ## When This Occurs
    /// - Two transactions read the same numbering state and both try to write
    /// - busy_timeout elapsed while waiting for a writer
    #[error("Database busy: {0}")]
    Busy(String),

    /// A non-adjustment movement would take stock below zero.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// An adjustment would take stock below zero.
    #[error("Adjustment of {delta} would make stock negative for product {product_id} (on hand {on_hand})")]
    NegativeStock {
        product_id: String,
        on_hand: i64,
        delta: i64,
    },

    /// Input rejected before any statement ran.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether re-running the whole transaction may succeed.
    ///
    /// True for lock contention and for a lost race on a generated number
    /// (`sales.sale_number`, `clients.customer_code`). A duplicate SKU is not
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Busy(_) => true,
            DbError::UniqueViolation { field, .. } => {
                field.contains("sale_number") || field.contains("customer_code")
            }
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → constraint / busy / query failure
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();
                // SQLITE_BUSY = 5, SQLITE_BUSY_RECOVERY = 261, SQLITE_BUSY_SNAPSHOT = 517
                let busy_code = matches!(code.as_deref(), Some("5") | Some("261") | Some("517"));

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if busy_code || msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
