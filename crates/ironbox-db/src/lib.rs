//! # ironbox-db: Database Layer for Ironbox POS
//!
//! SQLite persistence for the sale-and-inventory ledger, using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ironbox POS Data Flow                              │
//! │                                                                         │
//! │  SaleTransactionManager::commit (ironbox-register)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ironbox-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ClientRepo    │    │ 001_ledger_  │  │   │
//! │  │   │               │    │ SaleRepo      │    │   schema.sql │  │   │
//! │  │   │               │    │ StockLedger   │    │              │  │   │
//! │  │   │               │    │ numbering     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories, the Stock Ledger and the Numbering Service
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ironbox_db::{Database, DbConfig, StockAdjustment};
//!
//! let db = Database::new(DbConfig::new("ironbox.db")).await?;
//!
//! if let Some(hammer) = db.products().find_by_code("HAM001").await? {
//!     db.ledger().receive(&hammer.id, 12, None, None).await?;
//! }
//!
//! let breakage = StockAdjustment::correction("p-123", -2).notes(Some("dropped".into()));
//! db.ledger().adjust(&breakage).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{begin_write, Database, DbConfig};

pub use repository::archive::{Archivable, Removal};
pub use repository::client::ClientRepository;
pub use repository::numbering::{next_customer_code, next_refund_number, next_sale_number};
pub use repository::product::ProductRepository;
pub use repository::sale::{SaleFilter, SaleRepository};
pub use repository::stock::{Reconciliation, StockAdjustment, StockLedger};
