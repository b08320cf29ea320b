//! # ironbox-register: Sale Transaction Manager for Ironbox POS
//!
//! The layer a UI or CLI talks to. It owns open sale drafts and is the only
//! place where a draft becomes a durable sale.
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
//! │  │            ★ ironbox-register (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   SaleTransactionManager ── DraftStore ── RegisterConfig        │   │
//! │  │   LedgerError / ErrorReport                                     │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼────────────────┐  │
//! │  │        ironbox-core         │   │          ironbox-db            │  │
//! │  │  draft, pricing, refunds    │   │  Stock Ledger, numbering,      │  │
//! │  │                             │   │  sale / product repositories   │  │
//! │  └─────────────────────────────┘   └────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use ironbox_core::{Money, PaymentMethod};
//! use ironbox_db::{Database, DbConfig};
//! use ironbox_register::{RegisterConfig, SaleTransactionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegisterConfig::load(None)?;
//! let db = Database::new(DbConfig::new(&config.database_path)).await?;
//! let register = SaleTransactionManager::from_config(db, &config);
//!
//! let draft = register.start_draft("cashier-1", None).await?;
//! register.add_item_by_code(&draft, "HAM001", 2).await?;
//! let receipt = register
//!     .commit(&draft, PaymentMethod::Cash, Money::from_cents(6000), None)
//!     .await?;
//! println!("{} change {}", receipt.sale_number, receipt.change);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drafts;
pub mod error;
pub mod manager;

pub use config::{ConfigError, RegisterConfig};
pub use drafts::{CommitGuard, DraftState, DraftStore};
pub use error::{ErrorCode, ErrorReport, LedgerError, LedgerResult};
pub use manager::{
    CommitReceipt, PaymentReceipt, RefundReceipt, SaleDetail, SaleTransactionManager,
};
