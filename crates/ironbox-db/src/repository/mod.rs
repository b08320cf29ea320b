//! # Repositories
//!
//! One module per table family. Pool-backed methods open their own
//! connection; associated functions taking `&mut SqliteConnection` run on a
//! caller's transaction.
//!
//! - [`product`] - product master data
//! - [`client`] - clients and customer codes
//! - [`sale`] - sale headers, lines and payments
//! - [`stock`] - the Stock Ledger and its movement log
//! - [`numbering`] - sale numbers, customer codes, refund numbers
//! - [`archive`] - archive-or-delete for referenced master data

pub mod archive;
pub mod client;
pub mod numbering;
pub mod product;
pub mod sale;
pub mod stock;
