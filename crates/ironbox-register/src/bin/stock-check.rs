//! # Stock Check
//!
//! Prints low-stock products and verifies that every product's on-hand
//! quantity matches its opening stock plus the sum of its ledger movements.
//!
//! ## Usage
//! ```bash
//! # Report against the configured database
//! cargo run -p ironbox-register --bin stock-check
//!
//! # Report against a specific file
//! cargo run -p ironbox-register --bin stock-check -- --db ./ironbox_dev.db
//!
//! # Top up every product with nothing on hand by N units, then report
//! cargo run -p ironbox-register --bin stock-check -- --restock 24
//! ```
//!
//! Exits with status 1 when any product fails to reconcile.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use ironbox_db::{Database, DbConfig};
use ironbox_register::{RegisterConfig, SaleTransactionManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ACTOR: &str = "stock-check";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ironbox=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut restock: Option<i64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--restock" | "-r" => {
                if i + 1 < args.len() {
                    restock = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Ironbox POS Stock Check");
                println!();
                println!("Usage: stock-check [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file (default: from register.toml)");
                println!("      --config <PATH>    Register configuration file");
                println!("  -r, --restock <N>      Add N units to each product with none on hand");
                println!("  -h, --help             Show this help message");
                return Ok(ExitCode::SUCCESS);
            }
            _ => {}
        }
        i += 1;
    }

    let config = RegisterConfig::load(config_path.as_deref())?;
    let db_path = db_path.unwrap_or_else(|| config.database_path.clone());

    println!("{} - Stock Check", config.store_name);
    println!("Database: {}", db_path.display());
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let register = SaleTransactionManager::from_config(db, &config);

    let low = register.low_stock_products().await?;
    println!("Low stock ({}):", low.len());
    for product in &low {
        println!(
            "  {:<14} {:<36} on hand {:>5}  min {:>5}  price {}",
            product.sku,
            product.name,
            product.quantity,
            product.min_stock_level,
            config.format_currency(product.price_cents)
        );
    }

    if let Some(units) = restock {
        let empty: Vec<_> = low.iter().filter(|p| p.quantity == 0).collect();
        for product in &empty {
            let on_hand = register
                .adjust_stock(
                    &product.id,
                    units,
                    Some("stock-check restock".to_string()),
                    Some(ACTOR.to_string()),
                )
                .await?;
            info!(sku = %product.sku, units, on_hand, "Restocked");
        }
        println!("Added {} units to {} empty products", units, empty.len());
    }

    println!();
    let report = register.reconcile_all().await?;
    let unbalanced: Vec<_> = report.iter().filter(|r| !r.balanced).collect();

    for r in &unbalanced {
        error!(
            sku = %r.sku,
            opening = r.opening_stock,
            movements = r.movement_total,
            on_hand = r.on_hand,
            "Stock does not reconcile"
        );
        println!(
            "  MISMATCH {:<14} opening {:>5} + movements {:>6} != on hand {:>5}",
            r.sku, r.opening_stock, r.movement_total, r.on_hand
        );
    }
    println!(
        "Reconciled {} products, {} mismatched",
        report.len(),
        unbalanced.len()
    );

    register.database().close().await;

    Ok(if unbalanced.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
