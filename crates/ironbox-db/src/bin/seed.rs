//! # Seed Data Generator
//!
//! Populates a database with sample hardware products for development.
//!
//! ## Usage
//! ```bash
//! # Five catalogue products plus 200 generated fasteners (default)
//! cargo run -p ironbox-db --bin seed
//!
//! # Custom amount of generated products
//! cargo run -p ironbox-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p ironbox-db --bin seed -- --db ./data/ironbox.db
//! ```
//!
//! Every product gets its opening stock through `insert`, so a freshly
//! seeded database reconciles with zero movements.

use std::env;

use ironbox_core::NewProduct;
use ironbox_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TAX_RATE_BPS: u32 = 1300;

/// (sku, barcode, name, price, cost, opening stock, minimum)
const CATALOGUE: &[(&str, Option<&str>, &str, i64, i64, i64, i64)] = &[
    ("HAM001", Some("123456789012"), "Claw Hammer 16oz", 2499, 1250, 30, 10),
    ("SCR002", Some("234567890123"), "Phillips Screwdriver Set", 1699, 875, 25, 10),
    ("NUT003", Some("345678901234"), "Hex Nuts M8 (50 pack)", 699, 325, 120, 50),
    ("DRL004", Some("456789012345"), "Drill Bits Set HSS", 2999, 1580, 15, 8),
    ("TAP005", None, "Duct Tape Silver 50mm", 899, 420, 40, 10),
];

const FASTENERS: &[&str] = &["Wood Screw", "Machine Bolt", "Wall Anchor", "Washer", "Rivet"];
const SIZES: &[(&str, i64)] = &[("M4", 0), ("M5", 40), ("M6", 80), ("M8", 150), ("M10", 220)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ironbox=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./ironbox_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Ironbox POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Generated fastener products (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./ironbox_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Ironbox POS Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("Database already has {} products; skipping seed.", existing);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut inserted = 0;

    for &(sku, barcode, name, price, cost, stock, min) in CATALOGUE {
        let product = NewProduct {
            sku: sku.to_string(),
            barcode: barcode.map(str::to_string),
            name: name.to_string(),
            description: None,
            cost_cents: cost,
            price_cents: price,
            tax_rate_bps: TAX_RATE_BPS,
            opening_stock: stock,
            min_stock_level: min,
        };
        match db.products().insert(product).await {
            Ok(_) => inserted += 1,
            Err(e) => warn!(sku, error = %e, "Failed to insert catalogue product"),
        }
    }

    let variants = FASTENERS
        .iter()
        .flat_map(|name| SIZES.iter().map(move |size| (*name, *size)));

    for (seq, (name, (size, addon))) in variants.cycle().take(count).enumerate() {
        match db.products().insert(generate_fastener(seq, name, size, addon)).await {
            Ok(_) => inserted += 1,
            Err(e) => warn!(seq, error = %e, "Failed to insert generated product"),
        }
    }

    info!(inserted, elapsed = ?start.elapsed(), "Seed complete");

    let low = db.ledger().low_stock().await?;
    println!("Inserted {} products in {:?}", inserted, start.elapsed());
    println!("{} products start at or below their minimum level", low.len());

    db.close().await;
    Ok(())
}

/// Deterministic fastener pack; `seq` keeps SKUs and barcodes unique.
fn generate_fastener(seq: usize, name: &str, size: &str, addon: i64) -> NewProduct {
    let prefix: String = name
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .collect::<String>()
        .to_uppercase();

    let price_cents = 149 + ((seq * 37) % 900) as i64 + addon;

    NewProduct {
        sku: format!("FST-{}-{:04}", prefix, seq),
        barcode: Some(format!("2{:012}", seq)),
        name: format!("{} {} (25 pack)", name, size),
        description: None,
        cost_cents: price_cents * (55 + (seq % 20) as i64) / 100,
        price_cents,
        tax_rate_bps: TAX_RATE_BPS,
        opening_stock: (seq % 80) as i64,
        min_stock_level: 10,
    }
}
