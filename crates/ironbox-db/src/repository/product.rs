//! # Product Repository
//!
//! Product master data: lookup, search and edits.
//!
//! ## Stock Column
//! `insert` seeds `quantity` from `opening_stock` without a movement, and
//! `update` never touches it. Every later change to `quantity` goes through
//! the Stock Ledger.
//!
//! ## Lookup Paths
//! ```text
//! scanner / keypad input
//!        │
//!        ▼
//! find_by_code(code)
//!        │
//!        ├── SKU match?      → product
//!        ├── barcode match?  → product
//!        └── neither         → None
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use ironbox_core::validation::{
    validate_barcode, validate_non_negative, validate_price_cents, validate_product_name,
    validate_search_query, validate_sku, validate_tax_rate_bps, validate_text,
    validate_new_product,
};
use ironbox_core::{NewProduct, Product, ProductUpdate, ValidationError};

use crate::error::{DbError, DbResult};

/// Column list shared by every product SELECT.
pub(crate) const PRODUCT_COLUMNS: &str = r#"
    id, sku, barcode, name, description, cost_cents, price_cents, tax_rate_bps,
    quantity, opening_stock, min_stock_level, is_active, created_at, updated_at
"#;

const DEFAULT_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product after validation. On-hand quantity starts at
    /// `opening_stock`.
    pub async fn insert(&self, new: NewProduct) -> DbResult<Product> {
        validate_new_product(&new)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: new.sku.trim().to_string(),
            barcode: new.barcode.map(|b| b.trim().to_string()),
            name: new.name.trim().to_string(),
            description: new.description,
            cost_cents: new.cost_cents,
            price_cents: new.price_cents,
            tax_rate_bps: new.tax_rate_bps,
            quantity: new.opening_stock,
            opening_stock: new.opening_stock,
            min_stock_level: new.min_stock_level,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, description, cost_cents, price_cents,
                tax_rate_bps, quantity, opening_stock, min_stock_level,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.cost_cents)
        .bind(product.price_cents)
        .bind(product.tax_rate_bps)
        .bind(product.quantity)
        .bind(product.opening_stock)
        .bind(product.min_stock_level)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("barcode") => {
                DbError::duplicate(field, product.barcode.clone().unwrap_or_default())
            }
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.sku),
            other => other,
        })?;

        info!(id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Reads a product on the caller's connection.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Product> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Resolves scanner or keypad input: SKU first, then barcode.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        if let Some(product) = self.get_by_sku(code).await? {
            return Ok(Some(product));
        }
        self.get_by_barcode(code).await
    }

    /// Active products whose name, SKU or barcode contains `term`, by name.
    ///
    /// An empty term lists active products.
    pub async fn search(&self, term: &str, limit: Option<u32>) -> DbResult<Vec<Product>> {
        let term = validate_search_query(term)?;
        let limit = i64::from(limit.unwrap_or(DEFAULT_SEARCH_LIMIT));

        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE is_active = 1
              AND (?1 = ''
                   OR name LIKE '%' || ?1 || '%'
                   OR sku LIKE '%' || ?1 || '%'
                   OR barcode LIKE '%' || ?1 || '%')
            ORDER BY name
            LIMIT ?2
            "#
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(&term)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(term = %term, count = products.len(), "Product search");
        Ok(products)
    }

    /// Applies the fields present in `update`. Absent fields keep their
    /// stored value; `quantity` and `opening_stock` cannot be changed here.
    pub async fn update(&self, id: &str, update: ProductUpdate) -> DbResult<Product> {
        if update.is_empty() {
            return Err(ValidationError::EmptyUpdate {
                entity: "product".to_string(),
            }
            .into());
        }
        validate_update(&update)?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku             = COALESCE(?2, sku),
                barcode         = COALESCE(?3, barcode),
                name            = COALESCE(?4, name),
                description     = COALESCE(?5, description),
                cost_cents      = COALESCE(?6, cost_cents),
                price_cents     = COALESCE(?7, price_cents),
                tax_rate_bps    = COALESCE(?8, tax_rate_bps),
                min_stock_level = COALESCE(?9, min_stock_level),
                is_active       = COALESCE(?10, is_active),
                updated_at      = ?11
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.sku.as_deref().map(str::trim))
        .bind(update.barcode.as_deref().map(str::trim))
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(update.cost_cents)
        .bind(update.price_cents)
        .bind(update.tax_rate_bps)
        .bind(update.min_stock_level)
        .bind(update.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(id = %id, "Product updated");
        self.get_by_id(id).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn validate_update(update: &ProductUpdate) -> Result<(), ValidationError> {
    if let Some(sku) = &update.sku {
        validate_sku(sku)?;
    }
    if let Some(barcode) = &update.barcode {
        validate_barcode(barcode)?;
    }
    if let Some(name) = &update.name {
        validate_product_name(name)?;
    }
    if let Some(description) = &update.description {
        validate_text("description", description, 1000)?;
    }
    if let Some(cost) = update.cost_cents {
        validate_non_negative("cost", cost)?;
    }
    if let Some(price) = update.price_cents {
        validate_price_cents(price)?;
    }
    if let Some(bps) = update.tax_rate_bps {
        validate_tax_rate_bps(bps)?;
    }
    if let Some(min) = update.min_stock_level {
        validate_non_negative("min_stock_level", min)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn drill_bits() -> NewProduct {
        NewProduct {
            sku: "DRL004".to_string(),
            barcode: Some("4006381333931".to_string()),
            name: "Drill Bits Set HSS".to_string(),
            description: Some("13 piece".to_string()),
            cost_cents: 1580,
            price_cents: 2999,
            tax_rate_bps: 1300,
            opening_stock: 15,
            min_stock_level: 8,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let created = repo.insert(drill_bits()).await.unwrap();
        assert_eq!(created.quantity, 15);
        assert_eq!(created.opening_stock, 15);

        let by_id = repo.get_by_id(&created.id).await.unwrap();
        assert_eq!(by_id.sku, "DRL004");
        assert_eq!(by_id.tax_rate_bps, 1300);

        let by_sku = repo.find_by_code("DRL004").await.unwrap().unwrap();
        let by_barcode = repo.find_by_code("4006381333931").await.unwrap().unwrap();
        assert_eq!(by_sku.id, created.id);
        assert_eq!(by_barcode.id, created.id);
        assert!(repo.find_by_code("NOPE").await.unwrap().is_none());

        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(drill_bits()).await.unwrap();

        let mut dup = drill_bits();
        dup.barcode = None;
        let err = repo.insert(dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "DRL004"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_product_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut bad = drill_bits();
        bad.opening_stock = -1;

        assert!(matches!(
            db.products().insert(bad).await,
            Err(DbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_search_active_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let drill = repo.insert(drill_bits()).await.unwrap();
        let mut tape = drill_bits();
        tape.sku = "TAP005".to_string();
        tape.barcode = None;
        tape.name = "Duct Tape Silver 50mm".to_string();
        repo.insert(tape).await.unwrap();

        assert_eq!(repo.search("drill", None).await.unwrap().len(), 1);
        assert_eq!(repo.search("", None).await.unwrap().len(), 2);

        repo.update(
            &drill.id,
            ProductUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(repo.search("drill", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_absent_fields() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let created = repo.insert(drill_bits()).await.unwrap();

        let updated = repo
            .update(
                &created.id,
                ProductUpdate {
                    price_cents: Some(3199),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.price_cents, 3199);
        assert_eq!(updated.name, "Drill Bits Set HSS");
        assert_eq!(updated.quantity, 15);

        assert!(matches!(
            repo.update(&created.id, ProductUpdate::default()).await,
            Err(DbError::Validation(ValidationError::EmptyUpdate { .. }))
        ));
        assert!(matches!(
            repo.update(
                "missing",
                ProductUpdate {
                    name: Some("x".into()),
                    ..Default::default()
                }
            )
            .await,
            Err(DbError::NotFound { .. })
        ));
    }
}
