//! # Archive Capability
//!
//! Master data that committed sales point at can never be hard-deleted;
//! it is archived (deactivated) instead.
//!
//! ```text
//! remove(id)
//!    │
//!    ├── has_references(id)? ── yes ──► archive(id)      → Removal::Archived
//!    │
//!    └── no ─────────────────────────► hard_delete(id)  → Removal::Deleted
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::client::ClientRepository;
use crate::repository::product::ProductRepository;

/// What `remove` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    Archived,
    Deleted,
}

#[async_trait]
pub trait Archivable {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    /// Whether any stored row refers to `id`.
    async fn has_references(&self, id: &str) -> DbResult<bool>;

    /// Marks the record inactive. It stays readable.
    async fn archive(&self, id: &str) -> DbResult<()>;

    /// Deletes the record outright.
    async fn hard_delete(&self, id: &str) -> DbResult<()>;

    async fn remove(&self, id: &str) -> DbResult<Removal> {
        if self.has_references(id).await? {
            self.archive(id).await?;
            info!(entity = Self::ENTITY, id = %id, "Archived");
            Ok(Removal::Archived)
        } else {
            self.hard_delete(id).await?;
            info!(entity = Self::ENTITY, id = %id, "Deleted");
            Ok(Removal::Deleted)
        }
    }
}

fn affected(rows: u64, entity: &str, id: &str) -> DbResult<()> {
    if rows == 0 {
        Err(DbError::not_found(entity, id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Archivable for ProductRepository {
    const ENTITY: &'static str = "Product";

    async fn has_references(&self, id: &str) -> DbResult<bool> {
        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM sale_items WHERE product_id = ?1)
                OR EXISTS (SELECT 1 FROM stock_movements WHERE product_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(referenced)
    }

    async fn archive(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(chrono::Utc::now())
        .execute(self.pool())
        .await?;
        affected(result.rows_affected(), Self::ENTITY, id)
    }

    async fn hard_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        affected(result.rows_affected(), Self::ENTITY, id)
    }
}

#[async_trait]
impl Archivable for ClientRepository {
    const ENTITY: &'static str = "Client";

    async fn has_references(&self, id: &str) -> DbResult<bool> {
        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sales WHERE client_id = ?1)")
                .bind(id)
                .fetch_one(self.pool())
                .await?;
        Ok(referenced)
    }

    async fn archive(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE clients SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        affected(result.rows_affected(), Self::ENTITY, id)
    }

    async fn hard_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        affected(result.rows_affected(), Self::ENTITY, id)
    }
}
