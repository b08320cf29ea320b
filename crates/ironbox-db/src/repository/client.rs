//! # Client Repository
//!
//! Customers that sales can be attributed to. Each new client gets a
//! customer code (`CYYYYMMNNNN`) from the Numbering Service inside the same
//! transaction as its insert.

use chrono::{Local, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use ironbox_core::validation::{validate_new_client, validate_text};
use ironbox_core::{Client, ClientUpdate, NewClient, ValidationError};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::numbering::next_customer_code;

const CLIENT_COLUMNS: &str = r#"
    id, customer_code, first_name, last_name, email, phone, is_active, created_at
"#;

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    /// Creates a client with the next customer code for the current month.
    ///
    /// A lost race on the code is retried once.
    pub async fn create(&self, new: NewClient) -> DbResult<Client> {
        validate_new_client(&new)?;

        match self.try_create(&new).await {
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Customer code collision, retrying");
                self.try_create(&new).await
            }
            other => other,
        }
    }

    async fn try_create(&self, new: &NewClient) -> DbResult<Client> {
        let mut tx = begin_write(&self.pool).await?;

        let customer_code = next_customer_code(&mut tx, Local::now().date_naive()).await?;

        let client = Client {
            id: Uuid::new_v4().to_string(),
            customer_code,
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO clients (
                id, customer_code, first_name, last_name, email, phone, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&client.id)
        .bind(&client.customer_code)
        .bind(&client.first_name)
        .bind(&client.last_name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.is_active)
        .bind(client.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id = %client.id, customer_code = %client.customer_code, "Client created");
        Ok(client)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Client> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1");

        sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Client", id))
    }

    pub async fn get_by_code(&self, customer_code: &str) -> DbResult<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE customer_code = ?1");

        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(customer_code.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    /// Whether an active client with this id exists.
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM clients WHERE id = ?1 AND is_active = 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn update(&self, id: &str, update: ClientUpdate) -> DbResult<Client> {
        if update.is_empty() {
            return Err(ValidationError::EmptyUpdate {
                entity: "client".to_string(),
            }
            .into());
        }
        if let Some(first) = &update.first_name {
            validate_text("first_name", first, 100)?;
        }
        if let Some(last) = &update.last_name {
            validate_text("last_name", last, 100)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE clients SET
                first_name = COALESCE(?2, first_name),
                last_name  = COALESCE(?3, last_name),
                email      = COALESCE(?4, email),
                phone      = COALESCE(?5, phone),
                is_active  = COALESCE(?6, is_active)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.first_name.as_deref().map(str::trim))
        .bind(update.last_name.as_deref().map(str::trim))
        .bind(&update.email)
        .bind(&update.phone)
        .bind(update.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        info!(id = %id, "Client updated");
        self.get_by_id(id).await
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn ana() -> NewClient {
        NewClient {
            first_name: "Ana".to_string(),
            last_name: "Silva".to_string(),
            email: Some("ana@example.com".to_string()),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_codes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.clients();

        let first = repo.create(ana()).await.unwrap();
        let second = repo.create(ana()).await.unwrap();

        let prefix = format!("C{}", Local::now().format("%Y%m"));
        assert_eq!(first.customer_code, format!("{prefix}0001"));
        assert_eq!(second.customer_code, format!("{prefix}0002"));

        let found = repo.get_by_code(&first.customer_code).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.full_name(), "Ana Silva");
    }

    #[tokio::test]
    async fn test_inactive_client_does_not_exist_for_sales() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.clients();
        let client = repo.create(ana()).await.unwrap();

        assert!(repo.exists(&client.id).await.unwrap());

        repo.update(
            &client.id,
            ClientUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(!repo.exists(&client.id).await.unwrap());
        assert!(!repo.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut bad = ana();
        bad.email = Some("not-an-email".to_string());

        assert!(matches!(
            db.clients().create(bad).await,
            Err(DbError::Validation(_))
        ));
    }
}
