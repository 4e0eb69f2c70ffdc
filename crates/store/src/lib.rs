use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hourbook_contracts::{Client, ClientId, WorkEntry};
use sqlx::Row;
use sqlx::postgres::{PgPoolOptions, PgRow};

#[cfg(feature = "memory")]
pub mod memory;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,
    #[error("store sql error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("store returned an undecodable row: {0}")]
    Decode(String),
}

/// Read-only queries the report pipeline runs. Every method is scoped by the
/// owning identity; there is no unscoped lookup.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Returns the client only when it exists and belongs to `user_email`.
    async fn find_client(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Option<Client>, StoreError>;

    /// Entries of one client owned by `user_email`, newest work date first.
    /// Same-date entries are ordered by `created_at` descending, then `id`
    /// descending.
    async fn list_entries(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Vec<WorkEntry>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgReportStore {
    pool: sqlx::PgPool,
    query_timeout: Duration,
}

const FIND_CLIENT_SQL: &str = "SELECT id, user_email, name, description, created_at, updated_at \
     FROM clients \
     WHERE id = $1 AND user_email = $2";

const LIST_ENTRIES_SQL: &str = "SELECT we.id, we.client_id, we.user_email, we.hours, \
            we.description, we.date, we.created_at, we.updated_at \
     FROM work_entries we \
     JOIN clients c ON c.id = we.client_id \
     WHERE we.client_id = $1 AND we.user_email = $2 AND c.user_email = $2 \
     ORDER BY we.date DESC, we.created_at DESC, we.id DESC";

impl PgReportStore {
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            Duration::from_secs(5),
            PgPoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self::from_pool(pool, query_timeout))
    }

    pub fn from_pool(pool: sqlx::PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub async fn connect_and_migrate(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, max_connections, query_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn find_client(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Option<Client>, StoreError> {
        let row = tokio::time::timeout(
            self.query_timeout,
            sqlx::query(FIND_CLIENT_SQL)
                .bind(client_id.get())
                .bind(user_email)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(client_from_row).transpose()
    }

    async fn list_entries(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Vec<WorkEntry>, StoreError> {
        let rows = tokio::time::timeout(
            self.query_timeout,
            sqlx::query(LIST_ENTRIES_SQL)
                .bind(client_id.get())
                .bind(user_email)
                .fetch_all(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        rows.iter().map(entry_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::timeout(
            self.query_timeout,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }
}

fn client_from_row(row: &PgRow) -> Result<Client, StoreError> {
    let id: i64 = row.try_get("id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Client {
        id: ClientId::new(id)
            .ok_or_else(|| StoreError::Decode(format!("client id {} is not positive", id)))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        user_email: row.try_get("user_email")?,
        created_at,
        updated_at,
    })
}

fn entry_from_row(row: &PgRow) -> Result<WorkEntry, StoreError> {
    let client_id: i64 = row.try_get("client_id")?;
    let date: NaiveDate = row.try_get("date")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(WorkEntry {
        id: row.try_get("id")?,
        client_id: ClientId::new(client_id).ok_or_else(|| {
            StoreError::Decode(format!("client id {} is not positive", client_id))
        })?,
        user_email: row.try_get("user_email")?,
        hours: row.try_get("hours")?,
        description: row.try_get("description")?,
        date,
        created_at,
        updated_at,
    })
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
