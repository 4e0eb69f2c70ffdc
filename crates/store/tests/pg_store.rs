use std::time::Duration;

use hourbook_contracts::ClientId;
use rust_decimal::Decimal;
use hourbook_store::{PgReportStore, ReportStore};
use sqlx::PgPool;

fn test_db_url() -> Option<String> {
    std::env::var("HOURBOOK_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

struct TestSchema {
    admin: PgPool,
    schema: String,
    store: PgReportStore,
}

impl TestSchema {
    async fn create(db_url: &str) -> Self {
        let schema = format!("hourbook_test_{}", ulid::Ulid::new()).to_lowercase();

        let admin = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await
            .expect("DB connect should succeed");

        sqlx::query(&format!("CREATE SCHEMA {}", schema))
            .execute(&admin)
            .await
            .expect("create schema should succeed");

        let store = PgReportStore::connect_and_migrate(
            &schema_db_url(db_url, &schema),
            2,
            Duration::from_millis(2000),
        )
        .await
        .expect("store init should succeed");

        Self {
            admin,
            schema,
            store,
        }
    }

    async fn insert_client(&self, user_email: &str, name: &str) -> ClientId {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clients (user_email, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_email)
        .bind(name)
        .fetch_one(self.store.pool())
        .await
        .expect("insert client should succeed");
        ClientId::new(id).expect("serial ids are positive")
    }

    async fn insert_entry(
        &self,
        client_id: ClientId,
        user_email: &str,
        hours: &str,
        date: &str,
        created_at: &str,
    ) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO work_entries (client_id, user_email, hours, description, date, created_at, updated_at) \
             VALUES ($1, $2, $3::numeric, NULL, $4::date, $5::timestamptz, $5::timestamptz) RETURNING id",
        )
        .bind(client_id.get())
        .bind(user_email)
        .bind(hours)
        .bind(date)
        .bind(created_at)
        .fetch_one(self.store.pool())
        .await
        .expect("insert entry should succeed")
    }

    async fn teardown(self) {
        self.store.close().await;
        let _ = sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await;
        self.admin.close().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn migrations_are_idempotent_and_enforce_hour_bounds() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping store test; set HOURBOOK_TEST_DB_URL to enable");
        return;
    };

    let schema = TestSchema::create(&db_url).await;
    schema
        .store
        .migrate()
        .await
        .expect("migrations should be idempotent");

    let client_id = schema.insert_client("a@example.com", "Acme").await;
    for bad in ["0", "24.01", "-1"] {
        let err = sqlx::query(
            "INSERT INTO work_entries (client_id, user_email, hours, date) VALUES ($1, $2, $3::numeric, CURRENT_DATE)",
        )
        .bind(client_id.get())
        .bind("a@example.com")
        .bind(bad)
        .execute(schema.store.pool())
        .await;
        assert!(err.is_err(), "hours `{}` must violate the check", bad);
    }

    schema.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_lookup_is_scoped_by_owner() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping store test; set HOURBOOK_TEST_DB_URL to enable");
        return;
    };

    let schema = TestSchema::create(&db_url).await;
    let client_id = schema.insert_client("a@example.com", "Acme").await;

    let owned = schema
        .store
        .find_client(client_id, "a@example.com")
        .await
        .expect("query should succeed")
        .expect("owner should see the client");
    assert_eq!(owned.name, "Acme");

    let foreign = schema
        .store
        .find_client(client_id, "b@example.com")
        .await
        .expect("query should succeed");
    assert!(foreign.is_none());

    let missing = schema
        .store
        .find_client(ClientId::new(i64::MAX).expect("positive"), "a@example.com")
        .await
        .expect("query should succeed");
    assert!(missing.is_none());

    schema.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn entries_are_filtered_and_ordered_newest_first() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping store test; set HOURBOOK_TEST_DB_URL to enable");
        return;
    };

    let schema = TestSchema::create(&db_url).await;
    let owner = "a@example.com";
    let client_id = schema.insert_client(owner, "Acme").await;

    let older = schema
        .insert_entry(client_id, owner, "8.50", "2024-01-15", "2024-01-15T09:00:00Z")
        .await;
    let same_day_first = schema
        .insert_entry(client_id, owner, "1.25", "2024-01-17", "2024-01-17T08:00:00Z")
        .await;
    let same_day_second = schema
        .insert_entry(client_id, owner, "2.75", "2024-01-17", "2024-01-17T18:00:00Z")
        .await;
    // Entry whose own owner field disagrees with the client owner stays hidden.
    schema
        .insert_entry(client_id, "b@example.com", "5.00", "2024-01-20", "2024-01-20T08:00:00Z")
        .await;

    let entries = schema
        .store
        .list_entries(client_id, owner)
        .await
        .expect("query should succeed");

    let ids = entries.iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![same_day_second, same_day_first, older]);

    let total: Decimal = entries.iter().map(|e| e.hours).sum();
    assert_eq!(total, Decimal::new(1250, 2));

    let foreign = schema
        .store
        .list_entries(client_id, "b@example.com")
        .await
        .expect("query should succeed");
    assert!(
        foreign.is_empty(),
        "entries of a client owned by someone else must not be returned"
    );

    schema.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_client_cascades_to_entries() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping store test; set HOURBOOK_TEST_DB_URL to enable");
        return;
    };

    let schema = TestSchema::create(&db_url).await;
    let owner = "a@example.com";
    let client_id = schema.insert_client(owner, "Acme").await;
    schema
        .insert_entry(client_id, owner, "3.00", "2024-02-01", "2024-02-01T08:00:00Z")
        .await;

    sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(client_id.get())
        .execute(schema.store.pool())
        .await
        .expect("delete should succeed");

    let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM work_entries")
        .fetch_one(schema.store.pool())
        .await
        .expect("count should succeed");
    assert_eq!(remaining, 0);

    schema.teardown().await;
}
