use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hourbook_auth::Identity;
use hourbook_contracts::{Client, ClientId, WorkEntry};
use hourbook_store::memory::MemoryReportStore;
use rust_decimal::Decimal;

pub(crate) fn identity(email: &str) -> Identity {
    Identity::from_email(email).expect("test identity must be non-empty")
}

pub(crate) fn at(y: i32, m: u32, d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hour, 0, 0)
        .single()
        .expect("valid test timestamp")
}

pub(crate) fn client(id: i64, owner: &str, name: &str) -> Client {
    Client {
        id: ClientId::new(id).expect("positive test id"),
        name: name.to_string(),
        description: None,
        user_email: owner.to_string(),
        created_at: at(2024, 1, 1, 8),
        updated_at: at(2024, 1, 1, 8),
    }
}

pub(crate) fn entry(
    id: i64,
    client_id: i64,
    owner: &str,
    hours: &str,
    date: &str,
    description: Option<&str>,
) -> WorkEntry {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("valid test date");
    let created_at = date
        .and_hms_opt(9, 0, 0)
        .expect("valid time")
        .and_utc();

    WorkEntry {
        id,
        client_id: ClientId::new(client_id).expect("positive test id"),
        user_email: owner.to_string(),
        hours: hours.parse::<Decimal>().expect("valid test hours"),
        description: description.map(str::to_string),
        date,
        created_at,
        updated_at: created_at,
    }
}

/// Acme (id 1) belongs to a@example.com with two entries; Globex (id 2)
/// belongs to b@example.com.
pub(crate) fn acme_store() -> MemoryReportStore {
    let store = MemoryReportStore::new();
    store.insert_client(client(1, "a@example.com", "Acme"));
    store.insert_client(client(2, "b@example.com", "Globex"));
    store.insert_entry(entry(
        10,
        1,
        "a@example.com",
        "8.5",
        "2024-01-15",
        Some("Discovery workshop"),
    ));
    store.insert_entry(entry(11, 1, "a@example.com", "4.0", "2024-01-17", None));
    store.insert_entry(entry(20, 2, "b@example.com", "6.0", "2024-01-16", None));
    store
}
