use hourbook_auth::Identity;
use hourbook_contracts::{Client, WorkEntry};
use hourbook_store::ReportStore;
use rust_decimal::Decimal;

use crate::ReportError;

/// Entries of one client together with totals derived from exactly that set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub entries: Vec<WorkEntry>,
    pub total_hours: Decimal,
    pub entry_count: usize,
}

impl Aggregate {
    pub fn from_entries(entries: Vec<WorkEntry>) -> Self {
        let total_hours = entries.iter().map(|e| e.hours).sum();
        let entry_count = entries.len();
        Self {
            entries,
            total_hours,
            entry_count,
        }
    }
}

/// Loads and totals the entries of a client that already passed
/// [`crate::verify_ownership`] for the same identity.
pub async fn aggregate(
    store: &dyn ReportStore,
    client: &Client,
    identity: &Identity,
) -> Result<Aggregate, ReportError> {
    let entries = store.list_entries(client.id, identity.email()).await?;
    Ok(Aggregate::from_entries(entries))
}
