use hourbook_auth::Identity;
use hourbook_contracts::{Client, Report, ReportClient, ReportEntry};
use hourbook_store::ReportStore;

use crate::ReportError;
use crate::aggregate::{Aggregate, aggregate};
use crate::ownership::verify_ownership;

/// Output of the shared precondition chain, consumed by every renderer.
#[derive(Debug, Clone)]
pub struct PreparedReport {
    pub client: Client,
    pub aggregate: Aggregate,
}

impl PreparedReport {
    pub fn to_report(&self) -> Report {
        Report {
            client: ReportClient {
                id: self.client.id,
                name: self.client.name.clone(),
            },
            work_entries: self
                .aggregate
                .entries
                .iter()
                .map(ReportEntry::from)
                .collect(),
            total_hours: self.aggregate.total_hours,
            entry_count: self.aggregate.entry_count,
        }
    }
}

/// Verifies ownership, then aggregates. Nothing is loaded for a client the
/// identity does not own.
pub async fn prepare(
    store: &dyn ReportStore,
    raw_client_id: &str,
    identity: &Identity,
) -> Result<PreparedReport, ReportError> {
    let client = verify_ownership(store, raw_client_id, identity).await?;
    let aggregate = aggregate(store, &client, identity).await?;
    Ok(PreparedReport { client, aggregate })
}

pub async fn build_summary(
    store: &dyn ReportStore,
    raw_client_id: &str,
    identity: &Identity,
) -> Result<Report, ReportError> {
    Ok(prepare(store, raw_client_id, identity).await?.to_report())
}
