use hourbook_auth::Identity;
use hourbook_contracts::{Client, ClientId};
use hourbook_store::ReportStore;

use crate::ReportError;

/// Resolves `raw_client_id` to a client owned by `identity`.
///
/// Malformed ids fail before the store is touched. A client owned by someone
/// else comes back as `NotFound`, exactly like a missing one.
pub async fn verify_ownership(
    store: &dyn ReportStore,
    raw_client_id: &str,
    identity: &Identity,
) -> Result<Client, ReportError> {
    let client_id = ClientId::parse(raw_client_id)?;

    store
        .find_client(client_id, identity.email())
        .await?
        .ok_or(ReportError::NotFound)
}
