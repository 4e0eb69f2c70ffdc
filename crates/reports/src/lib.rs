//! Report generation and export pipeline.
//!
//! Every operation runs the same precondition chain: parse the client id,
//! verify the client belongs to the requesting identity, then load and total
//! its entries. The three renderers (`summary`, `tabular`, `document`) only
//! ever see the output of that chain.

use hourbook_contracts::InvalidClientId;
use hourbook_store::StoreError;

pub mod aggregate;
pub mod document;
pub mod export_fs;
pub mod ownership;
pub mod summary;
pub mod tabular;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::{Aggregate, aggregate};
pub use document::{
    DocumentRequest, DocumentStream, LayoutError, PageLayout, stream_document,
};
pub use export_fs::{ExportFs, LocalExportFs};
pub use ownership::verify_ownership;
pub use summary::{PreparedReport, build_summary, prepare};
pub use tabular::{DeliveryOutcome, FileDelivery, TabularExporter, TransientFile, render_csv};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    InvalidClientId(#[from] InvalidClientId),
    /// The client does not exist or belongs to another identity. The two
    /// cases are deliberately indistinguishable.
    #[error("client not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("export failure: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

impl ExportError {
    pub(crate) fn io(op: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        ExportError::Io {
            op,
            path: path.display().to_string(),
            source,
        }
    }
}
