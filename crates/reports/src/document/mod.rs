//! Paginated PDF report, streamed to the caller while it is being laid out.

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use hourbook_contracts::{Client, format_date, format_hours};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::aggregate::Aggregate;

mod font;
mod layout;
mod pdf;

pub use layout::{DrawOp, LayoutError, Page, PageLayout, Paginator, TableRow};
pub use pdf::PdfWriter;

pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// Pages buffered ahead of a slow reader.
const CHANNEL_DEPTH: usize = 4;

/// Everything that ends up in the document, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub title: String,
    pub stats: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl DocumentRequest {
    pub fn new(client: &Client, aggregate: &Aggregate, generated_at: DateTime<Utc>) -> Self {
        Self {
            title: format!("Time Report: {}", client.name),
            stats: vec![
                format!("Total Hours: {}", format_hours(aggregate.total_hours)),
                format!("Total Entries: {}", aggregate.entry_count),
                format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            ],
            rows: aggregate
                .entries
                .iter()
                .map(|entry| TableRow {
                    date: format_date(entry.date),
                    hours: format_hours(entry.hours),
                    description: entry.description.clone(),
                })
                .collect(),
        }
    }
}

/// Spawns the renderer and returns its output as a byte stream. Each page is
/// sent as soon as it is complete; the trailer follows the last page. When
/// the receiving side is dropped the renderer stops at its next send.
pub fn stream_document(request: DocumentRequest, layout: PageLayout) -> DocumentStream {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
    tokio::spawn(render_into(request, layout, tx).in_current_span());

    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    }))
}

async fn render_into(request: DocumentRequest, layout: PageLayout, tx: mpsc::Sender<Bytes>) {
    let mut writer = PdfWriter::begin(&layout);
    let mut paginator = Paginator::new(layout, &request.title, &request.stats);

    for row in &request.rows {
        if let Some(page) = paginator.push_row(row) {
            writer.write_page(&page);
            if tx.send(writer.take_pending()).await.is_err() {
                tracing::warn!(
                    pages_sent = writer.page_count(),
                    "document receiver closed; abandoning render"
                );
                return;
            }
        }
    }

    writer.write_page(&paginator.finish());
    let pages = writer.page_count();
    if tx.send(writer.finish()).await.is_err() {
        tracing::warn!(pages, "document receiver closed before trailer");
        return;
    }

    tracing::debug!(pages, rows = request.rows.len(), "document rendered");
}
