//! CSV export delivered through a transient file.
//!
//! Lifecycle per request, strictly in order: name the file, ensure the export
//! directory, write the whole file, stream it to the caller, remove it. The
//! removal is tied to a guard so it also runs when delivery fails or the
//! caller goes away mid-download.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use hourbook_contracts::{Client, WorkEntry, format_date, format_hours, format_timestamp};
use tokio::io::AsyncReadExt;
use tracing::{Instrument, Span};
use ulid::Ulid;

use crate::ExportError;
use crate::export_fs::{ExportFs, ExportReader};

pub const CSV_HEADER: [&str; 4] = ["Date", "Hours", "Description", "Created At"];

const MAX_STEM_CHARS: usize = 64;
const READ_CHUNK_BYTES: usize = 16 * 1024;

pub fn render_csv(entries: &[WorkEntry]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for entry in entries {
        writer.write_record([
            format_date(entry.date),
            format_hours(entry.hours),
            entry.description.clone().unwrap_or_default(),
            format_timestamp(entry.created_at),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Csv(err.into_error().into()))
}

/// Keeps ASCII alphanumerics and replaces everything else with `_`.
pub fn sanitize_file_stem(name: &str) -> String {
    let stem = name
        .chars()
        .take(MAX_STEM_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();

    if stem.is_empty() {
        "client".to_string()
    } else {
        stem
    }
}

#[derive(Clone)]
pub struct TabularExporter {
    fs: Arc<dyn ExportFs>,
    dir: PathBuf,
}

impl TabularExporter {
    pub fn new(fs: Arc<dyn ExportFs>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    /// Renders `entries` and persists them. The returned file is complete on
    /// disk; on any failure nothing is left behind to deliver. Logs from the
    /// later delivery and removal are attached to the span current here.
    pub async fn write(
        &self,
        client: &Client,
        entries: &[WorkEntry],
        now: DateTime<Utc>,
    ) -> Result<TransientFile, ExportError> {
        let stem = sanitize_file_stem(&client.name);
        let millis = now.timestamp_millis();
        let file_name = format!("{stem}_{millis}_{}.csv", Ulid::new());
        let download_name = format!("report-{}.csv", client.id);
        let path = self.dir.join(file_name);

        let dir_exists = self
            .fs
            .exists(&self.dir)
            .await
            .map_err(|err| ExportError::io("stat export dir", &self.dir, err))?;
        if !dir_exists {
            self.fs
                .create_dir_all(&self.dir)
                .await
                .map_err(|err| ExportError::io("create export dir", &self.dir, err))?;
        }

        let body = render_csv(entries)?;

        if let Err(err) = self.fs.write(&path, &body).await {
            remove_quietly(self.fs.as_ref(), &path).await;
            return Err(ExportError::io("write export file", &path, err));
        }

        tracing::debug!(
            path = %path.display(),
            bytes = body.len(),
            rows = entries.len(),
            "transient export written"
        );

        Ok(TransientFile {
            guard: CleanupGuard {
                fs: self.fs.clone(),
                path,
                armed: true,
                span: Span::current(),
                on_finish: None,
            },
            download_name,
            len: body.len() as u64,
        })
    }
}

/// A fully written export file awaiting delivery.
pub struct TransientFile {
    guard: CleanupGuard,
    download_name: String,
    len: u64,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.guard.path
    }

    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Registers a callback that receives the delivery outcome once the
    /// stream ends or is dropped. Not called when [`Self::deliver`] fails.
    pub fn on_finish(mut self, hook: impl FnOnce(DeliveryOutcome) + Send + 'static) -> Self {
        self.guard.on_finish = Some(Box::new(hook));
        self
    }

    /// Opens the file for streaming. If it cannot be opened the file is
    /// removed before the error is returned.
    pub async fn deliver(self) -> Result<FileDelivery, ExportError> {
        let TransientFile {
            mut guard,
            download_name,
            len,
        } = self;

        let reader = match guard.fs.open(&guard.path).await {
            Ok(reader) => reader,
            Err(err) => {
                let err = ExportError::io("open export file", &guard.path, err);
                guard.on_finish = None;
                guard.release().await;
                return Err(err);
            }
        };

        Ok(FileDelivery::new(reader, guard, download_name, len))
    }
}

/// Byte stream over a transient file. The file is removed once the stream
/// reaches EOF, hits a read error, or is dropped early.
pub struct FileDelivery {
    inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>,
    download_name: String,
    len: u64,
}

enum DeliveryState {
    Streaming {
        reader: ExportReader,
        guard: CleanupGuard,
        sent: u64,
    },
    Finished,
}

impl FileDelivery {
    fn new(reader: ExportReader, guard: CleanupGuard, download_name: String, len: u64) -> Self {
        let initial = DeliveryState::Streaming {
            reader,
            guard,
            sent: 0,
        };

        let inner = futures_util::stream::unfold(initial, |state| {
            let span = match &state {
                DeliveryState::Streaming { guard, .. } => guard.span.clone(),
                DeliveryState::Finished => Span::none(),
            };
            step(state).instrument(span)
        });

        Self {
            inner: Box::pin(inner),
            download_name,
            len,
        }
    }

    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

async fn step(state: DeliveryState) -> Option<(io::Result<Bytes>, DeliveryState)> {
    let DeliveryState::Streaming {
        mut reader,
        mut guard,
        sent,
    } = state
    else {
        return None;
    };

    let mut buf = BytesMut::with_capacity(READ_CHUNK_BYTES);
    match reader.read_buf(&mut buf).await {
        Ok(0) => {
            drop(reader);
            tracing::debug!(path = %guard.path.display(), bytes = sent, "export delivered");
            guard.report(DeliveryOutcome::Delivered);
            guard.release().await;
            None
        }
        Ok(n) => Some((
            Ok(buf.freeze()),
            DeliveryState::Streaming {
                reader,
                guard,
                sent: sent + n as u64,
            },
        )),
        Err(err) => {
            drop(reader);
            tracing::warn!(
                path = %guard.path.display(),
                bytes = sent,
                error = %err,
                "export delivery failed"
            );
            guard.report(DeliveryOutcome::Failed);
            guard.release().await;
            Some((Err(err), DeliveryState::Finished))
        }
    }
}

impl Stream for FileDelivery {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// How a [`FileDelivery`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
    Abandoned,
}

impl DeliveryOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "ok",
            DeliveryOutcome::Failed => "error",
            DeliveryOutcome::Abandoned => "aborted",
        }
    }
}

type FinishHook = Box<dyn FnOnce(DeliveryOutcome) + Send>;

struct CleanupGuard {
    fs: Arc<dyn ExportFs>,
    path: PathBuf,
    armed: bool,
    span: Span,
    on_finish: Option<FinishHook>,
}

impl CleanupGuard {
    fn report(&mut self, outcome: DeliveryOutcome) {
        if let Some(hook) = self.on_finish.take() {
            hook(outcome);
        }
    }

    async fn release(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        remove_quietly(self.fs.as_ref(), &self.path).await;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.report(DeliveryOutcome::Abandoned);
        if !self.armed {
            return;
        }
        self.armed = false;

        let span = self.span.clone();
        let _entered = span.enter();
        let fs = self.fs.clone();
        let path = std::mem::take(&mut self.path);
        tracing::debug!(path = %path.display(), "export delivery abandoned; scheduling removal");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(
                    async move {
                        remove_quietly(fs.as_ref(), &path).await;
                    }
                    .instrument(span.clone()),
                );
            }
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "no runtime available; transient export left behind"
                );
            }
        }
    }
}

async fn remove_quietly(fs: &dyn ExportFs, path: &Path) {
    match fs.remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove transient export");
        }
    }
}
