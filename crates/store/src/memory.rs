//! In-process `ReportStore` used by unit and router tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hourbook_contracts::{Client, ClientId, WorkEntry};

use crate::{ReportStore, StoreError};

#[derive(Default)]
pub struct MemoryReportStore {
    clients: Mutex<Vec<Client>>,
    entries: Mutex<Vec<WorkEntry>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_client(&self, client: Client) {
        lock(&self.clients).push(client);
    }

    pub fn insert_entry(&self, entry: WorkEntry) {
        lock(&self.entries).push(entry);
    }

    /// Number of queries served so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent query fail with `StoreError::Timeout`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin_call(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn find_client(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Option<Client>, StoreError> {
        self.begin_call()?;
        Ok(lock(&self.clients)
            .iter()
            .find(|c| c.id == client_id && c.user_email == user_email)
            .cloned())
    }

    async fn list_entries(
        &self,
        client_id: ClientId,
        user_email: &str,
    ) -> Result<Vec<WorkEntry>, StoreError> {
        self.begin_call()?;

        let owned_client = lock(&self.clients)
            .iter()
            .any(|c| c.id == client_id && c.user_email == user_email);
        if !owned_client {
            return Ok(Vec::new());
        }

        let mut entries = lock(&self.entries)
            .iter()
            .filter(|e| e.client_id == client_id && e.user_email == user_email)
            .cloned()
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.begin_call()
    }
}
