use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use config::ServicesRecord;

/// Durable storage for the service record.
///
/// The registry calls [`ConfigStore::save`] with the complete new record before any
/// mutation becomes visible. An error aborts the mutation.
pub trait ConfigStore: Send + Sync {
    fn save(&self, record: &ServicesRecord) -> anyhow::Result<()>;
}

/// Keeps the last saved record in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<ServicesRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_saved(&self) -> Option<ServicesRecord> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl ConfigStore for MemoryStore {
    fn save(&self, record: &ServicesRecord) -> anyhow::Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
