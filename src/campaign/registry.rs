use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use shipyard_common::RunRecord;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// One live run: a writer lock held for the whole of a step, and the last
/// published snapshot that readers see without waiting for that step.
#[derive(Debug)]
pub struct RunSlot {
    record: Mutex<RunRecord>,
    published: RwLock<RunRecord>,
}

impl RunSlot {
    fn new(record: RunRecord) -> Self {
        Self {
            published: RwLock::new(record.clone()),
            record: Mutex::new(record),
        }
    }

    /// Exclusive access for a step. A racing build-complete signal waits
    /// here and then sees the post-step state.
    pub async fn lock(&self) -> MutexGuard<'_, RunRecord> {
        self.record.lock().await
    }

    /// Make `record` the state readers observe.
    pub fn publish(&self, record: &RunRecord) {
        let mut published = self.published.write().unwrap_or_else(|e| e.into_inner());
        *published = record.clone();
    }

    /// Last published state. Never waits for an in-flight step.
    pub fn snapshot(&self) -> RunRecord {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

pub type RunHandle = Arc<RunSlot>;

/// In-process table of live runs. Each run has its own lock; touching one
/// run never blocks another, and reads never block at all.
#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<DashMap<Uuid, RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RunRecord) -> RunHandle {
        let id = record.id;
        let handle = Arc::new(RunSlot::new(record));
        self.runs.insert(id, handle.clone());
        handle
    }

    pub fn handle(&self, id: &Uuid) -> Option<RunHandle> {
        self.runs.get(id).map(|entry| entry.value().clone())
    }

    /// Last published snapshot of one run.
    pub fn get(&self, id: &Uuid) -> Option<RunRecord> {
        self.handle(id).map(|handle| handle.snapshot())
    }

    /// Snapshots of every run, oldest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> =
            self.runs.iter().map(|e| e.value().snapshot()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
