//! Durable mirror of run records.
//!
//! The registry is authoritative while the process lives; a store only
//! mirrors it for inspection and crash recovery, so the controller logs store
//! failures instead of propagating them.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use shipyard_common::{AcceptanceReport, RunRecord, RunStatus};
use uuid::Uuid;

/// Partial update applied after every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub id: Uuid,
    pub status: RunStatus,
    pub iterations: Option<u32>,
    pub preview_location: Option<String>,
    pub last_report: Option<AcceptanceReport>,
}

impl StatusUpdate {
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            iterations: Some(record.iterations),
            preview_location: record.preview_location.clone(),
            last_report: record.last_report.clone(),
        }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn upsert_run(&self, record: &RunRecord) -> Result<()>;

    /// Apply a status change; absent optional fields keep their stored value.
    async fn update_run_status(&self, update: &StatusUpdate) -> Result<()>;

    async fn get_run(&self, id: Uuid) -> Result<Option<RunRecord>>;

    async fn list_runs(&self) -> Result<Vec<RunRecord>>;
}

#[derive(Default)]
pub struct MemoryRunStore {
    runs: DashMap<Uuid, RunRecord>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn upsert_run(&self, record: &RunRecord) -> Result<()> {
        self.runs.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_run_status(&self, update: &StatusUpdate) -> Result<()> {
        let Some(mut run) = self.runs.get_mut(&update.id) else {
            anyhow::bail!("run {} not found", update.id);
        };
        run.status = update.status;
        if let Some(iterations) = update.iterations {
            run.iterations = iterations;
        }
        if let Some(preview) = &update.preview_location {
            run.preview_location = Some(preview.clone());
        }
        if let Some(report) = &update.last_report {
            run.last_report = Some(report.clone());
        }
        run.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<RunRecord>> {
        Ok(self.runs.get(&id).map(|r| r.value().clone()))
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }
}
