use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use shipyard_common::{RunRecord, RunStatus};
use uuid::Uuid;

use crate::campaign::{RunStore, StatusUpdate};

/// Async-safe handle to the run database.
///
/// Wraps `ShipyardDb` behind `Arc<Mutex>` and runs every call on tokio's
/// blocking pool so SQLite I/O never stalls async workers.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ShipyardDb>>,
}

impl DbHandle {
    pub fn new(db: ShipyardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ShipyardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct ShipyardDb {
    conn: Connection,
}

const RUN_COLUMNS: &str = "id, status, iterations, max_iterations, external_id, preview_location, \
     spec, criteria, last_report, created_at, updated_at";

impl ShipyardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    status TEXT NOT NULL DEFAULT 'created',
                    iterations INTEGER NOT NULL DEFAULT 0,
                    max_iterations INTEGER NOT NULL,
                    external_id TEXT,
                    preview_location TEXT,
                    spec TEXT NOT NULL,
                    criteria TEXT NOT NULL,
                    last_report TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────

    pub fn upsert_run(&self, run: &RunRecord) -> Result<()> {
        let spec = serde_json::to_string(&run.spec).context("Failed to encode spec")?;
        let criteria = serde_json::to_string(&run.criteria).context("Failed to encode criteria")?;
        let report = run
            .last_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode report")?;
        self.conn
            .execute(
                "INSERT INTO runs (id, status, iterations, max_iterations, external_id, preview_location,
                                   spec, criteria, last_report, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    iterations = excluded.iterations,
                    max_iterations = excluded.max_iterations,
                    external_id = excluded.external_id,
                    preview_location = excluded.preview_location,
                    spec = excluded.spec,
                    criteria = excluded.criteria,
                    last_report = excluded.last_report,
                    updated_at = excluded.updated_at",
                params![
                    run.id.to_string(),
                    run.status.as_str(),
                    run.iterations,
                    run.max_iterations,
                    run.external_id,
                    run.preview_location,
                    spec,
                    criteria,
                    report,
                    run.created_at.to_rfc3339(),
                    run.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert run")?;
        Ok(())
    }

    /// Apply a status change. Absent optional fields keep their stored value.
    pub fn update_run_status(&self, update: &StatusUpdate) -> Result<()> {
        let report = update
            .last_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode report")?;
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET
                    status = ?1,
                    iterations = COALESCE(?2, iterations),
                    preview_location = COALESCE(?3, preview_location),
                    last_report = COALESCE(?4, last_report),
                    updated_at = ?5
                 WHERE id = ?6",
                params![
                    update.status.as_str(),
                    update.iterations,
                    update.preview_location,
                    report,
                    Utc::now().to_rfc3339(),
                    update.id.to_string(),
                ],
            )
            .context("Failed to update run status")?;
        if changed == 0 {
            anyhow::bail!("run {} not found", update.id);
        }
        Ok(())
    }

    pub fn get_run(&self, id: Uuid) -> Result<Option<RunRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![id.to_string()],
                RunRow::from_row,
            )
            .optional()
            .context("Failed to query run")?;
        row.map(RunRow::into_record).transpose()
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at, id"))
            .context("Failed to prepare list_runs")?;
        let rows = stmt
            .query_map([], RunRow::from_row)
            .context("Failed to query runs")?;
        let mut runs = Vec::new();
        for row in rows {
            let r = row.context("Failed to read run row")?;
            runs.push(r.into_record()?);
        }
        Ok(runs)
    }
}

/// Intermediate row struct for runs.
struct RunRow {
    id: String,
    status: String,
    iterations: u32,
    max_iterations: u32,
    external_id: Option<String>,
    preview_location: Option<String>,
    spec: String,
    criteria: String,
    last_report: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            iterations: row.get(2)?,
            max_iterations: row.get(3)?,
            external_id: row.get(4)?,
            preview_location: row.get(5)?,
            spec: row.get(6)?,
            criteria: row.get(7)?,
            last_report: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<RunRecord> {
        let status = RunStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse run status")?;
        let last_report = self
            .last_report
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("Failed to parse run report JSON")?;
        Ok(RunRecord {
            id: Uuid::parse_str(&self.id).context("Failed to parse run id")?,
            status,
            iterations: self.iterations,
            max_iterations: self.max_iterations,
            external_id: self.external_id,
            preview_location: self.preview_location,
            spec: serde_json::from_str(&self.spec).context("Failed to parse run spec JSON")?,
            criteria: serde_json::from_str(&self.criteria)
                .context("Failed to parse run criteria JSON")?,
            last_report,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Failed to parse timestamp '{}'", s))?
        .with_timezone(&Utc))
}

/// [`RunStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteRunStore {
    db: DbHandle,
}

impl SqliteRunStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(DbHandle::new(ShipyardDb::new(path)?)))
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn upsert_run(&self, record: &RunRecord) -> Result<()> {
        let record = record.clone();
        self.db.call(move |db| db.upsert_run(&record)).await
    }

    async fn update_run_status(&self, update: &StatusUpdate) -> Result<()> {
        let update = update.clone();
        self.db.call(move |db| db.update_run_status(&update)).await
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<RunRecord>> {
        self.db.call(move |db| db.get_run(id)).await
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        self.db.call(|db| db.list_runs()).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
