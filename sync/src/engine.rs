//! Sync/commit engine.
//!
//! Periodically flushes uncommitted rows from monitored tables to a
//! remote sink and marks them committed, staying correct across partial
//! delivery, restarts, and concurrent producers.
//!
//! Rows are pushed one at a time in ascending row-id order and marked
//! committed individually on each positive acknowledgment, never in a
//! batch. Re-running a cycle after a partial failure resends only the
//! rows still flagged uncommitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vigil_store::{Predicate, Select, Settings, Store, TableSchema, ROW_ID};

use crate::error::{Result, SyncError};
use crate::sink::{parse_row_path, row_path, RemoteSink};

const TAG_LAST_COMMIT: &str = "last-commit";

/// Per-table conventions the engine relies on.
#[derive(Debug, Clone)]
pub struct CommitOptions {
    /// Boolean field marking a row as delivered.
    pub committed_field: String,
    /// Integer millisecond field used for the staleness bound and the
    /// retention sweep. `None` disables both filters.
    pub timestamp_field: Option<String>,
    /// Only rows at least this old are pushed.
    pub staleness: Duration,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            committed_field: "committed".to_string(),
            timestamp_field: Some("timestamp".to_string()),
            staleness: Duration::from_secs(60),
        }
    }
}

/// What one commit cycle accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Rows pushed toward the sink.
    pub pushed: usize,
    /// Rows acknowledged and marked committed.
    pub committed: usize,
    /// Rows whose delivery failed; they stay uncommitted.
    pub failed: usize,
}

/// The commit-tracking engine for one device.
pub struct SyncEngine {
    store: Arc<Store>,
    sink: Arc<dyn RemoteSink>,
    /// Monitored tables, de-duplicated by name. Kept separate from the
    /// store's own table registry.
    tables: Mutex<Vec<TableSchema>>,
    /// Binary gate: at most one concurrent commit cycle per instance.
    in_flight: AtomicBool,
    /// Settings owner under which sync state persists.
    engine_id: String,
    options: CommitOptions,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Store>,
        sink: Arc<dyn RemoteSink>,
        engine_id: impl Into<String>,
        options: CommitOptions,
    ) -> Self {
        Self {
            store,
            sink,
            tables: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            engine_id: engine_id.into(),
            options,
        }
    }

    /// Register a table for synchronization.
    ///
    /// The schema must declare the committed flag field. Re-registering
    /// a name is a no-op.
    pub fn monitor_table(&self, schema: TableSchema) -> Result<()> {
        if schema.field(&self.options.committed_field).is_none() {
            return Err(SyncError::MissingCommitFlag(schema.name));
        }

        let mut tables = self.tables.lock();
        if !tables.iter().any(|t| t.name == schema.name) {
            tables.push(schema);
        }
        Ok(())
    }

    /// Names of the monitored tables.
    pub fn monitored(&self) -> Vec<String> {
        self.tables.lock().iter().map(|t| t.name.clone()).collect()
    }

    /// Open a commit cycle. Returns the cycle's commit timestamp.
    ///
    /// Fails with `AlreadyInProgress` when a cycle is running.
    pub fn begin_commit_cycle(&self, now_ms: i64) -> Result<i64> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyInProgress);
        }
        Ok(now_ms)
    }

    /// Close a commit cycle.
    ///
    /// On success the commit timestamp persists as the new
    /// last-successful-commit marker. The in-flight flag clears
    /// regardless of outcome.
    pub fn end_commit_cycle(&self, commit_ts: i64, success: bool) -> Result<()> {
        let persisted = if success {
            self.persist_last_commit(commit_ts)
        } else {
            Ok(())
        };
        self.in_flight.store(false, Ordering::SeqCst);
        persisted
    }

    /// The last successful commit timestamp, surviving restarts.
    pub fn last_successful_commit(&self) -> Result<Option<i64>> {
        let _guard = self.store.acquire()?;
        let bytes = Settings::new(&self.store).get(&self.engine_id, TAG_LAST_COMMIT)?;
        Ok(bytes
            .and_then(|b| String::from_utf8(b).ok())
            .and_then(|s| s.parse().ok()))
    }

    /// Run one full commit cycle at the given wall-clock time.
    pub fn commit(&self, now_ms: i64) -> Result<CommitReport> {
        let commit_ts = self.begin_commit_cycle(now_ms)?;
        match self.push_uncommitted(now_ms) {
            Ok(report) => {
                self.end_commit_cycle(commit_ts, report.failed == 0)?;
                tracing::info!(
                    pushed = report.pushed,
                    committed = report.committed,
                    failed = report.failed,
                    "commit cycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                // Clear the gate; the next scheduled cycle retries.
                let _ = self.end_commit_cycle(commit_ts, false);
                Err(e)
            }
        }
    }

    /// Mark one row committed from an out-of-band acknowledgment path.
    pub fn mark_committed(&self, path: &str) -> Result<bool> {
        let (table, row_id) = parse_row_path(path)
            .ok_or_else(|| SyncError::InvalidRowPath(path.to_string()))?;
        let _guard = self.store.acquire()?;
        Ok(self.store.update(
            &table,
            &[(self.options.committed_field.as_str(), true.into())],
            &[Predicate::equal(ROW_ID, row_id)],
        )?)
    }

    /// Delete rows that are both committed and older than the retention
    /// window. Uncommitted rows are never touched.
    pub fn sweep(&self, now_ms: i64, retention: Duration) -> Result<usize> {
        let Some(ts_field) = self.options.timestamp_field.clone() else {
            return Ok(0);
        };
        let cutoff = now_ms - retention.as_millis() as i64;

        let _guard = self.store.acquire()?;
        let tables = self.tables.lock().clone();
        let mut removed = 0;
        for schema in &tables {
            if schema.field(&ts_field).is_none() {
                continue;
            }
            let predicates = [
                Predicate::equal(self.options.committed_field.as_str(), true),
                Predicate::less(ts_field.as_str(), cutoff),
            ];

            let mut cursor =
                self.store
                    .fetch(&schema.name, &[Select::count(ROW_ID)], &predicates, None)?;
            let expired = if cursor.advance() {
                cursor.integer(&format!("count({ROW_ID})")).unwrap_or(0)
            } else {
                0
            };
            if expired > 0 {
                self.store.erase(&schema.name, &predicates)?;
                removed += expired as usize;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "retention sweep removed committed rows");
        }
        Ok(removed)
    }

    fn persist_last_commit(&self, commit_ts: i64) -> Result<()> {
        let _guard = self.store.acquire()?;
        Settings::new(&self.store).set(
            &self.engine_id,
            TAG_LAST_COMMIT,
            commit_ts.to_string().into_bytes(),
        )?;
        Ok(())
    }

    fn push_uncommitted(&self, now_ms: i64) -> Result<CommitReport> {
        let _guard = self.store.acquire()?;
        let tables = self.tables.lock().clone();

        let mut report = CommitReport::default();
        for schema in &tables {
            let mut predicates = vec![Predicate::equal(
                self.options.committed_field.as_str(),
                false,
            )];
            if let Some(ts_field) = &self.options.timestamp_field {
                if schema.field(ts_field).is_some() {
                    let cutoff = now_ms - self.options.staleness.as_millis() as i64;
                    predicates.push(Predicate::less_equal(ts_field.as_str(), cutoff));
                }
            }

            // Ascending row-id order: re-delivery after a crash resumes
            // progress instead of restarting from an arbitrary point.
            let cursor = self.store.fetch(&schema.name, &[], &predicates, None)?;
            for row in cursor.into_rows() {
                let Some(row_id) = row.row_id() else {
                    continue;
                };
                let path = row_path(&schema.name, row_id);
                let bytes = match serde_json::to_vec(&row) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "row serialization failed");
                        report.failed += 1;
                        continue;
                    }
                };

                report.pushed += 1;
                match self.sink.deliver(&path, &bytes) {
                    Ok(()) => {
                        let marked = self.store.update(
                            &schema.name,
                            &[(self.options.committed_field.as_str(), true.into())],
                            &[Predicate::equal(ROW_ID, row_id)],
                        )?;
                        if marked {
                            report.committed += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "row delivery failed");
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}
