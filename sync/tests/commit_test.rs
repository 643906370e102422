//! Integration tests for the sync/commit engine: idempotence under
//! partial delivery, persisted sync state, and the retention sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vigil_store::{
    settings_schema, FieldDef, FieldType, Origin, Predicate, Store, TableSchema,
};
use vigil_sync::{
    CommitOptions, CommitScheduler, DeliveryError, RemoteSink, SyncEngine, SyncError,
};

/// Sink that accepts everything except paths on its reject list.
#[derive(Default)]
struct ScriptedSink {
    delivered: Mutex<Vec<String>>,
    rejected: Mutex<HashSet<String>>,
}

impl ScriptedSink {
    fn reject(&self, path: &str) {
        self.rejected.lock().insert(path.to_string());
    }

    fn clear_rejections(&self) {
        self.rejected.lock().clear();
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

impl RemoteSink for ScriptedSink {
    fn deliver(&self, path: &str, _bytes: &[u8]) -> Result<(), DeliveryError> {
        if self.rejected.lock().contains(path) {
            return Err(DeliveryError::new("upload refused"));
        }
        self.delivered.lock().push(path.to_string());
        Ok(())
    }
}

fn vitals_schema() -> TableSchema {
    TableSchema::new(
        "vitals",
        Origin::PatientWatch,
        vec![
            FieldDef::new("value", FieldType::Real),
            FieldDef::new("timestamp", FieldType::BigInt),
            FieldDef::with_default("committed", FieldType::Boolean, false),
        ],
    )
}

fn add_reading(store: &Store, value: f64, timestamp: i64) {
    assert!(store
        .add(
            "vitals",
            &[("value", value.into()), ("timestamp", timestamp.into())],
        )
        .unwrap());
}

const NOW: i64 = 10_000_000;

fn options() -> CommitOptions {
    CommitOptions {
        staleness: Duration::from_secs(60),
        ..CommitOptions::default()
    }
}

#[test]
fn partial_failure_commits_exactly_the_delivered_rows() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();
    for value in [1.0, 2.0, 3.0] {
        add_reading(&store, value, 1_000);
    }

    let sink = Arc::new(ScriptedSink::default());
    sink.reject("/vitals/3");

    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();

    let report = engine.commit(NOW).unwrap();
    assert_eq!(report.pushed, 3);
    assert_eq!(report.committed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(sink.delivered(), vec!["/vitals/1", "/vitals/2"]);

    // A failed cycle does not move the last-success marker.
    assert_eq!(engine.last_successful_commit().unwrap(), None);

    // Exactly the delivered rows are flagged.
    let cursor = store
        .fetch("vitals", &[], &[Predicate::equal("committed", true)], None)
        .unwrap();
    assert_eq!(cursor.len(), 2);
}

#[test]
fn rerun_after_partial_failure_resends_only_the_remainder() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();
    for value in [1.0, 2.0, 3.0] {
        add_reading(&store, value, 1_000);
    }

    let sink = Arc::new(ScriptedSink::default());
    sink.reject("/vitals/3");

    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();

    engine.commit(NOW).unwrap();
    sink.clear_rejections();

    let report = engine.commit(NOW + 1_000).unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.committed, 1);
    assert_eq!(report.failed, 0);

    // Rows 1 and 2 were never re-sent.
    assert_eq!(
        sink.delivered(),
        vec!["/vitals/1", "/vitals/2", "/vitals/3"]
    );

    // The clean cycle persisted its commit timestamp.
    assert_eq!(engine.last_successful_commit().unwrap(), Some(NOW + 1_000));

    // Nothing left to push.
    let report = engine.commit(NOW + 2_000).unwrap();
    assert_eq!(report.pushed, 0);
}

#[test]
fn fresh_rows_wait_for_the_staleness_bound() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();

    add_reading(&store, 1.0, NOW - 120_000); // old enough
    add_reading(&store, 2.0, NOW - 1_000); // too fresh

    let sink = Arc::new(ScriptedSink::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();

    let report = engine.commit(NOW).unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(sink.delivered(), vec!["/vitals/1"]);
}

#[test]
fn sync_state_survives_engine_restart() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();

    let sink = Arc::new(ScriptedSink::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();
    engine.commit(NOW).unwrap();

    // A new instance over the same store sees the marker.
    let resumed = SyncEngine::new(
        Arc::clone(&store),
        sink as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    assert_eq!(resumed.last_successful_commit().unwrap(), Some(NOW));
}

#[test]
fn sweep_only_removes_old_committed_rows() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();

    let retention = Duration::from_secs(3600);
    let old = NOW - 2 * 3600 * 1000;
    let recent = NOW - 60_000;

    add_reading(&store, 1.0, old); // old, will be committed -> swept
    add_reading(&store, 2.0, old); // old, stays uncommitted -> kept
    add_reading(&store, 3.0, recent); // recent, committed -> kept

    store
        .update(
            "vitals",
            &[("committed", true.into())],
            &[Predicate::equal("id", 1i64)],
        )
        .unwrap();
    store
        .update(
            "vitals",
            &[("committed", true.into())],
            &[Predicate::equal("id", 3i64)],
        )
        .unwrap();

    let sink = Arc::new(ScriptedSink::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        sink as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();

    let removed = engine.sweep(NOW, retention).unwrap();
    assert_eq!(removed, 1);

    let mut remaining = Vec::new();
    let mut cursor = store.fetch("vitals", &[], &[], None).unwrap();
    while cursor.advance() {
        remaining.push(cursor.row_id().unwrap());
    }
    assert_eq!(remaining, vec![2, 3]);
}

#[test]
fn commit_rejects_concurrent_cycles() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();

    let sink = Arc::new(ScriptedSink::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        sink as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );

    let ts = engine.begin_commit_cycle(NOW).unwrap();
    assert!(matches!(
        engine.commit(NOW),
        Err(SyncError::AlreadyInProgress)
    ));
    engine.end_commit_cycle(ts, true).unwrap();

    assert_eq!(engine.last_successful_commit().unwrap(), Some(NOW));
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_a_catch_up_cycle_on_start() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();
    add_reading(&store, 1.0, 1_000); // ancient: always past staleness

    let sink = Arc::new(ScriptedSink::default());
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
        "sync",
        options(),
    ));
    engine.monitor_table(vitals_schema()).unwrap();

    // No prior success recorded: the first cycle runs immediately.
    let scheduler = CommitScheduler::spawn(Arc::clone(&engine), Duration::from_secs(300));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(sink.delivered(), vec!["/vitals/1"]);
    scheduler.stop().await;
}

#[test]
fn out_of_band_acknowledgment_marks_one_row() {
    let store = Arc::new(Store::in_memory());
    let _guard = store.acquire().unwrap();
    store.define_table(settings_schema()).unwrap();
    store.define_table(vitals_schema()).unwrap();
    add_reading(&store, 1.0, 1_000);
    add_reading(&store, 2.0, 1_000);

    let sink = Arc::new(ScriptedSink::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        sink as Arc<dyn RemoteSink>,
        "sync",
        options(),
    );
    engine.monitor_table(vitals_schema()).unwrap();

    assert!(engine.mark_committed("/vitals/2").unwrap());
    assert!(!engine.mark_committed("/vitals/99").unwrap());
    assert!(matches!(
        engine.mark_committed("vitals-2"),
        Err(SyncError::InvalidRowPath(_))
    ));

    let cursor = store
        .fetch("vitals", &[], &[Predicate::equal("committed", true)], None)
        .unwrap();
    assert_eq!(cursor.len(), 1);
}
