//! Reference-counted connection lifetime.
//!
//! The physical SQLite connection opens on the first acquire and closes
//! only when the last outstanding acquire releases it. The transition
//! across zero is serialized under one mutex so concurrent acquire and
//! release calls from multiple threads stay correct.

use std::path::PathBuf;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Where the physical database lives.
#[derive(Debug, Clone)]
pub(crate) enum Location {
    Disk(PathBuf),
    /// In-memory database. Contents are lost when the reference count
    /// drops to zero and the connection closes.
    Memory,
}

struct ConnState {
    refs: usize,
    conn: Option<Connection>,
}

/// The shared connection slot behind a store.
pub(crate) struct SharedConnection {
    location: Location,
    state: Mutex<ConnState>,
}

impl SharedConnection {
    pub(crate) fn new(location: Location) -> Self {
        Self {
            location,
            state: Mutex::new(ConnState {
                refs: 0,
                conn: None,
            }),
        }
    }

    /// Increment the reference count, opening the connection on 0 -> 1.
    pub(crate) fn acquire(&self) -> Result<StoreGuard<'_>> {
        let mut state = self.state.lock();
        if state.refs == 0 {
            let conn = match &self.location {
                Location::Disk(path) => Connection::open(path)?,
                Location::Memory => Connection::open_in_memory()?,
            };
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA busy_timeout=5000;",
            )?;
            tracing::debug!("store connection opened");
            state.conn = Some(conn);
        }
        state.refs += 1;
        Ok(StoreGuard { shared: self })
    }

    /// Decrement the reference count, closing the connection on 1 -> 0.
    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.refs > 0, "release without matching acquire");
        state.refs = state.refs.saturating_sub(1);
        if state.refs == 0 {
            state.conn = None;
            tracing::debug!("store connection closed");
        }
    }

    /// Run `f` against the open connection.
    ///
    /// Fails with `NotOpen` when no guard is outstanding.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        match state.conn.as_mut() {
            Some(conn) => f(conn),
            None => Err(StoreError::NotOpen),
        }
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        self.state.lock().refs
    }
}

/// Scoped acquisition of the store connection.
///
/// Releases on drop, so every call site releases on all exit paths,
/// including error paths.
pub struct StoreGuard<'a> {
    shared: &'a SharedConnection,
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        self.shared.release();
    }
}
