//! Store - the typed, dynamically-migrated local table store.
//!
//! The store owns the table registry and the reference-counted physical
//! connection. All data operations require an active [`StoreGuard`]
//! obtained from [`Store::acquire`]; without one they fail with
//! `NotOpen`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::conn::{Location, SharedConnection, StoreGuard};
use crate::cursor::{Cursor, Row};
use crate::error::{Result, StoreError};
use crate::migrate::{reconcile_table, MigrationOutcome};
use crate::predicate::{where_clause, Predicate};
use crate::schema::{TableSchema, ROW_ID};
use crate::value::FieldValue;
use crate::TableName;

/// Aggregate modifiers applicable to a projected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Avg,
    Min,
    Max,
    Sum,
}

impl Aggregate {
    fn sql_fn(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Sum => "sum",
        }
    }
}

/// One projected output column: a plain field or an aggregate around it.
#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    Field(String),
    Aggregate(Aggregate, String),
}

impl Select {
    pub fn field(name: impl Into<String>) -> Self {
        Select::Field(name.into())
    }

    pub fn count(name: impl Into<String>) -> Self {
        Select::Aggregate(Aggregate::Count, name.into())
    }

    pub fn avg(name: impl Into<String>) -> Self {
        Select::Aggregate(Aggregate::Avg, name.into())
    }

    pub fn min(name: impl Into<String>) -> Self {
        Select::Aggregate(Aggregate::Min, name.into())
    }

    pub fn max(name: impl Into<String>) -> Self {
        Select::Aggregate(Aggregate::Max, name.into())
    }

    pub fn sum(name: impl Into<String>) -> Self {
        Select::Aggregate(Aggregate::Sum, name.into())
    }

    /// The column expression. Aggregate results come back under this
    /// rendered name, e.g. `count(value)`.
    fn render(&self) -> String {
        match self {
            Select::Field(name) => name.clone(),
            Select::Aggregate(agg, name) => format!("{}({name})", agg.sql_fn()),
        }
    }
}

/// The local record store.
pub struct Store {
    shared: SharedConnection,
    tables: Mutex<HashMap<TableName, TableSchema>>,
}

impl Store {
    /// Create a store backed by a database file.
    ///
    /// No I/O happens until the first [`Store::acquire`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            shared: SharedConnection::new(Location::Disk(path.into())),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Create an in-memory store (useful for tests).
    ///
    /// Contents are lost when the last guard releases.
    pub fn in_memory() -> Self {
        Self {
            shared: SharedConnection::new(Location::Memory),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the store, opening the physical connection on the first
    /// outstanding acquire. The returned guard releases on drop.
    pub fn acquire(&self) -> Result<StoreGuard<'_>> {
        self.shared.acquire()
    }

    /// Register a table and reconcile its physical shape.
    ///
    /// Fails with `DuplicateTable` if the name is already registered in
    /// this store. Requires an active guard.
    pub fn define_table(&self, schema: TableSchema) -> Result<MigrationOutcome> {
        schema.validate()?;

        {
            let mut tables = self.tables.lock();
            if tables.contains_key(&schema.name) {
                return Err(StoreError::DuplicateTable(schema.name));
            }
            tables.insert(schema.name.clone(), schema.clone());
        }

        let outcome = self.shared.with_conn(|conn| reconcile_table(conn, &schema));
        if outcome.is_err() {
            self.tables.lock().remove(&schema.name);
        }
        outcome
    }

    /// The registered schema for a table, if any.
    pub fn schema(&self, table: &str) -> Option<TableSchema> {
        self.tables.lock().get(table).cloned()
    }

    /// Insert one row. Unspecified fields take their declared default.
    ///
    /// Returns `Ok(false)` on a constraint violation (for example a
    /// unique-text collision); other engine failures are errors.
    pub fn add(&self, table: &str, values: &[(&str, FieldValue)]) -> Result<bool> {
        self.require_table(table)?;
        self.shared.with_conn(|conn| insert_row(conn, table, values))
    }

    /// Fetch rows matching the AND of all predicates.
    ///
    /// An empty `select` projects the row id and every declared field.
    /// Rows enumerate in ascending row-id order; an empty result is an
    /// empty cursor, not an error.
    pub fn fetch(
        &self,
        table: &str,
        select: &[Select],
        predicates: &[Predicate],
        limit: Option<u32>,
    ) -> Result<Cursor> {
        let schema = self.require_table(table)?;

        let columns = if select.is_empty() {
            let mut all = vec![ROW_ID.to_string()];
            all.extend(schema.fields.iter().map(|f| f.name.clone()));
            all.join(", ")
        } else {
            select
                .iter()
                .map(Select::render)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let aggregated = select
            .iter()
            .any(|s| matches!(s, Select::Aggregate(_, _)));

        let (clause, binds) = where_clause(predicates);
        let mut sql = format!("SELECT {columns} FROM {table}{clause}");
        if !aggregated {
            sql.push_str(&format!(" ORDER BY {ROW_ID} ASC"));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let binds: Vec<_> = binds.iter().map(|v| v.to_sql()).collect();

        self.shared.with_conn(|conn| query_rows(conn, &sql, &binds))
    }

    /// Overwrite matching rows' named fields.
    ///
    /// Returns whether at least one row changed.
    pub fn update(
        &self,
        table: &str,
        values: &[(&str, FieldValue)],
        predicates: &[Predicate],
    ) -> Result<bool> {
        self.require_table(table)?;
        self.shared
            .with_conn(|conn| update_rows(conn, table, values, predicates))
    }

    /// Upsert: update the row matching `matches` (as equality
    /// predicates) with `extra`, or insert the union of both.
    ///
    /// This is the primitive all persisted-parameter logic is built on.
    pub fn fetch_and_add(
        &self,
        table: &str,
        matches: &[(&str, FieldValue)],
        extra: &[(&str, FieldValue)],
    ) -> Result<bool> {
        self.require_table(table)?;

        self.shared.with_conn(|conn| {
            let predicates: Vec<_> = matches
                .iter()
                .map(|(field, value)| Predicate::equal(*field, value.clone()))
                .collect();

            let (clause, binds) = where_clause(&predicates);
            let sql = format!("SELECT {ROW_ID} FROM {table}{clause} LIMIT 1");
            let binds: Vec<_> = binds.iter().map(|v| v.to_sql()).collect();

            let existing: Option<i64> = {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params_from_iter(binds))?;
                match rows.next()? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                }
            };

            match existing {
                Some(id) => {
                    if extra.is_empty() {
                        return Ok(true);
                    }
                    let by_id = [Predicate::equal(ROW_ID, id)];
                    update_rows(conn, table, extra, &by_id)
                }
                None => {
                    let mut union: Vec<(&str, FieldValue)> = Vec::new();
                    union.extend(matches.iter().map(|(f, v)| (*f, v.clone())));
                    union.extend(extra.iter().map(|(f, v)| (*f, v.clone())));
                    insert_row(conn, table, &union)
                }
            }
        })
    }

    /// Delete matching rows. Returns whether at least one row went away.
    pub fn erase(&self, table: &str, predicates: &[Predicate]) -> Result<bool> {
        self.require_table(table)?;
        self.shared.with_conn(|conn| {
            let (clause, binds) = where_clause(predicates);
            let sql = format!("DELETE FROM {table}{clause}");
            let binds: Vec<_> = binds.iter().map(|v| v.to_sql()).collect();
            let deleted = conn.execute(&sql, rusqlite::params_from_iter(binds))?;
            Ok(deleted > 0)
        })
    }

    fn require_table(&self, table: &str) -> Result<TableSchema> {
        self.schema(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

fn insert_row(conn: &Connection, table: &str, values: &[(&str, FieldValue)]) -> Result<bool> {
    let sql = if values.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let fields: Vec<_> = values.iter().map(|(field, _)| *field).collect();
        let marks = vec!["?"; values.len()].join(", ");
        format!(
            "INSERT INTO {table} ({}) VALUES ({marks})",
            fields.join(", ")
        )
    };
    let binds: Vec<_> = values.iter().map(|(_, value)| value.to_sql()).collect();

    match conn.execute(&sql, rusqlite::params_from_iter(binds)) {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::warn!(table, "insert rejected by constraint");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn update_rows(
    conn: &Connection,
    table: &str,
    values: &[(&str, FieldValue)],
    predicates: &[Predicate],
) -> Result<bool> {
    let assignments = values
        .iter()
        .map(|(field, _)| format!("{field} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let (clause, where_binds) = where_clause(predicates);
    let sql = format!("UPDATE {table} SET {assignments}{clause}");

    let mut binds: Vec<_> = values.iter().map(|(_, value)| value.to_sql()).collect();
    binds.extend(where_binds.iter().map(|v| v.to_sql()));

    let changed = conn.execute(&sql, rusqlite::params_from_iter(binds))?;
    Ok(changed > 0)
}

fn query_rows(conn: &Connection, sql: &str, binds: &[rusqlite::types::Value]) -> Result<Cursor> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(binds.iter().cloned()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = BTreeMap::new();
        for (i, name) in column_names.iter().enumerate() {
            values.insert(name.clone(), FieldValue::from_sql(row.get_ref(i)?));
        }
        out.push(Row::new(values));
    }
    Ok(Cursor::new(out))
}
