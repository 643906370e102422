//! Schema reconciliation.
//!
//! Invoked once per table per store-open. Compares the live physical
//! column set against the declared field list and applies the cheapest
//! sufficient DDL: nothing, an additive ALTER, or a full rebuild.
//!
//! The rebuild path renames the existing table aside, recreates it from
//! the declared schema, copies forward the row id plus every column
//! present in both old and new schemas, then drops the renamed table.
//! Row identifiers are preserved for all carried-over rows.

use rusqlite::Connection;

use crate::error::Result;
use crate::schema::{TableSchema, ROW_ID};

/// What the reconciliation pass did to a table.
///
/// Running reconciliation twice against an unchanged schema yields
/// `Unchanged` the second time (no DDL is issued).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Physical table already matches the declared schema.
    Unchanged,
    /// Table did not exist and was created from scratch.
    Created,
    /// Declared-but-absent columns were added additively.
    Extended(usize),
    /// Removed or retyped columns forced a full table rebuild.
    Rebuilt,
}

/// Reconcile one table's physical shape with its declared schema.
pub(crate) fn reconcile_table(
    conn: &mut Connection,
    schema: &TableSchema,
) -> Result<MigrationOutcome> {
    if !table_exists(conn, &schema.name)? {
        conn.execute_batch(&create_ddl(schema))?;
        tracing::info!(table = %schema.name, "created table");
        return Ok(MigrationOutcome::Created);
    }

    let physical = physical_columns(conn, &schema.name)?;

    // A physical column that is no longer declared, or whose declared
    // type changed, cannot be fixed additively.
    let needs_rebuild = physical
        .iter()
        .any(|(name, col_type)| match schema.field(name) {
            Some(field) => !field.field_type.column_type().eq_ignore_ascii_case(col_type),
            None => true,
        });

    if needs_rebuild {
        rebuild_table(conn, schema, &physical)?;
        tracing::info!(table = %schema.name, "rebuilt table");
        return Ok(MigrationOutcome::Rebuilt);
    }

    let missing: Vec<_> = schema
        .fields
        .iter()
        .filter(|field| !physical.iter().any(|(name, _)| *name == field.name))
        .collect();

    if missing.is_empty() {
        return Ok(MigrationOutcome::Unchanged);
    }

    let added = missing.len();
    for field in missing {
        let mut ddl = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            schema.name,
            field.name,
            field.field_type.ddl()
        );
        if let Some(default) = &field.default {
            ddl.push_str(&format!(" DEFAULT {}", default.sql_literal()));
        }
        conn.execute_batch(&ddl)?;
    }
    tracing::info!(table = %schema.name, added, "extended table");
    Ok(MigrationOutcome::Extended(added))
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Live (name, declared type) pairs for a table, row id excluded.
fn physical_columns(conn: &Connection, table: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let rows = stmt.query_map([table], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, col_type) = row?;
        if name != ROW_ID {
            columns.push((name, col_type));
        }
    }
    Ok(columns)
}

fn create_ddl(schema: &TableSchema) -> String {
    let mut columns = vec![format!("{ROW_ID} INTEGER PRIMARY KEY AUTOINCREMENT")];
    for field in &schema.fields {
        let mut column = format!("{} {}", field.name, field.field_type.ddl());
        if let Some(default) = &field.default {
            column.push_str(&format!(" DEFAULT {}", default.sql_literal()));
        }
        columns.push(column);
    }
    format!("CREATE TABLE {} ({})", schema.name, columns.join(", "))
}

fn rebuild_table(
    conn: &mut Connection,
    schema: &TableSchema,
    physical: &[(String, String)],
) -> Result<()> {
    let temp = format!("{}__rebuild", schema.name);

    // Columns present in both old and new schemas, by name. The row id
    // rides along so carried-over rows keep their identifiers.
    let mut carried = vec![ROW_ID.to_string()];
    carried.extend(
        schema
            .fields
            .iter()
            .filter(|field| physical.iter().any(|(name, _)| *name == field.name))
            .map(|field| field.name.clone()),
    );
    let column_list = carried.join(", ");

    let tx = conn.transaction()?;
    tx.execute_batch(&format!("ALTER TABLE {} RENAME TO {temp}", schema.name))?;
    tx.execute_batch(&create_ddl(schema))?;
    tx.execute_batch(&format!(
        "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {temp}",
        schema.name
    ))?;
    tx.execute_batch(&format!("DROP TABLE {temp}"))?;
    tx.commit()?;
    Ok(())
}
