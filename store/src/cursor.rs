//! Cursors over fetched rows.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::schema::ROW_ID;
use crate::value::FieldValue;
use crate::RowId;

/// One fetched row: a mapping from field name to value.
///
/// Serializes as a plain JSON document, which is also the shape pushed
/// to a remote sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, FieldValue>,
}

impl Row {
    pub(crate) fn new(values: BTreeMap<String, FieldValue>) -> Self {
        Self { values }
    }

    /// Raw value of a field, if projected.
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// The implicit row id, when projected.
    pub fn row_id(&self) -> Option<RowId> {
        self.values.get(ROW_ID).and_then(FieldValue::as_i64)
    }

    /// Iterate over (field, value) pairs in field-name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A single-use iterator over the rows matching a fetch.
///
/// The cursor starts positioned before the first row; `advance` and
/// `retreat` move it. Closing (or dropping) the cursor invalidates it;
/// the sequence cannot be restarted.
#[derive(Debug)]
pub struct Cursor {
    rows: Vec<Row>,
    pos: isize,
}

impl Cursor {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self { rows, pos: -1 }
    }

    /// Number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the fetch matched no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Move forward. Returns false once positioned past the last row.
    pub fn advance(&mut self) -> bool {
        if self.pos + 1 < self.rows.len() as isize {
            self.pos += 1;
            true
        } else {
            self.pos = self.rows.len() as isize;
            false
        }
    }

    /// Move backward. Returns false once positioned before the first row.
    pub fn retreat(&mut self) -> bool {
        if self.pos > 0 {
            self.pos -= 1;
            true
        } else {
            self.pos = -1;
            false
        }
    }

    /// The current row, if positioned on one.
    pub fn row(&self) -> Option<&Row> {
        if self.pos >= 0 {
            self.rows.get(self.pos as usize)
        } else {
            None
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.row()?.value(field)?.as_text()
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.row()?.value(field)?.as_i64()
    }

    pub fn real(&self, field: &str) -> Option<f64> {
        self.row()?.value(field)?.as_f64()
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.row()?.value(field)?.as_bool()
    }

    pub fn blob(&self, field: &str) -> Option<&[u8]> {
        self.row()?.value(field)?.as_blob()
    }

    /// The current row's id.
    pub fn row_id(&self) -> Option<RowId> {
        self.row()?.row_id()
    }

    /// Consume the cursor, invalidating it.
    pub fn close(self) {}

    /// Consume the cursor and take ownership of the remaining rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}
