//! Row-matching predicates.
//!
//! A predicate is a single comparison constraint on one field.
//! Predicates combine with logical AND only; there is no OR and no NOT.

use crate::value::FieldValue;

/// A comparison constraint on a named field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equal { field: String, value: FieldValue },
    Less { field: String, value: FieldValue },
    LessEqual { field: String, value: FieldValue },
    Greater { field: String, value: FieldValue },
    GreaterEqual { field: String, value: FieldValue },
    Range {
        field: String,
        first: FieldValue,
        last: FieldValue,
    },
}

impl Predicate {
    pub fn equal(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn less(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::Less {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn less_equal(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::LessEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn greater(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::Greater {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn greater_equal(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::GreaterEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(
        field: impl Into<String>,
        first: impl Into<FieldValue>,
        last: impl Into<FieldValue>,
    ) -> Self {
        Predicate::Range {
            field: field.into(),
            first: first.into(),
            last: last.into(),
        }
    }

    /// The field this predicate constrains.
    pub fn field(&self) -> &str {
        match self {
            Predicate::Equal { field, .. }
            | Predicate::Less { field, .. }
            | Predicate::LessEqual { field, .. }
            | Predicate::Greater { field, .. }
            | Predicate::GreaterEqual { field, .. }
            | Predicate::Range { field, .. } => field,
        }
    }

    /// Render to a SQL fragment plus its bind values.
    pub(crate) fn to_sql(&self) -> (String, Vec<&FieldValue>) {
        match self {
            Predicate::Equal { field, value } => (format!("{field} = ?"), vec![value]),
            Predicate::Less { field, value } => (format!("{field} < ?"), vec![value]),
            Predicate::LessEqual { field, value } => (format!("{field} <= ?"), vec![value]),
            Predicate::Greater { field, value } => (format!("{field} > ?"), vec![value]),
            Predicate::GreaterEqual { field, value } => (format!("{field} >= ?"), vec![value]),
            Predicate::Range { field, first, last } => {
                (format!("{field} BETWEEN ? AND ?"), vec![first, last])
            }
        }
    }
}

/// Render a predicate list as an AND-joined WHERE clause.
///
/// Returns an empty clause (and no bind values) for an empty list.
pub(crate) fn where_clause(predicates: &[Predicate]) -> (String, Vec<&FieldValue>) {
    if predicates.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut fragments = Vec::with_capacity(predicates.len());
    let mut binds = Vec::new();
    for predicate in predicates {
        let (fragment, mut values) = predicate.to_sql();
        fragments.push(fragment);
        binds.append(&mut values);
    }

    (format!(" WHERE {}", fragments.join(" AND ")), binds)
}
