//! Stored row representation.
//!
//! Rows are what the [`Repository`](crate::Repository) hands back: the
//! previously persisted state of one entity. With relation-id projection a
//! row carries foreign-key columns instead of hydrated related objects.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row loaded from storage.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(names, values)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Extract the values of `columns` in order.
    ///
    /// Returns `None` when any column is missing or NULL: such a row has no
    /// usable identity.
    pub fn key_values(&self, columns: &[&str]) -> Option<Vec<Value>> {
        if columns.is_empty() {
            return None;
        }
        columns
            .iter()
            .map(|col| match self.get_by_name(col) {
                Some(v) if !v.is_null() => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_row() -> Row {
        Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("title", Value::Text("hello".into())),
            ("category_id", Value::Null),
        ])
    }

    #[test]
    fn by_name_access() {
        let row = post_row();
        assert_eq!(row.get_by_name("id"), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("category_id"), Some(&Value::Null));
        assert_eq!(row.get_by_name("nope"), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn iter_preserves_column_order() {
        let row = post_row();
        let columns: Vec<&str> = row.iter().map(|(name, _)| name).collect();
        assert_eq!(columns, vec!["id", "title", "category_id"]);
    }

    #[test]
    fn key_values_require_non_null_columns() {
        let row = post_row();
        assert_eq!(row.key_values(&["id"]), Some(vec![Value::BigInt(1)]));
        assert_eq!(row.key_values(&["category_id"]), None);
        assert_eq!(row.key_values(&["missing"]), None);
        assert_eq!(row.key_values(&[]), None);
    }
}
