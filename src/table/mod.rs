// src/table/mod.rs
pub mod csv_io;
pub mod join;

use std::collections::BTreeMap;

use crate::error::{MigrateError, Result};

/// One record of a table: column name → string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `column`, or `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.value(column).unwrap_or("")
    }

    /// Value stored under `column`, distinguishing absent from empty.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// An in-memory table: an ordered header plus rows.
///
/// Every row carries a value (possibly empty) for every header. Header
/// positions only decide column order when the table is written out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Empty table with the given header. Repeated names keep their last position.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique = Vec::new();
        for h in headers {
            push_header(&mut unique, h.into());
        }
        Self {
            headers: unique,
            rows: Vec::new(),
        }
    }

    /// Build a table from positional records, as read from a delimited file.
    ///
    /// Each record must have exactly one field per header. When a header name
    /// repeats, the later column's value wins.
    pub fn from_records<I>(headers: Vec<String>, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut table = Table::new(headers.iter().cloned());
        for (idx, record) in records.into_iter().enumerate() {
            if record.len() != headers.len() {
                return Err(MigrateError::RowArity {
                    row: idx + 1,
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            table.rows.push(headers.iter().cloned().zip(record).collect());
        }
        Ok(table)
    }

    /// Append a row, filling any header it lacks with `""`.
    pub fn push(&mut self, mut row: Row) {
        for h in &self.headers {
            if row.value(h).is_none() {
                row.insert(h.clone(), "");
            }
        }
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Fail with `MissingHeader` on the first required column this table lacks.
    /// `table` names the source in the error.
    pub fn require_headers<I, S>(&self, table: &str, required: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in required {
            let name = name.as_ref();
            if !self.has_header(name) {
                return Err(MigrateError::MissingHeader {
                    table: table.to_string(),
                    header: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Append `name`, moving an existing entry of the same name to the end.
pub(crate) fn push_header(headers: &mut Vec<String>, name: String) {
    headers.retain(|h| *h != name);
    headers.push(name);
}
