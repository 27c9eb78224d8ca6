//! Header-plus-rows table building.
//!
//! The statistics API answers with a JSON array whose first element is the
//! list of column names and whose remaining elements are data rows of the
//! same length. This module turns that payload into a [`Table`] without
//! coercing any values: cells stay strings, and JSON `null` becomes an
//! absent value.

use crate::error::ParseError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One record of a table, keyed by header field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    fields: HashMap<String, Option<String>>,
}

impl Row {
    /// Returns the cell for `field`: `None` if the field is unknown,
    /// `Some(None)` if the cell was `null`.
    pub fn get(&self, field: &str) -> Option<&Option<String>> {
        self.fields.get(field)
    }

    /// Returns the present value of `field`, if any.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.as_deref())
    }

    /// Field names of this row (unordered).
    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// An ordered sequence of rows sharing one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Column names in source order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Rows in source order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns whether the header contains `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|h| h == column)
    }

    /// Fail with [`ParseError::MissingColumn`] unless `column` exists.
    pub fn require_column(&self, column: &str) -> Result<(), ParseError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(ParseError::MissingColumn(column.to_string()))
        }
    }
}

/// Build a table from a raw JSON response body.
pub fn build(raw: &str) -> Result<Table, ParseError> {
    let value: Value = serde_json::from_str(raw)?;
    build_from_value(value)
}

/// Build a table from an already decoded JSON value.
pub fn build_from_value(value: Value) -> Result<Table, ParseError> {
    let Value::Array(elements) = value else {
        return Err(ParseError::NotArray);
    };

    let mut elements = elements.into_iter().enumerate();
    let (_, first) = elements.next().ok_or(ParseError::Empty)?;
    let header = parse_header(first)?;

    let rows = elements
        .map(|(index, element)| parse_row(index, element, &header))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Built table: columns {:?}, {} rows", header, rows.len());

    Ok(Table { header, rows })
}

fn parse_header(value: Value) -> Result<Vec<String>, ParseError> {
    let Value::Array(cells) = value else {
        return Err(ParseError::RowNotArray { index: 0 });
    };

    let mut seen = HashSet::new();
    let mut header = Vec::with_capacity(cells.len());

    for (index, cell) in cells.into_iter().enumerate() {
        let Value::String(name) = cell else {
            return Err(ParseError::HeaderCell { index });
        };
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateHeader(name));
        }
        header.push(name);
    }

    Ok(header)
}

fn parse_row(index: usize, value: Value, header: &[String]) -> Result<Row, ParseError> {
    let Value::Array(cells) = value else {
        return Err(ParseError::RowNotArray { index });
    };

    if cells.len() != header.len() {
        return Err(ParseError::RowLength {
            row: index,
            expected: header.len(),
            found: cells.len(),
        });
    }

    let mut fields = HashMap::with_capacity(header.len());
    for (field, cell) in header.iter().zip(cells) {
        let text = match cell {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Array(_) | Value::Object(_) => {
                return Err(ParseError::NestedValue {
                    row: index,
                    field: field.clone(),
                })
            }
        };
        fields.insert(field.clone(), text);
    }

    Ok(Row { fields })
}
