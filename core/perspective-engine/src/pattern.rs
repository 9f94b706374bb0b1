//! FILENAME: core/perspective-engine/src/pattern.rs
//! Structure detection for schemaless sources.
//!
//! A data pattern summarizes sampled documents: for every observed key the
//! set of value types seen and, recursively, the columns of nested objects
//! and arrays of objects. Patterns only ever grow; sampling more rows adds
//! types and columns but never removes one.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::definition::DesignerId;
use crate::schema::TableRef;

/// Sampled patterns keyed by the designer id of the node they were sampled for.
pub type DataPatterns = BTreeMap<DesignerId, PerspectiveDataPattern>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternColumnType {
    Null,
    Oid,
    String,
    Number,
    Boolean,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternColumn {
    pub name: String,
    /// Types in first-seen order, without duplicates.
    pub types: Vec<PatternColumnType>,
    pub columns: Vec<PatternColumn>,
}

impl PatternColumn {
    fn new(name: &str) -> Self {
        PatternColumn {
            name: name.to_string(),
            types: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn has_type(&self, column_type: PatternColumnType) -> bool {
        self.types.contains(&column_type)
    }

    /// Nested objects or arrays were seen under this key.
    pub fn is_json(&self) -> bool {
        self.has_type(PatternColumnType::Json)
    }

    pub fn find_column(&self, name: &str) -> Option<&PatternColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn add_type(&mut self, column_type: PatternColumnType) {
        if !self.types.contains(&column_type) {
            self.types.push(column_type);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDataPattern {
    pub table: TableRef,
    pub columns: Vec<PatternColumn>,
}

impl PerspectiveDataPattern {
    pub fn new(table: TableRef) -> Self {
        PerspectiveDataPattern {
            table,
            columns: Vec::new(),
        }
    }

    /// Extends the pattern with more sampled rows.
    pub fn add_rows(&mut self, rows: &[Value]) {
        for row in rows {
            add_object_to_columns(&mut self.columns, row);
        }
    }

    pub fn find_column(&self, name: &str) -> Option<&PatternColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a nested column by its path segments.
    pub fn find_column_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&PatternColumn> {
        let (first, rest) = path.split_first()?;
        let mut column = self.find_column(first.as_ref())?;
        for segment in rest {
            column = column.find_column(segment.as_ref())?;
        }
        Some(column)
    }
}

/// Builds a pattern from sampled rows.
pub fn analyse_data_pattern(table: &TableRef, rows: &[Value]) -> PerspectiveDataPattern {
    let mut pattern = PerspectiveDataPattern::new(table.clone());
    pattern.add_rows(rows);
    pattern
}

pub fn detect_value_type(value: &Value) -> PatternColumnType {
    match value {
        Value::Null => PatternColumnType::Null,
        Value::String(_) => PatternColumnType::String,
        Value::Number(_) => PatternColumnType::Number,
        Value::Bool(_) => PatternColumnType::Boolean,
        Value::Object(map) if map.contains_key("$oid") => PatternColumnType::Oid,
        Value::Object(_) | Value::Array(_) => PatternColumnType::Json,
    }
}

fn add_object_to_columns(columns: &mut Vec<PatternColumn>, row: &Value) {
    let Value::Object(map) = row else {
        return;
    };
    for (key, value) in map {
        let index = match columns.iter().position(|c| &c.name == key) {
            Some(index) => index,
            None => {
                columns.push(PatternColumn::new(key));
                columns.len() - 1
            }
        };
        let column = &mut columns[index];
        let value_type = detect_value_type(value);
        column.add_type(value_type);

        match value {
            Value::Object(_) if value_type != PatternColumnType::Oid => {
                add_object_to_columns(&mut column.columns, value);
            }
            Value::Array(items) => {
                for item in items {
                    add_object_to_columns(&mut column.columns, item);
                }
            }
            _ => {}
        }
    }
}
