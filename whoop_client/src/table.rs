use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, Value>;

/// Records flattened into one row each, nested fields addressed by a dotted
/// path (`score.strain`, `score.zone_duration.zone_one_milli`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn from_records<T: Serialize>(records: &[T]) -> serde_json::Result<Table> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut row = Row::new();
            flatten_into(&mut row, "", serde_json::to_value(record)?);
            rows.push(row);
        }
        Ok(Table { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of all column names in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for key in self.rows.iter().flat_map(|row| row.keys()) {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
        columns
    }

    /// One cell per row; `None` where a row has no such column.
    pub fn column(&self, name: &str) -> Vec<Option<&Value>> {
        self.rows.iter().map(|row| row.get(name)).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows)
    }
}

fn flatten_into(row: &mut Row, prefix: &str, value: Value) {
    match value {
        Value::Object(map) if !map.is_empty() => flatten_object(row, prefix, map),
        other => {
            row.insert(String::from(prefix), other);
        }
    }
}

fn flatten_object(row: &mut Row, prefix: &str, map: Map<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        flatten_into(row, &path, value);
    }
}
