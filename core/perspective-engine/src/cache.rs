//! FILENAME: core/perspective-engine/src/cache.rs
//! Perspective Cache - Loaded rows per query shape.
//!
//! The cache is designed for:
//! - Incremental "load more" (rows are only ever appended)
//! - One cache table per structural query shape (the fingerprint)
//! - Sharing one table between all parents of a joined child, keyed by
//!   binding group
//!
//! Binding values are not part of the fingerprint. A table whose declared data
//! columns do not cover a request is dropped and rebuilt, so rows with missing
//! columns are never served.

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use crate::condition::SqlCondition;
use crate::definition::PerspectiveSortItem;
use crate::provider::{PerspectiveDataLoadProps, PerspectiveDataLoadResult};
use crate::schema::DatabaseTarget;

// ============================================================================
// FINGERPRINTS
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableCacheKey<'a> {
    schema_name: &'a Option<String>,
    pure_name: &'a str,
    binding_columns: &'a Option<Vec<String>>,
    database_config: &'a DatabaseTarget,
    order_by: &'a [PerspectiveSortItem],
    sql_condition: &'a Option<SqlCondition>,
    mongo_condition: &'a Option<Value>,
}

/// Canonical fingerprint of the query shape of a request.
pub fn table_cache_key(props: &PerspectiveDataLoadProps) -> String {
    let key = TableCacheKey {
        schema_name: &props.schema_name,
        pure_name: &props.pure_name,
        binding_columns: &props.binding_columns,
        database_config: &props.database_config,
        order_by: &props.order_by,
        sql_condition: &props.sql_condition,
        mongo_condition: &props.mongo_condition,
    };
    serde_json::to_string(&key).unwrap_or_else(|_| format!("{:?}", key))
}

/// Canonical key of one binding tuple. The column list is fixed per cache
/// table, so positional serialization is stable.
pub fn binding_group_key(values: &[Value]) -> String {
    Value::Array(values.to_vec()).to_string()
}

/// Equality used to match values coming back from the backend with the
/// requested ones; numbers compare by value and may come back as strings.
pub fn binding_value_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => false,
    }
}

pub fn binding_tuple_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| binding_value_eq(x, y))
}

// ============================================================================
// BINDING GROUP
// ============================================================================

/// Child rows for one distinct parent-key tuple.
#[derive(Debug, Clone)]
pub struct PerspectiveBindingGroup {
    pub binding_values: Vec<Value>,
    /// Number of child rows the backend reported for this tuple.
    pub group_size: usize,
    pub loaded_rows: Vec<Value>,
    pub loaded_all: bool,
}

impl PerspectiveBindingGroup {
    fn new(binding_values: Vec<Value>, group_size: usize) -> Self {
        PerspectiveBindingGroup {
            binding_values,
            group_size,
            loaded_rows: Vec::new(),
            // An empty group needs no row fetch.
            loaded_all: group_size == 0,
        }
    }
}

// ============================================================================
// CACHE TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct PerspectiveCacheTable {
    /// Declared data columns; `None` means every column is loaded.
    pub data_columns: Option<Vec<String>>,
    pub loaded_rows: Vec<Value>,
    pub loaded_all: bool,
    binding_groups: FxHashMap<String, PerspectiveBindingGroup>,
}

impl PerspectiveCacheTable {
    pub fn new(data_columns: Option<Vec<String>>) -> Self {
        PerspectiveCacheTable {
            data_columns,
            loaded_rows: Vec::new(),
            loaded_all: false,
            binding_groups: FxHashMap::default(),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_rows.len()
    }

    /// Whether rows in this table carry every requested column.
    pub fn covers_columns(&self, requested: &Option<Vec<String>>) -> bool {
        match (&self.data_columns, requested) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(declared), Some(requested)) => requested.iter().all(|c| declared.contains(c)),
        }
    }

    pub fn get_rows_result(&self, top_count: usize) -> PerspectiveDataLoadResult {
        let count = top_count.min(self.loaded_rows.len());
        PerspectiveDataLoadResult {
            rows: self.loaded_rows[..count].to_vec(),
            incomplete: top_count < self.loaded_count() || !self.loaded_all,
            loaded_groups: 0,
        }
    }

    /// Appends one fetched page; a short page marks the end of the data.
    pub fn append_page(&mut self, rows: Vec<Value>, requested_limit: usize) {
        if rows.len() < requested_limit {
            self.loaded_all = true;
        }
        self.loaded_rows.extend(rows);
    }

    pub fn get_binding_group(&self, binding_values: &[Value]) -> Option<&PerspectiveBindingGroup> {
        self.binding_groups.get(&binding_group_key(binding_values))
    }

    pub(crate) fn get_binding_group_mut(&mut self, binding_values: &[Value]) -> Option<&mut PerspectiveBindingGroup> {
        self.binding_groups.get_mut(&binding_group_key(binding_values))
    }

    pub fn binding_group_count(&self) -> usize {
        self.binding_groups.len()
    }

    /// Distinct requested tuples with no binding group yet, in request order.
    pub fn get_uncached_binding_groups(&self, binding_values: &[Vec<Value>]) -> Vec<Vec<Value>> {
        let mut seen: Vec<String> = Vec::new();
        let mut uncached = Vec::new();
        for group in binding_values {
            let key = binding_group_key(group);
            if self.binding_groups.contains_key(&key) || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            uncached.push(group.clone());
        }
        uncached
    }

    /// Stores the size of the group identified by `binding_values`, as returned
    /// by the backend. The group is keyed by the matching requested tuple, not
    /// by the returned values. Returns false when no requested tuple matches.
    pub fn store_group_size(
        &mut self,
        requested: &[Vec<Value>],
        binding_values: &[Value],
        group_size: usize,
    ) -> bool {
        let Some(requested_tuple) = requested.iter().find(|v| binding_tuple_eq(v, binding_values)) else {
            return false;
        };
        let key = binding_group_key(requested_tuple);
        self.binding_groups
            .insert(key, PerspectiveBindingGroup::new(requested_tuple.clone(), group_size));
        true
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PerspectiveCache {
    tables: FxHashMap<String, PerspectiveCacheTable>,
}

impl PerspectiveCache {
    pub fn new() -> Self {
        PerspectiveCache::default()
    }

    /// Returns the cache table for the request's query shape, rebuilding it when
    /// the cached rows do not carry all requested columns.
    pub fn get_table_cache(&mut self, props: &PerspectiveDataLoadProps) -> &mut PerspectiveCacheTable {
        let key = table_cache_key(props);
        let stale_columns = match self.tables.get(&key) {
            Some(table) if !table.covers_columns(&props.data_columns) => Some(union_columns(
                table.data_columns.as_deref(),
                props.data_columns.as_deref(),
            )),
            _ => None,
        };
        if let Some(columns) = stale_columns {
            log::debug!("perspective cache: columns changed for {}, dropping cached rows", props.pure_name);
            self.tables.insert(key.clone(), PerspectiveCacheTable::new(columns));
        }
        self.tables
            .entry(key)
            .or_insert_with(|| PerspectiveCacheTable::new(props.data_columns.clone()))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

fn union_columns(declared: Option<&[String]>, requested: Option<&[String]>) -> Option<Vec<String>> {
    let (Some(declared), Some(requested)) = (declared, requested) else {
        return None;
    };
    let mut res = declared.to_vec();
    for column in requested {
        if !res.contains(column) {
            res.push(column.clone());
        }
    }
    Some(res)
}
