//! FILENAME: core/perspective-engine/src/provider.rs
//! Perspective Data Provider - Cache-aware row loading.
//!
//! The provider sits between the node tree and the external query-execution
//! collaborator (`PerspectiveDataLoader`). Every request goes through the
//! cache first; only rows that are not cached yet are fetched, and child
//! loads for many parent rows are batched into one request per level.
//!
//! Load methods take `&mut self`, so a second "load more" on the same cache
//! can only be issued after the previous one completed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::cache::{binding_group_key, binding_tuple_eq, PerspectiveCache};
use crate::condition::SqlCondition;
use crate::definition::{PerspectiveSortItem, PERSPECTIVE_PAGE_SIZE};
use crate::error::Result;
use crate::schema::DatabaseTarget;

// ============================================================================
// REQUEST / RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineType {
    Sql,
    DocDb,
}

/// Row window passed to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerspectiveRange {
    pub offset: usize,
    pub limit: usize,
}

/// One node's load request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDataLoadProps {
    pub database_config: DatabaseTarget,
    pub schema_name: Option<String>,
    pub pure_name: String,
    pub engine_type: EngineType,

    /// Columns to fetch; `None` loads whole documents.
    pub data_columns: Option<Vec<String>>,

    pub order_by: Vec<PerspectiveSortItem>,

    pub sql_condition: Option<SqlCondition>,
    pub mongo_condition: Option<Value>,

    /// Child-side columns matched against the binding values.
    pub binding_columns: Option<Vec<String>>,

    /// Distinct parent key tuples, one value per binding column.
    pub binding_values: Option<Vec<Vec<Value>>>,

    /// Window issued to the loader; filled in by the provider.
    pub range: Option<PerspectiveRange>,

    /// Number of rows the caller wants materialized.
    pub top_count: usize,
}

impl PerspectiveDataLoadProps {
    pub fn new(database_config: DatabaseTarget, schema_name: Option<String>, pure_name: impl Into<String>) -> Self {
        PerspectiveDataLoadProps {
            database_config,
            schema_name,
            pure_name: pure_name.into(),
            engine_type: EngineType::Sql,
            data_columns: None,
            order_by: Vec::new(),
            sql_condition: None,
            mongo_condition: None,
            binding_columns: None,
            binding_values: None,
            range: None,
            top_count: PERSPECTIVE_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveDataLoadResult {
    pub rows: Vec<Value>,
    /// More rows exist (or may exist) beyond the returned ones.
    pub incomplete: bool,
    /// For binding loads: how many of the requested distinct tuples, counted
    /// from the front, have all their rows in `rows`. Zero for plain loads.
    pub loaded_groups: usize,
}

/// Number of child rows for one binding tuple, as reported by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveGroupSize {
    pub binding_values: Vec<Value>,
    pub group_size: usize,
}

// ============================================================================
// LOADER COLLABORATOR
// ============================================================================

/// Executes load requests against a real backend.
///
/// `load_data` honors `range`, the binding filter (`binding_columns IN
/// binding_values`), ordering and the condition. `load_grouping` returns one
/// entry per binding tuple that has at least one matching row.
#[async_trait]
pub trait PerspectiveDataLoader: Send + Sync {
    async fn load_data(&self, props: &PerspectiveDataLoadProps) -> Result<Vec<Value>>;

    async fn load_grouping(&self, props: &PerspectiveDataLoadProps) -> Result<Vec<PerspectiveGroupSize>>;
}

/// Extracts a binding tuple from a row. Returns `None` when a component is
/// missing or null, since such a row can never match a child.
pub fn binding_tuple(row: &Value, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|column| match row.get(column) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        })
        .collect()
}

// ============================================================================
// DATA PROVIDER
// ============================================================================

pub struct PerspectiveDataProvider<L> {
    cache: PerspectiveCache,
    loader: L,
}

impl<L: PerspectiveDataLoader> PerspectiveDataProvider<L> {
    pub fn new(loader: L) -> Self {
        PerspectiveDataProvider {
            cache: PerspectiveCache::new(),
            loader,
        }
    }

    pub fn with_cache(loader: L, cache: PerspectiveCache) -> Self {
        PerspectiveDataProvider { cache, loader }
    }

    pub fn cache(&self) -> &PerspectiveCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PerspectiveCache {
        &mut self.cache
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Ensures `props.top_count` rows are materialized and returns them.
    pub async fn load_data(&mut self, props: &PerspectiveDataLoadProps) -> Result<PerspectiveDataLoadResult> {
        if props.binding_columns.is_some() {
            self.load_data_nested(props).await
        } else {
            self.load_data_flat(props).await
        }
    }

    async fn load_data_flat(&mut self, props: &PerspectiveDataLoadProps) -> Result<PerspectiveDataLoadResult> {
        let table = self.cache.get_table_cache(props);
        if table.loaded_count() >= props.top_count || table.loaded_all {
            log::debug!("perspective cache hit: {} ({} rows)", props.pure_name, props.top_count);
            return Ok(table.get_rows_result(props.top_count));
        }

        let offset = table.loaded_count();
        let limit = props.top_count - offset;
        let request = PerspectiveDataLoadProps {
            data_columns: table.data_columns.clone(),
            range: Some(PerspectiveRange { offset, limit }),
            ..props.clone()
        };
        log::debug!("perspective load: {} offset={} limit={}", props.pure_name, offset, limit);

        let rows = self.loader.load_data(&request).await?;
        let table = self.cache.get_table_cache(props);
        table.append_page(rows, limit);
        Ok(table.get_rows_result(props.top_count))
    }

    async fn load_data_nested(&mut self, props: &PerspectiveDataLoadProps) -> Result<PerspectiveDataLoadResult> {
        let binding_columns = props.binding_columns.clone().unwrap_or_default();
        let requested = distinct_tuples(props.binding_values.as_deref().unwrap_or_default());

        let uncached = self.cache.get_table_cache(props).get_uncached_binding_groups(&requested);
        if !uncached.is_empty() {
            let request = PerspectiveDataLoadProps {
                binding_values: Some(uncached.clone()),
                range: None,
                ..props.clone()
            };
            log::debug!("perspective grouping: {} ({} groups)", props.pure_name, uncached.len());
            let counts = self.loader.load_grouping(&request).await?;

            let table = self.cache.get_table_cache(props);
            for group in &uncached {
                table.store_group_size(&uncached, group, 0);
            }
            for count in counts {
                if !table.store_group_size(&uncached, &count.binding_values, count.group_size) {
                    log::warn!(
                        "perspective grouping: {} returned unrequested group {:?}",
                        props.pure_name,
                        count.binding_values
                    );
                }
            }
        }

        // Prefix of groups needed to reach top_count rows; always at least one.
        let table = self.cache.get_table_cache(props);
        let mut prefix = 0;
        let mut total = 0;
        for group in &requested {
            if prefix > 0 && total >= props.top_count {
                break;
            }
            total += table.get_binding_group(group).map(|g| g.group_size).unwrap_or(0);
            prefix += 1;
        }

        let missing: Vec<Vec<Value>> = requested[..prefix]
            .iter()
            .filter(|group| !table.get_binding_group(group).map(|g| g.loaded_all).unwrap_or(true))
            .cloned()
            .collect();

        if !missing.is_empty() {
            // Rows are matched to groups by their binding columns, so those are always fetched.
            let data_columns = table.data_columns.clone().map(|mut columns| {
                for column in &binding_columns {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
                columns
            });
            let request = PerspectiveDataLoadProps {
                data_columns,
                binding_values: Some(missing.clone()),
                range: None,
                ..props.clone()
            };
            log::debug!("perspective load: {} ({} groups)", props.pure_name, missing.len());
            let rows = self.loader.load_data(&request).await?;

            let table = self.cache.get_table_cache(props);
            for row in rows {
                let target = binding_tuple(&row, &binding_columns)
                    .and_then(|tuple| missing.iter().find(|m| binding_tuple_eq(m, &tuple)));
                match target.and_then(|t| table.get_binding_group_mut(t)) {
                    Some(group) => group.loaded_rows.push(row),
                    None => log::warn!("perspective load: {} returned a row outside the requested groups", props.pure_name),
                }
            }
            for group in &missing {
                if let Some(group) = table.get_binding_group_mut(group) {
                    group.loaded_all = true;
                }
            }
        }

        let table = self.cache.get_table_cache(props);
        let mut rows = Vec::new();
        for group in &requested[..prefix] {
            if let Some(group) = table.get_binding_group(group) {
                rows.extend(group.loaded_rows.iter().cloned());
            }
        }
        Ok(PerspectiveDataLoadResult {
            rows,
            incomplete: prefix < requested.len(),
            loaded_groups: prefix,
        })
    }
}

fn distinct_tuples(values: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut seen: Vec<String> = Vec::new();
    let mut res = Vec::new();
    for tuple in values {
        let key = binding_group_key(tuple);
        if !seen.contains(&key) {
            seen.push(key);
            res.push(tuple.clone());
        }
    }
    res
}
