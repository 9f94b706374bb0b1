//! FILENAME: core/perspective-engine/src/load.rs
//! Perspective Load - Nested rows for the whole tree.
//!
//! Walks the checked part of the tree top-down. Every table-level node issues
//! one request through the data provider with the binding values of all its
//! parent rows, and the returned child rows are attached to their parents
//! under the node's field name. The result is one nested JSON row per root
//! row, ready for the display flattener.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use serde_json::{json, Value};
use crate::cache::binding_tuple_eq;
use crate::definition::PerspectiveLoadSettings;
use crate::error::Result;
use crate::nodes::{NodeId, PerspectiveNodeKind, PerspectiveTree};
use crate::provider::{binding_tuple, PerspectiveDataLoader, PerspectiveDataProvider};

/// Reserved key of the synthetic trailing row listing incomplete paths.
pub const INCOMPLETE_ROWS_INDICATOR: &str = "incompleteRowsIndicator";

/// Nested root rows plus load progress.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveLoadedData {
    /// Root rows; the last one is an incomplete-rows marker when more data exists.
    pub rows: Vec<Value>,
    /// Loaded row count per node unique name.
    pub load_counts: BTreeMap<String, usize>,
    /// Unique names of nodes with more rows than were loaded.
    pub incomplete_paths: Vec<String>,
}

struct LoadState<'c> {
    counts: &'c BTreeMap<String, usize>,
    page_size: usize,
    load_counts: BTreeMap<String, usize>,
    incomplete_paths: Vec<String>,
}

impl LoadState<'_> {
    fn top_count(&self, unique_name: &str) -> usize {
        self.counts.get(unique_name).copied().unwrap_or(self.page_size)
    }

    fn mark_incomplete(&mut self, unique_name: &str) {
        if !self.incomplete_paths.iter().any(|p| p == unique_name) {
            self.incomplete_paths.push(unique_name.to_string());
        }
    }
}

/// Loads the rows of every checked table-level node.
///
/// `counts` holds the requested row count per unique name (grown by the
/// caller on "load more"); nodes without an entry get one page.
pub async fn load_perspective_data<L: PerspectiveDataLoader>(
    tree: &PerspectiveTree<'_>,
    provider: &mut PerspectiveDataProvider<L>,
    counts: &BTreeMap<String, usize>,
    settings: &PerspectiveLoadSettings,
) -> Result<PerspectiveLoadedData> {
    let root = tree.root();
    let root_name = tree.node(root)?.unique_name.clone();
    let mut state = LoadState {
        counts,
        page_size: settings.page_size,
        load_counts: BTreeMap::new(),
        incomplete_paths: Vec::new(),
    };

    let Some(mut props) = tree.get_node_load_props(root, &[]) else {
        log::debug!("perspective load: root table {} not found", root_name);
        return Ok(PerspectiveLoadedData::default());
    };
    props.top_count = state.top_count(&root_name);

    let result = provider.load_data(&props).await?;
    let mut rows = result.rows;
    state.load_counts.insert(root_name.clone(), rows.len());
    if result.incomplete {
        state.mark_incomplete(&root_name);
    }

    load_children(tree, provider, root, &mut rows, &mut state).await?;

    if !state.incomplete_paths.is_empty() {
        rows.push(json!({ (INCOMPLETE_ROWS_INDICATOR): state.incomplete_paths.clone() }));
    }
    Ok(PerspectiveLoadedData {
        rows,
        load_counts: state.load_counts,
        incomplete_paths: state.incomplete_paths,
    })
}

fn load_children<'a, 't, L: PerspectiveDataLoader>(
    tree: &'a PerspectiveTree<'t>,
    provider: &'a mut PerspectiveDataProvider<L>,
    id: NodeId,
    rows: &'a mut Vec<Value>,
    state: &'a mut LoadState<'_>,
) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
    Box::pin(async move {
        for &child in tree.children(id) {
            let node = &tree.nodes()[child];
            if !node.is_checked_node {
                continue;
            }
            match node.kind {
                PerspectiveNodeKind::PatternColumn { .. } => {
                    load_nested_documents(tree, provider, child, rows, state).await?
                }
                _ if node.is_join() => load_join(tree, provider, child, rows, state).await?,
                _ => {}
            }
        }
        Ok(())
    })
}

/// Loads one joined table for all parent rows and attaches the matches.
async fn load_join<L: PerspectiveDataLoader>(
    tree: &PerspectiveTree<'_>,
    provider: &mut PerspectiveDataProvider<L>,
    id: NodeId,
    rows: &mut [Value],
    state: &mut LoadState<'_>,
) -> Result<()> {
    let node = &tree.nodes()[id];
    let Some((parent_columns, child_columns)) = node.join_columns() else {
        return Ok(());
    };
    let Some(mut props) = tree.get_node_load_props(id, rows) else {
        return Ok(());
    };
    let field = node.field_name();
    props.top_count = state.top_count(&node.unique_name);

    let requested = props.binding_values.clone().unwrap_or_default();
    if requested.is_empty() {
        // Every parent key is null.
        for row in rows.iter_mut() {
            set_field(row, &field, Value::Array(Vec::new()));
        }
        return Ok(());
    }

    let result = provider.load_data(&props).await?;
    let mut child_rows = result.rows;
    *state.load_counts.entry(node.unique_name.clone()).or_default() += child_rows.len();
    if result.incomplete {
        state.mark_incomplete(&node.unique_name);
    }

    load_children(tree, provider, id, &mut child_rows, state).await?;

    let loaded = &requested[..result.loaded_groups.min(requested.len())];
    for row in rows.iter_mut() {
        match binding_tuple(row, &parent_columns) {
            None => set_field(row, &field, Value::Array(Vec::new())),
            Some(tuple) if loaded.iter().any(|t| binding_tuple_eq(t, &tuple)) => {
                let matching: Vec<Value> = child_rows
                    .iter()
                    .filter(|child| {
                        binding_tuple(child, &child_columns)
                            .map(|values| binding_tuple_eq(&values, &tuple))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                set_field(row, &field, Value::Array(matching));
            }
            // Not loaded yet; the field stays absent.
            Some(_) => {}
        }
    }
    Ok(())
}

/// Processes the nested documents under a pattern column of every parent row
/// as one level, so joins declared on nested fields are batched too.
async fn load_nested_documents<L: PerspectiveDataLoader>(
    tree: &PerspectiveTree<'_>,
    provider: &mut PerspectiveDataProvider<L>,
    id: NodeId,
    rows: &mut [Value],
    state: &mut LoadState<'_>,
) -> Result<()> {
    let field = tree.nodes()[id].field_name();

    let mut documents: Vec<Value> = Vec::new();
    let mut shapes: Vec<Option<(usize, bool)>> = Vec::with_capacity(rows.len());
    for row in rows.iter_mut() {
        let shape = match row.get_mut(&field) {
            Some(Value::Array(items)) => {
                let count = items.len();
                documents.append(items);
                Some((count, false))
            }
            Some(value) if value.is_object() => {
                documents.push(value.take());
                Some((1, true))
            }
            _ => None,
        };
        shapes.push(shape);
    }
    if documents.is_empty() {
        return Ok(());
    }

    let result = load_children(tree, provider, id, &mut documents, state).await;

    // Restore even on error so parent rows never lose their documents.
    let mut documents = documents.into_iter();
    for (row, shape) in rows.iter_mut().zip(shapes) {
        let Some((count, is_object)) = shape else {
            continue;
        };
        let restored: Vec<Value> = documents.by_ref().take(count).collect();
        if let Some(slot) = row.get_mut(&field) {
            *slot = if is_object {
                restored.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(restored)
            };
        }
    }
    result
}

fn set_field(row: &mut Value, field: &str, value: Value) {
    if let Value::Object(map) = row {
        map.insert(field.to_string(), value);
    }
}
