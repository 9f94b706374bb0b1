//! FILENAME: core/perspective-engine/src/defaults.rs
//! Default Columns - What a freshly joined table shows.
//!
//! When a table-level node appears for the first time (the root, or a table
//! the user just joined) it gets one checked column picked by name and type
//! heuristics. A foreign key only wins when nothing descriptive exists; human
//! readable values are then found one level further down the join.

use crate::definition::PerspectiveConfig;
use crate::error::Result;
use crate::nodes::{NodeId, PerspectiveNodeKind, PerspectiveTree};
use crate::pattern::{DataPatterns, PatternColumnType, PerspectiveDataPattern};
use crate::schema::{MultipleDatabaseInfo, TableInfo};

/// Passes of default processing before giving up on a fixed point.
const MAX_DEFAULT_PASSES: usize = 32;

/// The column picked for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultColumn {
    /// Check this column's value.
    Column(String),
    /// Join the table referenced by this foreign key column.
    ForeignKey(String),
    /// The table has no columns; nothing is checked.
    None,
}

struct Candidate<'a> {
    name: &'a str,
    is_text: bool,
    is_foreign_key: bool,
}

fn is_text_type(data_type: Option<&str>) -> bool {
    let Some(data_type) = data_type else {
        return false;
    };
    let data_type = data_type.to_lowercase();
    data_type.contains("char") || data_type.contains("text") || data_type.contains("string")
}

fn candidates<'a>(info: &'a TableInfo, pattern: Option<&'a PerspectiveDataPattern>) -> Vec<Candidate<'a>> {
    if info.is_collection() {
        return pattern
            .map(|p| {
                p.columns
                    .iter()
                    .filter(|c| !c.is_json())
                    .map(|c| Candidate {
                        name: &c.name,
                        is_text: c.has_type(PatternColumnType::String),
                        is_foreign_key: false,
                    })
                    .collect()
            })
            .unwrap_or_default();
    }
    info.columns
        .iter()
        .map(|c| Candidate {
            name: &c.column_name,
            is_text: is_text_type(c.data_type.as_deref()),
            is_foreign_key: info.single_column_foreign_key(&c.column_name).is_some(),
        })
        .collect()
}

/// Picks the default column of a table.
///
/// `is_circular` tells whether following the foreign key on a column would
/// lead straight back to the table two levels up.
pub fn perspective_default_column(
    info: &TableInfo,
    pattern: Option<&PerspectiveDataPattern>,
    is_circular: impl Fn(&str) -> bool,
) -> DefaultColumn {
    let columns = candidates(info, pattern);
    let lower: Vec<String> = columns.iter().map(|c| c.name.to_lowercase()).collect();
    let pick = |index: usize| DefaultColumn::Column(columns[index].name.to_string());

    let descriptive = ["name", "title"];
    if let Some(i) = lower.iter().position(|n| descriptive.contains(&n.as_str())) {
        return pick(i);
    }
    if let Some(i) = lower.iter().position(|n| descriptive.iter().any(|d| n.contains(d))) {
        return pick(i);
    }
    if let Some(i) = lower.iter().position(|n| n.contains("subject")) {
        return pick(i);
    }
    if let Some(i) = columns.iter().position(|c| c.is_text) {
        return pick(i);
    }

    let foreign_keys: Vec<&Candidate> = columns.iter().filter(|c| c.is_foreign_key).collect();
    if let Some(c) = foreign_keys.iter().find(|c| !is_circular(c.name)) {
        return DefaultColumn::ForeignKey(c.name.to_string());
    }
    if let Some(c) = foreign_keys.first() {
        return DefaultColumn::ForeignKey(c.name.to_string());
    }

    match columns.first() {
        Some(c) => DefaultColumn::Column(c.name.to_string()),
        None => DefaultColumn::None,
    }
}

// ============================================================================
// CONFIGURATION PASS
// ============================================================================

/// Checks default columns for every visible table node whose node config has
/// not been processed yet, and marks those configs processed.
///
/// The tree is rebuilt after every change, so a table joined through a
/// foreign-key default gets its own default column in a later pass.
pub fn process_perspective_default_columns(
    config: &PerspectiveConfig,
    dbinfos: &MultipleDatabaseInfo,
    patterns: &DataPatterns,
) -> Result<PerspectiveConfig> {
    let mut config = config.clone();
    let mut forced: Option<String> = None;

    for _ in 0..MAX_DEFAULT_PASSES {
        let tree = PerspectiveTree::build(&config, dbinfos, patterns)?;
        let target = forced
            .take()
            .and_then(|unique_name| tree.find_by_unique_name(&unique_name))
            .or_else(|| find_unprocessed(&tree, tree.root()));
        let Some(id) = target else {
            return Ok(config);
        };
        let (next, follow) = apply_default_column(&tree, id, dbinfos, patterns);
        config = next;
        forced = follow;
    }

    log::debug!("default columns: no fixed point after {} passes", MAX_DEFAULT_PASSES);
    Ok(config)
}

/// First node in depth-first order that is visible and still unprocessed.
fn find_unprocessed(tree: &PerspectiveTree, id: NodeId) -> Option<NodeId> {
    let node = &tree.nodes()[id];
    if node.parent.is_none() || node.is_checked_node {
        let unprocessed = node
            .designer_id
            .as_ref()
            .and_then(|d| tree.config().find_node(d))
            .map(|n| !n.default_columns_processed)
            .unwrap_or(false);
        if unprocessed && node.target_table().is_some() {
            return Some(id);
        }
    }
    tree.children(id).iter().find_map(|&child| find_unprocessed(tree, child))
}

/// Applies the default column of one node. Returns the new configuration and,
/// for a foreign-key default, the unique name of the node to process next.
fn apply_default_column(
    tree: &PerspectiveTree,
    id: NodeId,
    dbinfos: &MultipleDatabaseInfo,
    patterns: &DataPatterns,
) -> (PerspectiveConfig, Option<String>) {
    let node = &tree.nodes()[id];
    let config = tree.config().clone();

    let Some(designer_id) = node.designer_id.clone() else {
        // A joined key column that could not get its own node config: show the raw key.
        return (config.with_checked(&node.unique_name), None);
    };
    let config = config.map_node(&designer_id, |n| n.default_columns_processed = true);

    let Some(info) = node.target_table().and_then(|t| dbinfos.find_table(t)) else {
        return (config, None);
    };
    let children = tree.children(id);
    let find_child = |column: &str| {
        children.iter().copied().find(|&c| {
            let child = &tree.nodes()[c];
            matches!(
                child.kind,
                PerspectiveNodeKind::Column { .. } | PerspectiveNodeKind::PatternColumn { .. }
            ) && child.parent == Some(id)
                && child.value_field() == Some(column)
        })
    };

    let choice = perspective_default_column(info, patterns.get(&designer_id), |column| {
        find_child(column).map(|c| tree.is_circular(c)).unwrap_or(false)
    });
    log::debug!("default column for {}: {:?}", node.unique_name, choice);

    match choice {
        DefaultColumn::Column(column) => match find_child(column.as_str()) {
            Some(child) => (config.with_checked(&tree.nodes()[child].unique_name), None),
            None => (config, None),
        },
        DefaultColumn::ForeignKey(column) => match find_child(column.as_str()) {
            Some(child) if !tree.is_circular(child) => {
                let unique_name = tree.nodes()[child].unique_name.clone();
                (tree.ensure_designer_id(config, child), Some(unique_name))
            }
            Some(child) => (config.with_checked(&tree.nodes()[child].unique_name), None),
            None => (config, None),
        },
        DefaultColumn::None => (config, None),
    }
}
