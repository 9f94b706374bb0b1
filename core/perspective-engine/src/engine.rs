//! FILENAME: core/perspective-engine/src/engine.rs
//! Perspective Engine - Flattens nested rows into a renderable grid.
//!
//! This module takes the node tree (what is checked) and the nested rows
//! produced by the loader and builds a PerspectiveDisplay in two phases:
//! - Columns: depth-first over checked nodes, grouped headers via col-spans
//! - Rows: collect every source row with its sub-row collections, merge the
//!   collections side by side into logical rows, then compute row-spans
//!
//! Cells are only merged vertically when they came from the same collected
//! row, which is tracked by stamping join ids during the merge.

use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;
use crate::load::INCOMPLETE_ROWS_INDICATOR;
use crate::nodes::{NodeId, PerspectiveTree};
use crate::view::{
    JoinIdGenerator, PerspectiveDisplay, PerspectiveDisplayColumn, PerspectiveDisplayRow, JOIN_ID_NONE,
};

// ============================================================================
// COLLECTED ROWS
// ============================================================================

/// One source row with its own values and the rows joined below it.
#[derive(Debug, Default)]
struct CollectedRow {
    values: Vec<(usize, Value)>,
    /// Every grid column owned by this row's node, whether or not a value was present.
    column_indexes: Vec<usize>,
    sub_row_collections: Vec<Vec<CollectedRow>>,
    incomplete_rows_indicator: Option<Vec<String>>,
}

// ============================================================================
// DISPLAY CALCULATOR
// ============================================================================

pub struct PerspectiveDisplayCalculator<'a, 't> {
    tree: &'a PerspectiveTree<'t>,
    join_ids: &'a JoinIdGenerator,
    display: PerspectiveDisplay,
    column_index_by_node: FxHashMap<NodeId, usize>,
}

impl<'a, 't> PerspectiveDisplayCalculator<'a, 't> {
    pub fn new(tree: &'a PerspectiveTree<'t>, join_ids: &'a JoinIdGenerator) -> Self {
        PerspectiveDisplayCalculator {
            tree,
            join_ids,
            display: PerspectiveDisplay::default(),
            column_index_by_node: FxHashMap::default(),
        }
    }

    /// Executes both phases and returns the display.
    pub fn calculate(mut self, rows: &[Value]) -> PerspectiveDisplay {
        let root = self.tree.root();

        // Step 1: Columns
        let mut parents: SmallVec<[NodeId; 4]> = SmallVec::new();
        parents.push(root);
        self.fill_columns(root, &parents);
        let count = self.display.columns.len();
        if let Some(first) = self.display.columns.first_mut() {
            first.col_span_at_level.insert(0, count);
        }
        self.display.column_level_count = self
            .display
            .columns
            .iter()
            .map(|c| c.parent_nodes.len())
            .max()
            .unwrap_or(0)
            + 1;

        // Step 2: Rows
        let collected = self.collect_rows(root, rows);
        let mut result_rows: Vec<PerspectiveDisplayRow> = Vec::new();
        for row in &collected {
            let base = result_rows.len();
            if let Some(indicator) = &row.incomplete_rows_indicator {
                self.push_indicator(&mut result_rows, base, indicator);
                continue;
            }
            self.merge_row(row, &mut result_rows, base);
        }

        // Step 3: Row spans
        fill_row_spans(&mut result_rows, self.display.columns.len());
        self.display.rows = result_rows;
        self.display
    }

    // ========================================================================
    // COLUMNS
    // ========================================================================

    fn fill_columns(&mut self, id: NodeId, parents: &SmallVec<[NodeId; 4]>) {
        let tree = self.tree;
        for &child in tree.children(id) {
            let node = &tree.nodes()[child];

            if node.is_checked_column {
                if let Some(data_field) = node.value_field() {
                    let column_index = self.display.columns.len();
                    self.column_index_by_node.insert(child, column_index);
                    self.display.columns.push(PerspectiveDisplayColumn {
                        title: node.title.clone(),
                        data_field: data_field.to_string(),
                        unique_name: node.unique_name.clone(),
                        parent_titles: parents.iter().map(|&p| tree.nodes()[p].title.clone()).collect(),
                        parent_unique_names: parents
                            .iter()
                            .map(|&p| tree.nodes()[p].unique_name.clone())
                            .collect(),
                        col_span_at_level: Default::default(),
                        column_index,
                        parent_nodes: parents.clone(),
                        data_node: child,
                    });
                }
            }

            if node.is_checked_node && node.is_expandable {
                let level = parents.len();
                let start = self.display.columns.len();
                let mut nested = parents.clone();
                nested.push(child);
                self.fill_columns(child, &nested);

                let produced = self.display.columns.len() - start;
                if produced > 0 {
                    self.display.columns[start].col_span_at_level.insert(level, produced);
                }
            }
        }
    }

    // ========================================================================
    // ROW COLLECTION
    // ========================================================================

    fn collect_rows(&mut self, id: NodeId, rows: &[Value]) -> Vec<CollectedRow> {
        let tree = self.tree;
        let children = tree.children(id);
        let column_nodes: Vec<(usize, &str)> = children
            .iter()
            .filter_map(|&child| {
                let node = &tree.nodes()[child];
                if !node.is_checked_column {
                    return None;
                }
                let index = self.column_index_by_node.get(&child).copied()?;
                Some((index, node.value_field()?))
            })
            .collect();
        let tree_nodes: Vec<(NodeId, String)> = children
            .iter()
            .filter(|&&child| {
                let node = &tree.nodes()[child];
                node.is_checked_node && node.is_expandable
            })
            .map(|&child| (child, tree.nodes()[child].field_name()))
            .collect();

        let mut res = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(indicator) = incomplete_indicator(row) {
                self.note_incomplete(&indicator);
                res.push(CollectedRow {
                    incomplete_rows_indicator: Some(indicator),
                    ..CollectedRow::default()
                });
                continue;
            }

            let mut collected = CollectedRow {
                column_indexes: column_nodes.iter().map(|(index, _)| *index).collect(),
                ..CollectedRow::default()
            };
            for (index, field) in &column_nodes {
                if let Some(value) = row.get(*field) {
                    collected.values.push((*index, value.clone()));
                }
            }
            for (child, field) in &tree_nodes {
                let sub_rows = match row.get(field) {
                    Some(Value::Array(items)) => self.collect_rows(*child, items),
                    Some(value @ Value::Object(_)) => self.collect_rows(*child, std::slice::from_ref(value)),
                    _ => continue,
                };
                collected.sub_row_collections.push(sub_rows);
            }
            res.push(collected);
        }

        let counted = res.iter().filter(|r| r.incomplete_rows_indicator.is_none()).count();
        *self
            .display
            .load_counts
            .entry(tree.nodes()[id].unique_name.clone())
            .or_default() += counted;
        res
    }

    fn note_incomplete(&mut self, indicator: &[String]) {
        for path in indicator {
            if !self.display.incomplete_paths.contains(path) {
                self.display.incomplete_paths.push(path.clone());
            }
        }
    }

    // ========================================================================
    // MERGE
    // ========================================================================

    /// Merges a collected row into the logical rows starting at `base` and
    /// returns how many logical rows it occupies.
    fn merge_row(&self, row: &CollectedRow, result_rows: &mut Vec<PerspectiveDisplayRow>, base: usize) -> usize {
        let column_count = self.display.columns.len();
        {
            let target = get_row(result_rows, base, column_count);
            for (index, value) in &row.values {
                target.row_data[*index] = Some(value.clone());
            }
        }

        let mut height = 1;
        let mut indicators: Vec<&[String]> = Vec::new();
        for collection in &row.sub_row_collections {
            let mut offset = 0;
            for sub_row in collection {
                match &sub_row.incomplete_rows_indicator {
                    Some(indicator) => indicators.push(indicator),
                    None => offset += self.merge_row(sub_row, result_rows, base + offset),
                }
            }
            height = height.max(offset);
        }

        let join_id = self.join_ids.next_id();
        for row_index in base..base + height {
            let target = get_row(result_rows, row_index, column_count);
            for &index in &row.column_indexes {
                target.row_join_ids[index] = join_id;
            }
        }

        // Nested markers go below everything merged so far; sibling data never shares their row.
        for indicator in indicators {
            height += self.push_indicator(result_rows, base + height, indicator);
        }
        height
    }

    fn push_indicator(&self, result_rows: &mut Vec<PerspectiveDisplayRow>, index: usize, indicator: &[String]) -> usize {
        let target = get_row(result_rows, index, self.display.columns.len());
        target.incomplete_rows_indicator = Some(indicator.to_vec());
        1
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn incomplete_indicator(row: &Value) -> Option<Vec<String>> {
    let paths = row.get(INCOMPLETE_ROWS_INDICATOR)?.as_array()?;
    Some(paths.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
}

/// Logical row at `index`, allocating empty rows up to it.
fn get_row(rows: &mut Vec<PerspectiveDisplayRow>, index: usize, column_count: usize) -> &mut PerspectiveDisplayRow {
    while rows.len() <= index {
        rows.push(PerspectiveDisplayRow::new(column_count));
    }
    &mut rows[index]
}

/// Merges runs of cells that belong to the same collected row.
fn fill_row_spans(rows: &mut [PerspectiveDisplayRow], column_count: usize) {
    for column in 0..column_count {
        let mut open_run: Option<usize> = None;
        for index in 0..rows.len() {
            if rows[index].is_incomplete_marker() {
                open_run = None;
                continue;
            }
            let join_id = rows[index].row_join_ids[column];
            if let Some(start) = open_run {
                if rows[index].row_data[column].is_none()
                    && join_id != JOIN_ID_NONE
                    && join_id == rows[start].row_join_ids[column]
                {
                    rows[start].row_spans[column] += 1;
                    rows[index].row_cell_skips[column] = true;
                    continue;
                }
            }
            open_run = Some(index);
        }
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Flattens nested rows into a display. A fresh join id generator is used
/// unless the caller shares one across displays.
pub fn calculate_display(
    tree: &PerspectiveTree,
    rows: &[Value],
    join_ids: Option<&JoinIdGenerator>,
) -> PerspectiveDisplay {
    let local = JoinIdGenerator::new();
    let join_ids = join_ids.unwrap_or(&local);
    PerspectiveDisplayCalculator::new(tree, join_ids).calculate(rows)
}
