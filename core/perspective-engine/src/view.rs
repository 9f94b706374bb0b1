//! FILENAME: core/perspective-engine/src/view.rs
//! Perspective View - Renderable output for the frontend.
//!
//! A flat grid built from hierarchical rows. Grouped headers are carried on
//! the columns themselves (`col_span_at_level` on the first column of each
//! joined group); merged cells on the rows (`row_spans` on the first cell of
//! a run, `row_cell_skips` on the cells it covers).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use crate::nodes::NodeId;

/// Join id of a cell that never belonged to a merged group.
pub const JOIN_ID_NONE: u64 = 0;

// ============================================================================
// JOIN IDS
// ============================================================================

/// Hands out join ids. Ids start at 1 and only ever grow.
#[derive(Debug)]
pub struct JoinIdGenerator {
    next: AtomicU64,
}

impl JoinIdGenerator {
    pub fn new() -> Self {
        JoinIdGenerator {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for JoinIdGenerator {
    fn default() -> Self {
        JoinIdGenerator::new()
    }
}

// ============================================================================
// COLUMNS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDisplayColumn {
    pub title: String,

    /// Key of the cell value inside its source row.
    pub data_field: String,

    /// Unique name of the node the value comes from.
    pub unique_name: String,

    /// Titles of the enclosing groups, root first.
    pub parent_titles: Vec<String>,

    /// Unique names of the enclosing groups, root first.
    pub parent_unique_names: Vec<String>,

    /// Header col-span per level, set on the first column of each group.
    pub col_span_at_level: BTreeMap<usize, usize>,

    /// Position of this column in the grid.
    pub column_index: usize,

    #[serde(skip)]
    pub(crate) parent_nodes: SmallVec<[NodeId; 4]>,

    #[serde(skip)]
    pub(crate) data_node: NodeId,
}

impl PerspectiveDisplayColumn {
    /// Header level of the column's own title.
    pub fn column_level(&self) -> usize {
        self.parent_titles.len()
    }

    /// Header rows the column's own title spans, down to the last header row.
    pub fn row_span(&self, column_level_count: usize) -> usize {
        column_level_count.saturating_sub(self.column_level()).max(1)
    }

    pub fn col_span(&self, level: usize) -> usize {
        self.col_span_at_level.get(&level).copied().unwrap_or(1)
    }

    /// Whether this column renders the group header at `level`.
    pub fn show_parent(&self, level: usize) -> bool {
        self.col_span_at_level.contains_key(&level)
    }

    pub fn data_node(&self) -> NodeId {
        self.data_node
    }
}

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDisplayRow {
    /// One cell per column; `None` means no value came from this row.
    pub row_data: Vec<Option<Value>>,

    /// Row span of every cell (1 unless it opens a merged run).
    pub row_spans: Vec<usize>,

    /// Cells covered by a merged cell above them.
    pub row_cell_skips: Vec<bool>,

    /// Paths with more rows than loaded; such a row carries no data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_rows_indicator: Option<Vec<String>>,

    #[serde(skip)]
    pub(crate) row_join_ids: Vec<u64>,
}

impl PerspectiveDisplayRow {
    pub(crate) fn new(column_count: usize) -> Self {
        PerspectiveDisplayRow {
            row_data: vec![None; column_count],
            row_spans: vec![1; column_count],
            row_cell_skips: vec![false; column_count],
            incomplete_rows_indicator: None,
            row_join_ids: vec![JOIN_ID_NONE; column_count],
        }
    }

    pub fn is_incomplete_marker(&self) -> bool {
        self.incomplete_rows_indicator.is_some()
    }

    pub fn join_id(&self, column: usize) -> u64 {
        self.row_join_ids.get(column).copied().unwrap_or(JOIN_ID_NONE)
    }
}

// ============================================================================
// DISPLAY
// ============================================================================

/// The complete flattened perspective.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveDisplay {
    pub columns: Vec<PerspectiveDisplayColumn>,
    pub rows: Vec<PerspectiveDisplayRow>,
    /// Number of header rows.
    pub column_level_count: usize,
    /// Source rows seen per node unique name.
    pub load_counts: BTreeMap<String, usize>,
    /// Union of every incomplete-rows indicator seen.
    pub incomplete_paths: Vec<String>,
}

impl PerspectiveDisplay {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn find_column(&self, unique_name: &str) -> Option<&PerspectiveDisplayColumn> {
        self.columns.iter().find(|c| c.unique_name == unique_name)
    }

    /// Rows carrying data, without incomplete markers.
    pub fn data_rows(&self) -> impl Iterator<Item = &PerspectiveDisplayRow> {
        self.rows.iter().filter(|r| !r.is_incomplete_marker())
    }
}
