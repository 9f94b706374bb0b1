//! FILENAME: core/perspective-engine/src/definition.rs
//! Perspective Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a perspective.
//! These structures are designed to be:
//! - Serializable (the host persists them as a JSON blob)
//! - Immutable snapshots of user intent
//! - Updated only through pure `PerspectiveConfig -> PerspectiveConfig` transforms
//!
//! The node tree is rebuilt from the latest configuration on every render,
//! so nothing here refers to tree nodes directly. Checked and expanded state is
//! keyed by node unique names, table-level state (filters, sort, default
//! column processing) by designer ids.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::Result;
use crate::schema::{DatabaseTarget, TableRef};

/// Stable identity of a table-level node, persisted across reloads.
pub type DesignerId = String;

/// Rows requested per node when the caller did not ask for more.
pub const PERSPECTIVE_PAGE_SIZE: usize = 100;

// ============================================================================
// SORTING AND FILTERING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Asc
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveSortItem {
    pub column_name: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl PerspectiveSortItem {
    pub fn asc(column_name: impl Into<String>) -> Self {
        PerspectiveSortItem {
            column_name: column_name.into(),
            order: SortOrder::Asc,
        }
    }
}

/// Comparison applied by a column filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
    StartsWith,
    IsNull,
    IsNotNull,
}

/// A structured column filter. Parsing of user filter expressions happens in
/// the host; the engine only translates these into engine-specific conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveFilter {
    pub column_name: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl PerspectiveFilter {
    pub fn new(column_name: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        PerspectiveFilter {
            column_name: column_name.into(),
            operator,
            value,
        }
    }
}

// ============================================================================
// NODES, REFERENCES AND CUSTOM JOINS
// ============================================================================

/// Table-level state of one designer node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveNodeConfig {
    pub designer_id: DesignerId,
    #[serde(flatten)]
    pub target: DatabaseTarget,
    pub schema_name: Option<String>,
    pub pure_name: String,

    /// Set once default columns were picked for this node.
    #[serde(default)]
    pub default_columns_processed: bool,

    #[serde(default)]
    pub filters: Vec<PerspectiveFilter>,

    #[serde(default)]
    pub sort: Vec<PerspectiveSortItem>,
}

impl PerspectiveNodeConfig {
    pub fn new(designer_id: impl Into<DesignerId>, table: &TableRef) -> Self {
        PerspectiveNodeConfig {
            designer_id: designer_id.into(),
            target: table.target.clone(),
            schema_name: table.schema_name.clone(),
            pure_name: table.pure_name.clone(),
            default_columns_processed: false,
            filters: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.target.clone(), self.schema_name.clone(), self.pure_name.clone())
    }
}

/// One column pair of a reference edge, oriented source -> target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveReferenceColumn {
    pub source: String,
    pub target: String,
}

/// An edge between two designer nodes (a followed foreign key or reverse key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveReferenceConfig {
    pub designer_id: DesignerId,
    pub source_id: DesignerId,
    pub target_id: DesignerId,
    pub columns: Vec<PerspectiveReferenceColumn>,
    #[serde(default)]
    pub is_auto_generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveCustomJoinColumn {
    /// Column on the base side. Contains `::` when it lives inside a nested document.
    pub base_column_name: String,
    pub ref_column_name: String,
}

/// A user-declared join not backed by a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveCustomJoinConfig {
    pub join_name: String,
    pub base_designer_id: DesignerId,
    pub ref_node_designer_id: DesignerId,
    /// Database of the joined table; the base node's database when absent.
    #[serde(default)]
    pub target: Option<DatabaseTarget>,
    pub ref_schema_name: Option<String>,
    pub ref_table_name: String,
    pub columns: Vec<PerspectiveCustomJoinColumn>,
}

impl PerspectiveCustomJoinConfig {
    /// Whether any base column crosses a nested-document boundary.
    pub fn is_nested(&self) -> bool {
        self.columns.iter().any(|c| c.base_column_name.contains("::"))
    }
}

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// The complete persisted perspective state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveConfig {
    pub root_designer_id: DesignerId,

    #[serde(default)]
    pub nodes: Vec<PerspectiveNodeConfig>,

    #[serde(default)]
    pub references: Vec<PerspectiveReferenceConfig>,

    #[serde(default)]
    pub custom_joins: Vec<PerspectiveCustomJoinConfig>,

    /// Unique names of checked nodes.
    #[serde(default)]
    pub checked_columns: Vec<String>,

    /// Unique names of expanded nodes.
    #[serde(default)]
    pub expanded_columns: Vec<String>,
}

impl PerspectiveConfig {
    /// Creates a configuration rooted at the given table.
    pub fn new(root_designer_id: impl Into<DesignerId>, root_table: &TableRef) -> Self {
        let root_designer_id = root_designer_id.into();
        PerspectiveConfig {
            nodes: vec![PerspectiveNodeConfig::new(root_designer_id.clone(), root_table)],
            root_designer_id,
            references: Vec::new(),
            custom_joins: Vec::new(),
            checked_columns: Vec::new(),
            expanded_columns: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn root_node(&self) -> Option<&PerspectiveNodeConfig> {
        self.find_node(&self.root_designer_id)
    }

    pub fn find_node(&self, designer_id: &str) -> Option<&PerspectiveNodeConfig> {
        self.nodes.iter().find(|n| n.designer_id == designer_id)
    }

    pub fn is_checked(&self, unique_name: &str) -> bool {
        self.checked_columns.iter().any(|c| c == unique_name)
    }

    /// Whether a checked entry lies strictly below the given unique name.
    pub fn has_checked_below(&self, unique_name: &str) -> bool {
        self.checked_columns.iter().any(|c| is_below(c, unique_name))
    }

    pub fn is_expanded(&self, unique_name: &str) -> bool {
        self.expanded_columns.iter().any(|c| c == unique_name)
    }

    // ------------------------------------------------------------------------
    // Pure transforms
    // ------------------------------------------------------------------------

    pub fn with_checked(mut self, unique_name: &str) -> Self {
        if !self.is_checked(unique_name) {
            self.checked_columns.push(unique_name.to_string());
        }
        self
    }

    /// Removes only the entry itself.
    pub fn without_checked(mut self, unique_name: &str) -> Self {
        self.checked_columns.retain(|c| c != unique_name);
        self
    }

    /// Removes every checked entry strictly below the given unique name.
    pub fn without_checked_below(mut self, unique_name: &str) -> Self {
        self.checked_columns.retain(|c| !is_below(c, unique_name));
        self
    }

    /// Removes the entry itself and every checked entry below it.
    pub fn without_checked_subtree(self, unique_name: &str) -> Self {
        self.without_checked(unique_name).without_checked_below(unique_name)
    }

    pub fn with_expanded(mut self, unique_name: &str) -> Self {
        if !self.is_expanded(unique_name) {
            self.expanded_columns.push(unique_name.to_string());
        }
        self
    }

    pub fn without_expanded(mut self, unique_name: &str) -> Self {
        self.expanded_columns.retain(|c| c != unique_name);
        self
    }

    pub fn with_node(mut self, node: PerspectiveNodeConfig) -> Self {
        self.nodes.retain(|n| n.designer_id != node.designer_id);
        self.nodes.push(node);
        self
    }

    pub fn with_reference(mut self, reference: PerspectiveReferenceConfig) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_custom_join(mut self, join: PerspectiveCustomJoinConfig) -> Self {
        self.custom_joins.push(join);
        self
    }

    /// Applies `f` to the node config with the given designer id, if present.
    pub fn map_node(mut self, designer_id: &str, f: impl FnOnce(&mut PerspectiveNodeConfig)) -> Self {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.designer_id == designer_id) {
            f(node);
        }
        self
    }
}

fn is_below(candidate: &str, ancestor: &str) -> bool {
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate.as_bytes()[ancestor.len()] == b'.'
}

// ============================================================================
// LOAD SETTINGS
// ============================================================================

/// Engine-level knobs for data loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveLoadSettings {
    /// Rows requested for a node that has no explicit count yet.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    PERSPECTIVE_PAGE_SIZE
}

impl Default for PerspectiveLoadSettings {
    fn default() -> Self {
        PerspectiveLoadSettings {
            page_size: PERSPECTIVE_PAGE_SIZE,
        }
    }
}
