//! FILENAME: core/perspective-engine/src/nodes.rs
//! Perspective Tree - What is joined to what.
//!
//! The tree is an arena of nodes addressed by `NodeId`, built top-down from
//! immutable inputs (configuration, schema metadata, sampled data patterns)
//! every time the perspective is rendered. Parent links are plain indices,
//! so circular foreign keys never create ownership cycles.
//!
//! Children are only resolved where something needs them: the root, expanded
//! nodes, nodes with checked content and nodes carrying a designer id. Any
//! other node can be resolved on demand with `child_nodes`.
//!
//! Toggle operations never touch the tree. They return a new configuration
//! and the caller rebuilds the tree from it.

use serde_json::Value;
use crate::condition::{mongo_condition, sql_condition};
use crate::definition::{
    DesignerId, PerspectiveConfig, PerspectiveCustomJoinConfig, PerspectiveNodeConfig,
    PerspectiveReferenceColumn, PerspectiveReferenceConfig, PerspectiveSortItem,
    PERSPECTIVE_PAGE_SIZE,
};
use crate::error::{PerspectiveError, Result};
use crate::pattern::{DataPatterns, PatternColumn, PerspectiveDataPattern};
use crate::provider::{binding_tuple, EngineType, PerspectiveDataLoadProps};
use crate::schema::{ColumnInfo, ForeignKeyInfo, MultipleDatabaseInfo, TableInfo, TableRef};

/// Index of a node within its tree.
pub type NodeId = usize;

/// Separator between path segments of nested pattern columns.
pub const PATTERN_PATH_SEPARATOR: &str = "::";

// ============================================================================
// NODE KINDS
// ============================================================================

#[derive(Debug, Clone)]
pub enum PerspectiveNodeKind {
    /// The root table, view or collection.
    Table { table: TableRef },

    /// A column of the owning table. `ref_table` is set when the column
    /// carries a single-column foreign key to a table present in metadata.
    Column {
        column: ColumnInfo,
        foreign_key: Option<ForeignKeyInfo>,
        ref_table: Option<TableRef>,
    },

    /// A table declaring a foreign key that points at the parent's table.
    ForeignKeyReference {
        table: TableRef,
        foreign_key: ForeignKeyInfo,
    },

    /// A user-declared join. `base_columns` are relative to the parent level.
    CustomJoin {
        join: PerspectiveCustomJoinConfig,
        table: TableRef,
        base_columns: Vec<String>,
    },

    /// A column inferred from sampled documents. `path` starts at the owning table.
    PatternColumn {
        column: PatternColumn,
        path: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct PerspectiveTreeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: PerspectiveNodeKind,
    pub designer_id: Option<DesignerId>,
    pub code_name: String,
    /// Dot-joined chain of ancestor code names.
    pub unique_name: String,
    pub title: String,
    pub is_expandable: bool,
    pub is_expanded: bool,
    /// Displayed as a value column.
    pub is_checked_column: bool,
    /// Joined into the grid as a group of sub-columns.
    pub is_checked_node: bool,
    children: Option<Vec<NodeId>>,
}

impl PerspectiveTreeNode {
    pub fn is_checked(&self) -> bool {
        self.is_checked_column || self.is_checked_node
    }

    /// The table this node loads rows from, for nodes that need their own load.
    pub fn target_table(&self) -> Option<&TableRef> {
        match &self.kind {
            PerspectiveNodeKind::Table { table } => Some(table),
            PerspectiveNodeKind::Column { ref_table, .. } => ref_table.as_ref(),
            PerspectiveNodeKind::ForeignKeyReference { table, .. } => Some(table),
            PerspectiveNodeKind::CustomJoin { table, .. } => Some(table),
            PerspectiveNodeKind::PatternColumn { .. } => None,
        }
    }

    /// A joined table below some parent level (not the root).
    pub fn is_join(&self) -> bool {
        self.parent.is_some() && self.target_table().is_some()
    }

    /// Key under which joined rows or nested documents appear in the parent row.
    pub fn field_name(&self) -> String {
        match &self.kind {
            PerspectiveNodeKind::PatternColumn { column, .. } => column.name.clone(),
            _ => format!("__{}", self.unique_name),
        }
    }

    /// Key of a value column's cell in the parent row.
    pub fn value_field(&self) -> Option<&str> {
        match &self.kind {
            PerspectiveNodeKind::Column { column, .. } => Some(&column.column_name),
            PerspectiveNodeKind::PatternColumn { column, .. } => Some(&column.name),
            _ => None,
        }
    }

    /// Column fetched from the parent table for a value column.
    pub fn column_name(&self) -> Option<&str> {
        match &self.kind {
            PerspectiveNodeKind::Column { column, .. } => Some(&column.column_name),
            PerspectiveNodeKind::PatternColumn { path, .. } => path.first().map(String::as_str),
            _ => None,
        }
    }

    /// Parent-side and child-side binding columns of a join.
    pub fn join_columns(&self) -> Option<(Vec<String>, Vec<String>)> {
        match &self.kind {
            PerspectiveNodeKind::Column {
                foreign_key: Some(fk),
                ref_table: Some(_),
                ..
            } => {
                let column = fk.single_column()?;
                Some((vec![column.column_name.clone()], vec![column.ref_column_name.clone()]))
            }
            PerspectiveNodeKind::ForeignKeyReference { foreign_key, .. } => {
                let column = foreign_key.single_column()?;
                Some((vec![column.ref_column_name.clone()], vec![column.column_name.clone()]))
            }
            PerspectiveNodeKind::CustomJoin { join, base_columns, .. } => Some((
                base_columns.clone(),
                join.columns.iter().map(|c| c.ref_column_name.clone()).collect(),
            )),
            _ => None,
        }
    }
}

/// A child about to be created.
struct NodeDraft {
    kind: PerspectiveNodeKind,
    designer_id: Option<DesignerId>,
    code_name: String,
    title: String,
    is_expandable: bool,
}

// ============================================================================
// TREE
// ============================================================================

pub struct PerspectiveTree<'a> {
    config: &'a PerspectiveConfig,
    dbinfos: &'a MultipleDatabaseInfo,
    patterns: &'a DataPatterns,
    nodes: Vec<PerspectiveTreeNode>,
}

impl<'a> PerspectiveTree<'a> {
    /// Builds the tree for the current configuration.
    pub fn build(
        config: &'a PerspectiveConfig,
        dbinfos: &'a MultipleDatabaseInfo,
        patterns: &'a DataPatterns,
    ) -> Result<Self> {
        let root_config = config
            .root_node()
            .ok_or_else(|| PerspectiveError::MissingRootNode(config.root_designer_id.clone()))?;
        let table = root_config.table_ref();

        let mut tree = PerspectiveTree {
            config,
            dbinfos,
            patterns,
            nodes: Vec::new(),
        };
        let root = tree.add_node(
            None,
            NodeDraft {
                code_name: table.pure_name.clone(),
                title: table.pure_name.clone(),
                kind: PerspectiveNodeKind::Table { table },
                designer_id: Some(config.root_designer_id.clone()),
                is_expandable: true,
            },
        );
        tree.resolve_recursive(root);
        Ok(tree)
    }

    pub fn config(&self) -> &'a PerspectiveConfig {
        self.config
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> Result<&PerspectiveTreeNode> {
        self.nodes.get(id).ok_or(PerspectiveError::UnknownNode(id))
    }

    pub fn nodes(&self) -> &[PerspectiveTreeNode] {
        &self.nodes
    }

    /// Children resolved during build (empty for nodes that were not needed).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .and_then(|n| n.children.as_deref())
            .unwrap_or(&[])
    }

    /// Children of any node, resolving them if the build skipped this node.
    pub fn child_nodes(&mut self, id: NodeId) -> Vec<NodeId> {
        if id >= self.nodes.len() {
            return Vec::new();
        }
        if self.nodes[id].children.is_none() {
            self.resolve_children(id);
        }
        self.children(id).to_vec()
    }

    pub fn find_by_unique_name(&self, unique_name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.unique_name == unique_name)
            .map(|n| n.id)
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut res = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            res.push(parent);
            current = self.nodes[parent].parent;
        }
        res
    }

    /// A reference node is circular when it points back at the table two levels up.
    pub fn is_circular(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if !node.is_join() {
            return false;
        }
        let Some(target) = node.target_table() else {
            return false;
        };
        node.parent
            .and_then(|p| self.nodes[p].parent)
            .and_then(|g| self.nodes[g].target_table())
            .map(|t| t.same_table(target))
            .unwrap_or(false)
    }

    /// The nearest node (self included) that loads its own rows.
    pub fn owner_table_node(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            let node = &self.nodes[current];
            if node.target_table().is_some() {
                return current;
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    fn add_node(&mut self, parent: Option<NodeId>, draft: NodeDraft) -> NodeId {
        let id = self.nodes.len();
        let unique_name = match parent {
            Some(p) => format!("{}.{}", self.nodes[p].unique_name, draft.code_name),
            None => draft.code_name.clone(),
        };

        let exact = self.config.is_checked(&unique_name);
        let below = self.config.has_checked_below(&unique_name);
        let (is_checked_column, is_checked_node) = match (&draft.kind, parent) {
            (_, None) => (false, true),
            (PerspectiveNodeKind::Column { .. }, _) if draft.is_expandable => (exact, below),
            (PerspectiveNodeKind::Column { .. }, _) => (exact, false),
            (PerspectiveNodeKind::PatternColumn { .. }, _) if !draft.is_expandable => (exact, false),
            _ => (false, exact || below),
        };

        self.nodes.push(PerspectiveTreeNode {
            id,
            parent,
            is_expanded: parent.is_none() || self.config.is_expanded(&unique_name),
            kind: draft.kind,
            designer_id: draft.designer_id,
            code_name: draft.code_name,
            unique_name,
            title: draft.title,
            is_expandable: draft.is_expandable,
            is_checked_column,
            is_checked_node,
            children: None,
        });
        id
    }

    fn should_resolve(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.is_expandable
            && (node.parent.is_none() || node.is_expanded || node.is_checked_node || node.designer_id.is_some())
    }

    fn resolve_recursive(&mut self, id: NodeId) {
        if !self.should_resolve(id) {
            return;
        }
        for child in self.resolve_children(id) {
            self.resolve_recursive(child);
        }
    }

    fn resolve_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let drafts = match &self.nodes[id].kind {
            PerspectiveNodeKind::PatternColumn { column, path } => {
                self.pattern_column_children(id, column, path)
            }
            _ => match self.nodes[id].target_table() {
                Some(table) => self.table_children(id, table),
                None => Vec::new(),
            },
        };
        let children: Vec<NodeId> = drafts
            .into_iter()
            .map(|draft| self.add_node(Some(id), draft))
            .collect();
        self.nodes[id].children = Some(children.clone());
        children
    }

    fn pattern_for(&self, designer_id: Option<&DesignerId>) -> Option<&'a PerspectiveDataPattern> {
        let patterns = self.patterns;
        designer_id.and_then(|d| patterns.get(d))
    }

    /// Columns, then reverse foreign keys, then custom joins of a table-like node.
    fn table_children(&self, id: NodeId, table: &TableRef) -> Vec<NodeDraft> {
        let Some(info) = self.dbinfos.find_table(table) else {
            log::debug!("perspective tree: table {} not found, omitting its children", table.pure_name);
            return Vec::new();
        };
        let pattern = self.pattern_for(self.nodes[id].designer_id.as_ref());
        let mut drafts = Vec::new();

        if info.is_collection() {
            if let Some(pattern) = pattern {
                for column in &pattern.columns {
                    drafts.push(pattern_draft(column, vec![column.name.clone()]));
                }
            }
        } else {
            for column in &info.columns {
                let json_column = pattern
                    .and_then(|p| p.find_column(&column.column_name))
                    .filter(|c| c.is_json());
                match json_column {
                    Some(pattern_column) => {
                        drafts.push(pattern_draft(pattern_column, vec![column.column_name.clone()]))
                    }
                    None => drafts.push(self.column_draft(id, table, info, column)),
                }
            }
        }

        let mut references = self.reference_drafts(id, table, info);
        references.sort_by(|a, b| a.title.cmp(&b.title));
        drafts.extend(references);

        let mut joins = self.custom_join_drafts(id, table, None);
        joins.sort_by(|a, b| a.title.cmp(&b.title));
        drafts.extend(joins);

        drafts
    }

    fn column_draft(&self, id: NodeId, table: &TableRef, info: &TableInfo, column: &ColumnInfo) -> NodeDraft {
        let foreign_key = info.single_column_foreign_key(&column.column_name);
        let ref_table = foreign_key
            .map(|fk| TableRef::new(table.target.clone(), fk.ref_schema_name.clone(), fk.ref_table_name.clone()))
            .filter(|r| {
                let found = self.dbinfos.find_table(r).is_some();
                if !found {
                    log::debug!("perspective tree: foreign key target {} not found", r.pure_name);
                }
                found
            });
        let designer_id = match (&ref_table, foreign_key.and_then(|fk| fk.single_column())) {
            (Some(ref_table), Some(fk_column)) => self.find_designer_id_for_node(
                id,
                ref_table,
                &[(fk_column.column_name.clone(), fk_column.ref_column_name.clone())],
            ),
            _ => None,
        };
        NodeDraft {
            is_expandable: ref_table.is_some(),
            kind: PerspectiveNodeKind::Column {
                column: column.clone(),
                foreign_key: foreign_key.cloned(),
                ref_table,
            },
            designer_id,
            code_name: column.column_name.clone(),
            title: column.column_name.clone(),
        }
    }

    /// One node per table whose foreign key points at `info`.
    fn reference_drafts(&self, id: NodeId, table: &TableRef, info: &TableInfo) -> Vec<NodeDraft> {
        let Some(database) = self.dbinfos.database(&table.target) else {
            return Vec::new();
        };
        let referencing: Vec<(&TableInfo, &ForeignKeyInfo)> = database
            .tables_referencing(info.schema_name.as_deref(), &info.pure_name)
            .collect();

        let mut drafts = Vec::new();
        for (ref_info, foreign_key) in &referencing {
            let Some(fk_column) = foreign_key.single_column() else {
                continue;
            };
            let ambiguous = referencing
                .iter()
                .filter(|(t, _)| t.pure_name == ref_info.pure_name && t.schema_name == ref_info.schema_name)
                .count()
                > 1;
            let (code_name, title) = if ambiguous {
                (
                    format!("{}_{}", ref_info.pure_name, fk_column.column_name),
                    format!("{} ({})", ref_info.pure_name, fk_column.column_name),
                )
            } else {
                (ref_info.pure_name.clone(), ref_info.pure_name.clone())
            };
            let ref_table = ref_info.table_ref(&table.target);
            let designer_id = self.find_designer_id_for_node(
                id,
                &ref_table,
                &[(fk_column.ref_column_name.clone(), fk_column.column_name.clone())],
            );
            drafts.push(NodeDraft {
                kind: PerspectiveNodeKind::ForeignKeyReference {
                    table: ref_table,
                    foreign_key: (*foreign_key).clone(),
                },
                designer_id,
                code_name,
                title,
                is_expandable: true,
            });
        }
        drafts
    }

    /// Custom joins declared on the owning table's designer id.
    ///
    /// With `path == None` only joins on plain columns are returned; with a
    /// pattern column path only joins whose base columns sit directly inside
    /// that nested document, with the path prefix stripped.
    fn custom_join_drafts(&self, id: NodeId, table: &TableRef, path: Option<&[String]>) -> Vec<NodeDraft> {
        let owner = self.owner_table_node(id);
        let Some(base_designer_id) = self.nodes[owner].designer_id.as_ref() else {
            return Vec::new();
        };
        let prefix = path.map(|p| format!("{}{}", p.join(PATTERN_PATH_SEPARATOR), PATTERN_PATH_SEPARATOR));
        let used_designer_ids = self.designer_ids_from(id);

        let mut drafts = Vec::new();
        for join in &self.config.custom_joins {
            if &join.base_designer_id != base_designer_id {
                continue;
            }
            let base_columns: Option<Vec<String>> = match &prefix {
                None if join.is_nested() => None,
                None => Some(join.columns.iter().map(|c| c.base_column_name.clone()).collect()),
                Some(prefix) => join
                    .columns
                    .iter()
                    .map(|c| {
                        c.base_column_name
                            .strip_prefix(prefix.as_str())
                            .filter(|rest| !rest.contains(PATTERN_PATH_SEPARATOR))
                            .map(str::to_string)
                    })
                    .collect(),
            };
            let Some(base_columns) = base_columns else {
                continue;
            };

            let join_table = TableRef::new(
                join.target.clone().unwrap_or_else(|| table.target.clone()),
                join.ref_schema_name.clone(),
                join.ref_table_name.clone(),
            );
            if self.dbinfos.find_table(&join_table).is_none() {
                log::debug!("perspective tree: custom join {} targets a missing table", join.join_name);
                continue;
            }
            let designer_id = if used_designer_ids.contains(&&join.ref_node_designer_id) {
                None
            } else {
                Some(join.ref_node_designer_id.clone())
            };
            drafts.push(NodeDraft {
                kind: PerspectiveNodeKind::CustomJoin {
                    join: join.clone(),
                    table: join_table,
                    base_columns,
                },
                designer_id,
                code_name: join.join_name.clone(),
                title: join.join_name.clone(),
                is_expandable: true,
            });
        }
        drafts
    }

    fn pattern_column_children(&self, id: NodeId, column: &PatternColumn, path: &[String]) -> Vec<NodeDraft> {
        let mut drafts: Vec<NodeDraft> = column
            .columns
            .iter()
            .map(|nested| {
                let mut nested_path = path.to_vec();
                nested_path.push(nested.name.clone());
                pattern_draft(nested, nested_path)
            })
            .collect();

        let owner = self.owner_table_node(id);
        if let Some(table) = self.nodes[owner].target_table() {
            let mut joins = self.custom_join_drafts(id, table, Some(path));
            joins.sort_by(|a, b| a.title.cmp(&b.title));
            drafts.extend(joins);
        }
        drafts
    }

    /// Designer ids of a node and all its ancestors.
    fn designer_ids_from(&self, id: NodeId) -> Vec<&DesignerId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.nodes[n].designer_id.as_ref())
            .collect()
    }

    /// Reuses a persisted designer id for a joined child of `parent_id`.
    ///
    /// A reference edge matches when it connects the parent's designer id with
    /// a node for `target` over exactly the given (parent column, child column)
    /// pairs, in either direction. Ids already used on the ancestor chain are
    /// never reused.
    pub fn find_designer_id_for_node(
        &self,
        parent_id: NodeId,
        target: &TableRef,
        columns: &[(String, String)],
    ) -> Option<DesignerId> {
        let parent_designer_id = self.nodes.get(parent_id)?.designer_id.as_ref()?;
        let used_designer_ids = self.designer_ids_from(parent_id);

        for reference in &self.config.references {
            let (candidate, pairs): (&DesignerId, Vec<(String, String)>) =
                if &reference.source_id == parent_designer_id {
                    (
                        &reference.target_id,
                        reference.columns.iter().map(|c| (c.source.clone(), c.target.clone())).collect(),
                    )
                } else if &reference.target_id == parent_designer_id {
                    (
                        &reference.source_id,
                        reference.columns.iter().map(|c| (c.target.clone(), c.source.clone())).collect(),
                    )
                } else {
                    continue;
                };

            if used_designer_ids.contains(&candidate) {
                continue;
            }
            let Some(node_config) = self.config.find_node(candidate) else {
                continue;
            };
            if node_config.table_ref().same_table(target) && same_pairs(&pairs, columns) {
                return Some(candidate.clone());
            }
        }
        None
    }

    // ========================================================================
    // LOAD REQUESTS
    // ========================================================================

    /// Columns a node's rows must carry: its checked value columns, the
    /// parent-side binding columns of checked joins below it and its own
    /// child-side binding columns.
    pub fn data_columns(&self, id: NodeId) -> Vec<String> {
        let mut res: Vec<String> = Vec::new();
        let Some(node) = self.nodes.get(id) else {
            return res;
        };

        if let Some((_, child_columns)) = node.join_columns() {
            for column in &child_columns {
                push_unique(&mut res, column);
            }
        }
        for &child in self.children(id) {
            let child = &self.nodes[child];
            if child.is_checked_column {
                if let Some(column) = child.column_name() {
                    push_unique(&mut res, column);
                }
            }
            if !child.is_checked_node {
                continue;
            }
            match &child.kind {
                PerspectiveNodeKind::PatternColumn { .. } => {
                    if let Some(column) = child.column_name() {
                        push_unique(&mut res, column);
                    }
                }
                _ => {
                    if let Some((parent_columns, _)) = child.join_columns() {
                        for column in &parent_columns {
                            push_unique(&mut res, column);
                        }
                    }
                }
            }
        }
        res
    }

    /// Distinct parent key tuples for a joined node, in first-seen order.
    pub fn parent_binding_values(&self, id: NodeId, parent_rows: &[Value]) -> Vec<Vec<Value>> {
        let Some((parent_columns, _)) = self.nodes.get(id).and_then(|n| n.join_columns()) else {
            return Vec::new();
        };
        let mut res: Vec<Vec<Value>> = Vec::new();
        for row in parent_rows {
            if let Some(tuple) = binding_tuple(row, &parent_columns) {
                if !res.contains(&tuple) {
                    res.push(tuple);
                }
            }
        }
        res
    }

    /// Builds the load request of a table-like node. `parent_rows` are the
    /// rows of the parent level and are only used for joined nodes.
    pub fn get_node_load_props(&self, id: NodeId, parent_rows: &[Value]) -> Option<PerspectiveDataLoadProps> {
        let node = self.nodes.get(id)?;
        let table = node.target_table()?;
        let info = self.dbinfos.find_table(table)?;
        let is_doc = info.is_collection();

        let node_config = node.designer_id.as_ref().and_then(|d| self.config.find_node(d));
        let filters = node_config.map(|n| n.filters.as_slice()).unwrap_or(&[]);
        let data_columns = if is_doc { None } else { Some(self.data_columns(id)) };

        let order_by = match node_config {
            Some(n) if !n.sort.is_empty() => n.sort.clone(),
            _ if is_doc => Vec::new(),
            _ => default_order(info, data_columns.as_deref().unwrap_or(&[])),
        };

        let mut props = PerspectiveDataLoadProps::new(table.target.clone(), info.schema_name.clone(), info.pure_name.clone());
        props.engine_type = if is_doc { EngineType::DocDb } else { EngineType::Sql };
        props.data_columns = data_columns;
        props.order_by = order_by;
        if is_doc {
            props.mongo_condition = mongo_condition(filters);
        } else {
            props.sql_condition = sql_condition(filters);
        }
        if let Some((_, child_columns)) = node.join_columns() {
            props.binding_columns = Some(child_columns);
            props.binding_values = Some(self.parent_binding_values(id, parent_rows));
        }
        props.top_count = PERSPECTIVE_PAGE_SIZE;
        Some(props)
    }

    // ========================================================================
    // TOGGLES (pure configuration transforms)
    // ========================================================================

    /// Checks or unchecks a node.
    ///
    /// Columns toggle their own value. Other expandable nodes toggle the whole
    /// joined group; unchecking removes everything checked below them.
    pub fn toggle_checked(&self, id: NodeId) -> Result<PerspectiveConfig> {
        let node = self.node(id)?;
        let config = self.config.clone();
        if node.parent.is_none() {
            return Ok(config);
        }
        let unique_name = node.unique_name.as_str();
        let is_value_column = matches!(node.kind, PerspectiveNodeKind::Column { .. }) || !node.is_expandable;

        Ok(if is_value_column {
            if node.is_checked_column {
                config.without_checked(unique_name)
            } else {
                config.with_checked(unique_name)
            }
        } else if node.is_checked_node {
            config.without_checked_subtree(unique_name)
        } else {
            self.ensure_designer_id(config.with_checked(unique_name), id)
        })
    }

    /// Joins or un-joins a referenced table, e.g. the table behind a foreign
    /// key column, without touching the column's own value. A newly joined
    /// node gets its columns from default column processing.
    pub fn toggle_reference_checked(&self, id: NodeId) -> Result<PerspectiveConfig> {
        let node = self.node(id)?;
        let config = self.config.clone();
        if !node.is_join() {
            return Ok(config);
        }
        let unique_name = node.unique_name.as_str();
        let is_column = matches!(node.kind, PerspectiveNodeKind::Column { .. });

        Ok(match (node.is_checked_node, is_column) {
            (true, true) => config.without_checked_below(unique_name),
            (true, false) => config.without_checked_subtree(unique_name),
            (false, true) => self.ensure_designer_id(config, id),
            (false, false) => self.ensure_designer_id(config.with_checked(unique_name), id),
        })
    }

    pub fn toggle_expanded(&self, id: NodeId) -> Result<PerspectiveConfig> {
        let node = self.node(id)?;
        let config = self.config.clone();
        Ok(if self.config.is_expanded(&node.unique_name) {
            config.without_expanded(&node.unique_name)
        } else {
            config.with_expanded(&node.unique_name)
        })
    }

    /// Gives a joined node without a designer id its own node config and a
    /// reference edge from its parent, so table-level state can be stored for it.
    pub(crate) fn ensure_designer_id(&self, config: PerspectiveConfig, id: NodeId) -> PerspectiveConfig {
        let node = &self.nodes[id];
        if node.designer_id.is_some() {
            return config;
        }
        let (Some(table), Some((parent_columns, child_columns)), Some(parent)) =
            (node.target_table(), node.join_columns(), node.parent)
        else {
            return config;
        };
        let Some(parent_designer_id) = self.nodes[parent].designer_id.clone() else {
            return config;
        };

        let designer_id = uuid::Uuid::new_v4().to_string();
        let reference = PerspectiveReferenceConfig {
            designer_id: uuid::Uuid::new_v4().to_string(),
            source_id: parent_designer_id,
            target_id: designer_id.clone(),
            columns: parent_columns
                .into_iter()
                .zip(child_columns)
                .map(|(source, target)| PerspectiveReferenceColumn { source, target })
                .collect(),
            is_auto_generated: true,
        };
        config
            .with_node(PerspectiveNodeConfig::new(designer_id, table))
            .with_reference(reference)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn pattern_draft(column: &PatternColumn, path: Vec<String>) -> NodeDraft {
    NodeDraft {
        code_name: path.join(PATTERN_PATH_SEPARATOR),
        title: column.name.clone(),
        is_expandable: !column.columns.is_empty(),
        kind: PerspectiveNodeKind::PatternColumn {
            column: column.clone(),
            path,
        },
        designer_id: None,
    }
}

fn push_unique(res: &mut Vec<String>, column: &str) {
    if !res.iter().any(|c| c == column) {
        res.push(column.to_string());
    }
}

fn same_pairs(a: &[(String, String)], b: &[(String, String)]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Primary key order, falling back to the first loaded column.
fn default_order(info: &TableInfo, data_columns: &[String]) -> Vec<PerspectiveSortItem> {
    if !info.primary_key.is_empty() {
        return info.primary_key.iter().map(PerspectiveSortItem::asc).collect();
    }
    data_columns
        .first()
        .or_else(|| info.columns.first().map(|c| &c.column_name))
        .map(|c| vec![PerspectiveSortItem::asc(c.clone())])
        .unwrap_or_default()
}
