//! FILENAME: core/perspective-engine/src/schema.rs
//! Schema metadata consumed by the node tree.
//!
//! These structures are produced by an external introspection layer and are
//! only ever read here. The tree uses them to decide which columns a table
//! has, which single-column foreign keys can be expanded and which tables
//! point back at a given table.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// DATABASE IDENTITY
// ============================================================================

/// Identifies one database on one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTarget {
    pub conid: String,
    pub database: String,
}

impl DatabaseTarget {
    pub fn new(conid: impl Into<String>, database: impl Into<String>) -> Self {
        DatabaseTarget {
            conid: conid.into(),
            database: database.into(),
        }
    }
}

/// What kind of object a table-like source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableKind {
    Table,
    View,
    /// Schemaless document collection; columns come from sampled data.
    Collection,
}

impl Default for TableKind {
    fn default() -> Self {
        TableKind::Table
    }
}

/// A reference to a table-like object in a specific database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub target: DatabaseTarget,
    pub schema_name: Option<String>,
    pub pure_name: String,
}

impl TableRef {
    pub fn new(target: DatabaseTarget, schema_name: Option<String>, pure_name: impl Into<String>) -> Self {
        TableRef {
            target,
            schema_name,
            pure_name: pure_name.into(),
        }
    }

    /// Loose identity comparison: a missing schema on either side matches any schema.
    pub fn same_table(&self, other: &TableRef) -> bool {
        self.target == other.target
            && self.pure_name == other.pure_name
            && schema_matches(self.schema_name.as_deref(), other.schema_name.as_deref())
    }
}

fn schema_matches(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// ============================================================================
// TABLE METADATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: Option<String>,
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnInfo {
    pub fn new(column_name: impl Into<String>, data_type: Option<&str>) -> Self {
        ColumnInfo {
            column_name: column_name.into(),
            data_type: data_type.map(str::to_string),
            not_null: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyColumn {
    pub column_name: String,
    pub ref_column_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyInfo {
    pub constraint_name: Option<String>,
    pub ref_schema_name: Option<String>,
    pub ref_table_name: String,
    pub columns: Vec<ForeignKeyColumn>,
}

impl ForeignKeyInfo {
    /// The column pair of a single-column key. Composite keys are not expandable.
    pub fn single_column(&self) -> Option<&ForeignKeyColumn> {
        match self.columns.as_slice() {
            [column] => Some(column),
            _ => None,
        }
    }
}

/// A table, view or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub schema_name: Option<String>,
    pub pure_name: String,
    #[serde(default)]
    pub kind: TableKind,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl TableInfo {
    pub fn new(pure_name: impl Into<String>) -> Self {
        TableInfo {
            schema_name: None,
            pure_name: pure_name.into(),
            kind: TableKind::Table,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn collection(pure_name: impl Into<String>) -> Self {
        TableInfo {
            kind: TableKind::Collection,
            ..TableInfo::new(pure_name)
        }
    }

    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    pub fn with_kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_column(mut self, column_name: &str, data_type: &str) -> Self {
        self.columns.push(ColumnInfo::new(column_name, Some(data_type)));
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Adds a single-column foreign key `column_name -> ref_table.ref_column_name`.
    pub fn with_foreign_key(mut self, column_name: &str, ref_table_name: &str, ref_column_name: &str) -> Self {
        self.foreign_keys.push(ForeignKeyInfo {
            constraint_name: Some(format!("FK_{}_{}", self.pure_name, column_name)),
            ref_schema_name: None,
            ref_table_name: ref_table_name.to_string(),
            columns: vec![ForeignKeyColumn {
                column_name: column_name.to_string(),
                ref_column_name: ref_column_name.to_string(),
            }],
        });
        self
    }

    pub fn find_column(&self, column_name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.column_name == column_name)
    }

    /// The single-column foreign key declared on `column_name`, if any.
    pub fn single_column_foreign_key(&self, column_name: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys.iter().find(|fk| {
            fk.single_column()
                .map(|c| c.column_name == column_name)
                .unwrap_or(false)
        })
    }

    pub fn is_collection(&self) -> bool {
        self.kind == TableKind::Collection
    }

    pub fn table_ref(&self, target: &DatabaseTarget) -> TableRef {
        TableRef::new(target.clone(), self.schema_name.clone(), self.pure_name.clone())
    }
}

// ============================================================================
// DATABASE METADATA
// ============================================================================

/// All table-like objects of one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub tables: Vec<TableInfo>,
}

impl DatabaseInfo {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        DatabaseInfo { tables }
    }

    pub fn find_table(&self, schema_name: Option<&str>, pure_name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.pure_name == pure_name && schema_matches(t.schema_name.as_deref(), schema_name))
    }

    /// Every (table, foreign key) pair whose single-column key points at the given table.
    pub fn tables_referencing<'a>(
        &'a self,
        schema_name: Option<&'a str>,
        pure_name: &'a str,
    ) -> impl Iterator<Item = (&'a TableInfo, &'a ForeignKeyInfo)> + 'a {
        self.tables.iter().flat_map(move |table| {
            table
                .foreign_keys
                .iter()
                .filter(move |fk| {
                    fk.single_column().is_some()
                        && fk.ref_table_name == pure_name
                        && schema_matches(fk.ref_schema_name.as_deref(), schema_name)
                })
                .map(move |fk| (table, fk))
        })
    }
}

/// Schema metadata for every database a perspective touches.
#[derive(Debug, Clone, Default)]
pub struct MultipleDatabaseInfo {
    databases: BTreeMap<DatabaseTarget, DatabaseInfo>,
}

impl MultipleDatabaseInfo {
    pub fn new() -> Self {
        MultipleDatabaseInfo::default()
    }

    pub fn single(target: DatabaseTarget, info: DatabaseInfo) -> Self {
        let mut res = MultipleDatabaseInfo::new();
        res.insert(target, info);
        res
    }

    pub fn insert(&mut self, target: DatabaseTarget, info: DatabaseInfo) {
        self.databases.insert(target, info);
    }

    pub fn database(&self, target: &DatabaseTarget) -> Option<&DatabaseInfo> {
        self.databases.get(target)
    }

    pub fn find_table(&self, table: &TableRef) -> Option<&TableInfo> {
        self.database(&table.target)?
            .find_table(table.schema_name.as_deref(), &table.pure_name)
    }
}
