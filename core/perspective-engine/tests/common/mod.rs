//! FILENAME: core/perspective-engine/tests/common/mod.rs
//! Test harness and fixtures for perspective engine integration tests.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use perspective_engine::cache::binding_tuple_eq;
use perspective_engine::{
    analyse_data_pattern, binding_tuple, DataPatterns, DatabaseInfo, DatabaseTarget,
    MultipleDatabaseInfo, PerspectiveConfig, PerspectiveDataLoadProps, PerspectiveDataLoader,
    PerspectiveError, PerspectiveGroupSize, PerspectiveTree, Result, SortOrder, TableInfo, TableRef,
};

pub const ROOT_ID: &str = "root";

// ============================================================================
// SCHEMA FIXTURES
// ============================================================================

pub fn chinook_target() -> DatabaseTarget {
    DatabaseTarget::new("local", "Chinook")
}

pub fn artist_table() -> TableInfo {
    TableInfo::new("Artist")
        .with_column("ArtistId", "int")
        .with_column("Name", "nvarchar(120)")
        .with_primary_key(&["ArtistId"])
}

pub fn album_table() -> TableInfo {
    TableInfo::new("Album")
        .with_column("AlbumId", "int")
        .with_column("Title", "nvarchar(160)")
        .with_column("ArtistId", "int")
        .with_primary_key(&["AlbumId"])
        .with_foreign_key("ArtistId", "Artist", "ArtistId")
}

pub fn track_table() -> TableInfo {
    TableInfo::new("Track")
        .with_column("TrackId", "int")
        .with_column("Name", "nvarchar(200)")
        .with_column("AlbumId", "int")
        .with_column("Milliseconds", "int")
        .with_primary_key(&["TrackId"])
        .with_foreign_key("AlbumId", "Album", "AlbumId")
}

pub fn invoice_line_table() -> TableInfo {
    TableInfo::new("InvoiceLine")
        .with_column("InvoiceLineId", "int")
        .with_column("TrackId", "int")
        .with_column("Quantity", "int")
        .with_primary_key(&["InvoiceLineId"])
        .with_foreign_key("TrackId", "Track", "TrackId")
}

pub fn chinook_dbinfos() -> MultipleDatabaseInfo {
    MultipleDatabaseInfo::single(
        chinook_target(),
        DatabaseInfo::new(vec![artist_table(), album_table(), track_table(), invoice_line_table()]),
    )
}

pub fn table_ref(pure_name: &str) -> TableRef {
    TableRef::new(chinook_target(), None, pure_name)
}

/// A configuration rooted at the given Chinook table.
pub fn config_for(pure_name: &str) -> PerspectiveConfig {
    PerspectiveConfig::new(ROOT_ID, &table_ref(pure_name))
}

pub fn config_with_checked(pure_name: &str, checked: &[&str]) -> PerspectiveConfig {
    checked
        .iter()
        .fold(config_for(pure_name), |config, name| config.with_checked(name))
}

// ============================================================================
// DATA FIXTURES
// ============================================================================

pub fn artist_rows() -> Vec<Value> {
    vec![
        json!({ "ArtistId": 1, "Name": "AC/DC" }),
        json!({ "ArtistId": 2, "Name": "Accept" }),
        json!({ "ArtistId": 3, "Name": "Aerosmith" }),
        json!({ "ArtistId": 4, "Name": "Alanis Morissette" }),
    ]
}

pub fn album_rows() -> Vec<Value> {
    vec![
        json!({ "AlbumId": 1, "Title": "For Those About To Rock We Salute You", "ArtistId": 1 }),
        json!({ "AlbumId": 2, "Title": "Balls to the Wall", "ArtistId": 2 }),
        json!({ "AlbumId": 3, "Title": "Restless and Wild", "ArtistId": 2 }),
        json!({ "AlbumId": 4, "Title": "Let There Be Rock", "ArtistId": 1 }),
        json!({ "AlbumId": 5, "Title": "Big Ones", "ArtistId": 3 }),
        json!({ "AlbumId": 6, "Title": "Jagged Little Pill", "ArtistId": 4 }),
    ]
}

pub fn track_rows() -> Vec<Value> {
    vec![
        json!({ "TrackId": 1, "Name": "For Those About To Rock (We Salute You)", "AlbumId": 1, "Milliseconds": 343719 }),
        json!({ "TrackId": 2, "Name": "Balls to the Wall", "AlbumId": 2, "Milliseconds": 342562 }),
        json!({ "TrackId": 3, "Name": "Fast As a Shark", "AlbumId": 3, "Milliseconds": 230619 }),
        json!({ "TrackId": 6, "Name": "Put The Finger On You", "AlbumId": 1, "Milliseconds": 205662 }),
        json!({ "TrackId": 15, "Name": "Go Down", "AlbumId": 4, "Milliseconds": 331180 }),
        json!({ "TrackId": 16, "Name": "Dog Eat Dog", "AlbumId": 4, "Milliseconds": 215196 }),
        json!({ "TrackId": 23, "Name": "Walk On Water", "AlbumId": 5, "Milliseconds": 295680 }),
        json!({ "TrackId": 39, "Name": "All I Really Want", "AlbumId": 6, "Milliseconds": 284891 }),
    ]
}

pub fn invoice_line_rows() -> Vec<Value> {
    vec![
        json!({ "InvoiceLineId": 1, "TrackId": 2, "Quantity": 1 }),
        json!({ "InvoiceLineId": 2, "TrackId": 15, "Quantity": 1 }),
    ]
}

pub fn chinook_loader() -> MockLoader {
    MockLoader::new()
        .with_table("Artist", artist_rows())
        .with_table("Album", album_rows())
        .with_table("Track", track_rows())
        .with_table("InvoiceLine", invoice_line_rows())
}

// ============================================================================
// DOCUMENT FIXTURES
// ============================================================================

pub fn mongo_target() -> DatabaseTarget {
    DatabaseTarget::new("mongo", "social")
}

pub fn account_ref() -> TableRef {
    TableRef::new(mongo_target(), None, "Account")
}

pub fn account_documents() -> Vec<Value> {
    vec![
        json!({
            "_id": { "$oid": "65f0c0ffee0000000000000a" },
            "name": "jan",
            "follows": [{ "name": "lucie" }, { "name": "petr" }],
        }),
        json!({
            "_id": { "$oid": "65f0c0ffee0000000000000b" },
            "name": "lucie",
            "follows": [],
        }),
    ]
}

pub fn mongo_dbinfos() -> MultipleDatabaseInfo {
    MultipleDatabaseInfo::single(mongo_target(), DatabaseInfo::new(vec![TableInfo::collection("Account")]))
}

/// Patterns sampled from the account documents for the root node.
pub fn account_patterns() -> DataPatterns {
    let mut patterns = DataPatterns::new();
    patterns.insert(ROOT_ID.to_string(), analyse_data_pattern(&account_ref(), &account_documents()));
    patterns
}

pub fn account_config(checked: &[&str]) -> PerspectiveConfig {
    checked
        .iter()
        .fold(PerspectiveConfig::new(ROOT_ID, &account_ref()), |config, name| config.with_checked(name))
}

// ============================================================================
// HARNESS
// ============================================================================

/// Owns the inputs a tree borrows from.
pub struct TestHarness {
    pub config: PerspectiveConfig,
    pub dbinfos: MultipleDatabaseInfo,
    pub patterns: DataPatterns,
}

impl TestHarness {
    pub fn chinook(config: PerspectiveConfig) -> Self {
        TestHarness {
            config,
            dbinfos: chinook_dbinfos(),
            patterns: DataPatterns::new(),
        }
    }

    pub fn accounts(checked: &[&str]) -> Self {
        TestHarness {
            config: account_config(checked),
            dbinfos: mongo_dbinfos(),
            patterns: account_patterns(),
        }
    }

    pub fn tree(&self) -> PerspectiveTree<'_> {
        PerspectiveTree::build(&self.config, &self.dbinfos, &self.patterns).unwrap()
    }
}

/// Titles of the resolved children of the node with the given unique name.
pub fn child_titles(tree: &PerspectiveTree, unique_name: &str) -> Vec<String> {
    let id = tree.find_by_unique_name(unique_name).unwrap();
    tree.children(id)
        .iter()
        .map(|&c| tree.node(c).unwrap().title.clone())
        .collect()
}

// ============================================================================
// MOCK LOADER
// ============================================================================

/// In-memory loader over fixed tables. Records every request it receives.
pub struct MockLoader {
    tables: BTreeMap<String, Vec<Value>>,
    requests: Mutex<Vec<PerspectiveDataLoadProps>>,
    grouping_requests: Mutex<Vec<PerspectiveDataLoadProps>>,
    failure: Mutex<Option<String>>,
}

impl MockLoader {
    pub fn new() -> Self {
        MockLoader {
            tables: BTreeMap::new(),
            requests: Mutex::new(Vec::new()),
            grouping_requests: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn with_table(mut self, pure_name: &str, rows: Vec<Value>) -> Self {
        self.tables.insert(pure_name.to_string(), rows);
        self
    }

    /// Every following request fails with this message.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn requests(&self) -> Vec<PerspectiveDataLoadProps> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_for(&self, pure_name: &str) -> Vec<PerspectiveDataLoadProps> {
        self.requests()
            .into_iter()
            .filter(|r| r.pure_name == pure_name)
            .collect()
    }

    pub fn grouping_requests(&self) -> Vec<PerspectiveDataLoadProps> {
        self.grouping_requests.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(PerspectiveError::Load(message)),
            None => Ok(()),
        }
    }

    fn matching_rows(&self, props: &PerspectiveDataLoadProps) -> Vec<Value> {
        let mut rows: Vec<Value> = self.tables.get(&props.pure_name).cloned().unwrap_or_default();
        if let (Some(columns), Some(values)) = (&props.binding_columns, &props.binding_values) {
            rows.retain(|row| {
                binding_tuple(row, columns)
                    .map(|tuple| values.iter().any(|v| binding_tuple_eq(v, &tuple)))
                    .unwrap_or(false)
            });
        }
        rows.sort_by(|a, b| {
            for item in &props.order_by {
                let ordering = compare_values(a.get(&item.column_name), b.get(&item.column_name));
                let ordering = match item.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        rows
    }
}

#[async_trait]
impl PerspectiveDataLoader for MockLoader {
    async fn load_data(&self, props: &PerspectiveDataLoadProps) -> Result<Vec<Value>> {
        self.requests.lock().unwrap().push(props.clone());
        self.check_failure()?;

        let mut rows = self.matching_rows(props);
        if let Some(range) = props.range {
            rows = rows.into_iter().skip(range.offset).take(range.limit).collect();
        }
        if let Some(columns) = &props.data_columns {
            rows = rows.iter().map(|row| project(row, columns)).collect();
        }
        Ok(rows)
    }

    async fn load_grouping(&self, props: &PerspectiveDataLoadProps) -> Result<Vec<PerspectiveGroupSize>> {
        self.grouping_requests.lock().unwrap().push(props.clone());
        self.check_failure()?;

        let columns = props.binding_columns.clone().unwrap_or_default();
        let rows = self.tables.get(&props.pure_name).cloned().unwrap_or_default();
        let mut res = Vec::new();
        for tuple in props.binding_values.iter().flatten() {
            let group_size = rows
                .iter()
                .filter(|row| {
                    binding_tuple(row, &columns)
                        .map(|values| binding_tuple_eq(&values, tuple))
                        .unwrap_or(false)
                })
                .count();
            if group_size > 0 {
                res.push(PerspectiveGroupSize {
                    binding_values: tuple.clone(),
                    group_size,
                });
            }
        }
        Ok(res)
    }
}

fn project(row: &Value, columns: &[String]) -> Value {
    let mut map = Map::new();
    for column in columns {
        if let Some(value) = row.get(column) {
            map.insert(column.clone(), value.clone());
        }
    }
    Value::Object(map)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
