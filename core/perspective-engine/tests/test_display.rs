//! FILENAME: core/perspective-engine/tests/test_display.rs
//! PURPOSE: End-to-end tests: tree, loading through the provider, flattening.

mod common;

use std::collections::BTreeMap;

use common::{chinook_loader, config_with_checked, TestHarness};
use perspective_engine::{
    calculate_display, load_perspective_data, JoinIdGenerator, PerspectiveDataProvider,
    PerspectiveDisplay, PerspectiveLoadSettings, INCOMPLETE_ROWS_INDICATOR,
};
use serde_json::{json, Value};

async fn display_for(harness: &TestHarness, counts: &BTreeMap<String, usize>) -> PerspectiveDisplay {
    let tree = harness.tree();
    let mut provider = PerspectiveDataProvider::new(chinook_loader());
    let loaded = load_perspective_data(&tree, &mut provider, counts, &PerspectiveLoadSettings::default())
        .await
        .unwrap();
    calculate_display(&tree, &loaded.rows, None)
}

fn cell(display: &PerspectiveDisplay, row: usize, column: usize) -> Option<Value> {
    display.rows[row].row_data[column].clone()
}

// ============================================================================
// ONE LEVEL: Artist -> Album
// ============================================================================

#[tokio::test]
async fn test_one_level_row_spans() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let display = display_for(&harness, &BTreeMap::new()).await;

    assert_eq!(display.columns.len(), 2);
    assert_eq!(display.rows.len(), 6);

    assert_eq!(cell(&display, 0, 0), Some(json!("AC/DC")));
    assert_eq!(cell(&display, 0, 1), Some(json!("For Those About To Rock We Salute You")));
    assert_eq!(display.rows[0].row_spans, vec![2, 1]);

    assert_eq!(cell(&display, 1, 0), None);
    assert_eq!(cell(&display, 1, 1), Some(json!("Let There Be Rock")));
    assert!(display.rows[1].row_cell_skips[0]);
    assert!(!display.rows[1].row_cell_skips[1]);

    assert_eq!(cell(&display, 2, 0), Some(json!("Accept")));
    assert_eq!(display.rows[2].row_spans, vec![2, 1]);
    assert_eq!(cell(&display, 4, 0), Some(json!("Aerosmith")));
    assert_eq!(display.rows[4].row_spans, vec![1, 1]);
    assert!(display.incomplete_paths.is_empty());
}

#[tokio::test]
async fn test_one_level_headers() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let display = display_for(&harness, &BTreeMap::new()).await;

    assert_eq!(display.column_level_count, 3);

    let name = &display.columns[0];
    assert_eq!(name.title, "Name");
    assert_eq!(name.parent_titles, vec!["Artist"]);
    assert!(name.show_parent(0));
    assert_eq!(name.col_span(0), 2);
    assert_eq!(name.row_span(display.column_level_count), 2);

    let title = &display.columns[1];
    assert_eq!(title.parent_titles, vec!["Artist", "Album"]);
    assert_eq!(title.parent_unique_names, vec!["Artist", "Artist.Album"]);
    assert!(!title.show_parent(0));
    assert!(title.show_parent(1));
    assert_eq!(title.col_span(1), 1);
    assert_eq!(title.row_span(display.column_level_count), 1);
}

#[tokio::test]
async fn test_load_counts_per_unique_name() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let display = display_for(&harness, &BTreeMap::new()).await;

    assert_eq!(display.load_counts.get("Artist"), Some(&4));
    assert_eq!(display.load_counts.get("Artist.Album"), Some(&6));
}

// ============================================================================
// TWO LEVELS: Artist -> Album -> Track
// ============================================================================

#[tokio::test]
async fn test_two_level_row_spans() {
    let harness = TestHarness::chinook(config_with_checked(
        "Artist",
        &["Artist.Name", "Artist.Album.Title", "Artist.Album.Track.Name"],
    ));
    let display = display_for(&harness, &BTreeMap::new()).await;

    assert_eq!(display.columns.len(), 3);
    assert_eq!(display.column_level_count, 4);

    assert_eq!(display.rows[0].row_spans, vec![4, 2, 1]);
    assert_eq!(cell(&display, 0, 2), Some(json!("For Those About To Rock (We Salute You)")));
    assert_eq!(cell(&display, 1, 2), Some(json!("Put The Finger On You")));
    assert_eq!(cell(&display, 2, 1), Some(json!("Let There Be Rock")));
    assert_eq!(display.rows[2].row_spans, vec![1, 2, 1]);
    assert!(display.rows[3].row_cell_skips[0]);
    assert!(display.rows[3].row_cell_skips[1]);

    // 4 AC/DC tracks, 2 Accept, 1 Aerosmith, 1 Alanis Morissette
    assert_eq!(display.rows.len(), 8);
}

// ============================================================================
// SIDE-BY-SIDE JOINS
// ============================================================================

#[tokio::test]
async fn test_sibling_joins_align_by_index() {
    // Album has one artist (fk column) and up to two tracks (reverse key).
    let harness = TestHarness::chinook(config_with_checked(
        "Album",
        &["Album.Title", "Album.ArtistId.Name", "Album.Track.Name"],
    ));
    let display = display_for(&harness, &BTreeMap::new()).await;

    let titles: Vec<&str> = display.columns.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Title", "Name", "Name"]);

    // First album: 1 artist row, 2 tracks -> 2 logical rows.
    assert_eq!(cell(&display, 0, 0), Some(json!("For Those About To Rock We Salute You")));
    assert_eq!(cell(&display, 0, 1), Some(json!("AC/DC")));
    assert_eq!(cell(&display, 1, 1), None);
    assert_eq!(cell(&display, 1, 2), Some(json!("Put The Finger On You")));
    assert_eq!(display.rows[0].row_spans, vec![2, 1, 1]);
    // The artist cell below its own range belongs to a different join group.
    assert!(!display.rows[1].row_cell_skips[1]);
}

// ============================================================================
// INCOMPLETE LOADS
// ============================================================================

#[tokio::test]
async fn test_incomplete_root_appends_marker() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let counts = BTreeMap::from([("Artist".to_string(), 2)]);
    let display = display_for(&harness, &counts).await;

    let last = display.rows.last().unwrap();
    assert!(last.is_incomplete_marker());
    assert_eq!(last.incomplete_rows_indicator, Some(vec!["Artist".to_string()]));
    assert_eq!(display.incomplete_paths, vec!["Artist"]);
    // AC/DC and Accept with two albums each.
    assert_eq!(display.data_rows().count(), 4);
    assert!(last.row_cell_skips.iter().all(|s| !s));
}

#[tokio::test]
async fn test_incomplete_child_leaves_unloaded_parents_without_rows() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let tree = harness.tree();
    let mut provider = PerspectiveDataProvider::new(chinook_loader());
    let counts = BTreeMap::from([("Artist.Album".to_string(), 1)]);
    let loaded = load_perspective_data(&tree, &mut provider, &counts, &PerspectiveLoadSettings::default())
        .await
        .unwrap();

    assert_eq!(loaded.incomplete_paths, vec!["Artist.Album"]);
    assert_eq!(loaded.rows[0]["__Artist.Album"].as_array().map(Vec::len), Some(2));
    assert!(loaded.rows[1].get("__Artist.Album").is_none());
    assert_eq!(
        loaded.rows.last().unwrap()[INCOMPLETE_ROWS_INDICATOR],
        json!(["Artist.Album"])
    );

    let display = calculate_display(&tree, &loaded.rows, None);
    // AC/DC with 2 albums, then 3 artists with no album rows yet, then the marker.
    assert_eq!(display.rows.len(), 6);
    assert_eq!(cell(&display, 2, 0), Some(json!("Accept")));
    assert_eq!(cell(&display, 2, 1), None);
    assert!(display.rows[5].is_incomplete_marker());
}

#[tokio::test]
async fn test_marker_rows_never_join_runs() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name"]));
    let tree = harness.tree();
    let rows = vec![
        json!({ "Name": "AC/DC" }),
        json!({ (INCOMPLETE_ROWS_INDICATOR): ["Artist"] }),
        json!({}),
    ];
    let display = calculate_display(&tree, &rows, None);

    assert_eq!(display.rows.len(), 3);
    assert!(display.rows[1].is_incomplete_marker());
    assert_eq!(display.rows[0].row_spans, vec![1]);
    assert!(!display.rows[2].row_cell_skips[0]);
}

// ============================================================================
// SCHEMALESS DOCUMENTS
// ============================================================================

#[tokio::test]
async fn test_schemaless_nested_array() {
    let harness = TestHarness::accounts(&["Account.name", "Account.follows.follows::name"]);
    let tree = harness.tree();
    let mut provider = PerspectiveDataProvider::new(common::MockLoader::new().with_table("Account", common::account_documents()));
    let loaded = load_perspective_data(&tree, &mut provider, &BTreeMap::new(), &PerspectiveLoadSettings::default())
        .await
        .unwrap();
    let display = calculate_display(&tree, &loaded.rows, None);

    assert_eq!(display.columns.len(), 2);
    assert_eq!(display.columns[1].parent_titles, vec!["Account", "follows"]);

    assert_eq!(cell(&display, 0, 0), Some(json!("jan")));
    assert_eq!(cell(&display, 0, 1), Some(json!("lucie")));
    assert_eq!(cell(&display, 1, 0), None);
    assert_eq!(cell(&display, 1, 1), Some(json!("petr")));
    assert!(display.rows[1].row_cell_skips[0]);

    // lucie follows nobody: still one row, blank under the nested group.
    assert_eq!(cell(&display, 2, 0), Some(json!("lucie")));
    assert_eq!(cell(&display, 2, 1), None);
    assert_eq!(display.rows.len(), 3);

    let request = &provider.loader().requests()[0];
    assert_eq!(request.data_columns, None);
}

#[test]
fn test_nested_object_counts_as_one_row() {
    let harness = TestHarness {
        config: common::account_config(&["Account.name", "Account.address.address::city"]),
        dbinfos: common::mongo_dbinfos(),
        patterns: {
            let docs = vec![json!({ "name": "jan", "address": { "city": "Brno" } })];
            let mut patterns = perspective_engine::DataPatterns::new();
            patterns.insert(
                common::ROOT_ID.to_string(),
                perspective_engine::analyse_data_pattern(&common::account_ref(), &docs),
            );
            patterns
        },
    };
    let tree = harness.tree();
    let rows = vec![json!({ "name": "jan", "address": { "city": "Brno" } })];
    let display = calculate_display(&tree, &rows, None);

    assert_eq!(display.rows.len(), 1);
    assert_eq!(cell(&display, 0, 1), Some(json!("Brno")));
}

// ============================================================================
// JOIN IDS
// ============================================================================

#[test]
fn test_shared_join_id_generator_is_monotonic() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name"]));
    let tree = harness.tree();
    let rows = vec![json!({ "Name": "AC/DC" }), json!({ "Name": "Accept" })];

    let generator = JoinIdGenerator::new();
    calculate_display(&tree, &rows, Some(&generator));
    let after_first = generator.next_id();
    calculate_display(&tree, &rows, Some(&generator));
    assert!(generator.next_id() > after_first);
}

#[test]
fn test_missing_nested_field_contributes_no_rows() {
    let harness = TestHarness::chinook(config_with_checked("Artist", &["Artist.Name", "Artist.Album.Title"]));
    let tree = harness.tree();
    let rows = vec![
        json!({ "Name": "AC/DC", "__Artist.Album": [] }),
        json!({ "Name": "Accept" }),
    ];
    let display = calculate_display(&tree, &rows, None);

    assert_eq!(display.rows.len(), 2);
    assert_eq!(cell(&display, 0, 1), None);
    assert_eq!(cell(&display, 1, 0), Some(json!("Accept")));
}

#[test]
fn test_nested_marker_gets_its_own_row() {
    let harness = TestHarness::chinook(config_with_checked(
        "Album",
        &["Album.Title", "Album.ArtistId.Name", "Album.Track.Name"],
    ));
    let tree = harness.tree();
    let rows = vec![json!({
        "AlbumId": 1,
        "Title": "For Those About To Rock We Salute You",
        "ArtistId": 1,
        "__Album.ArtistId": [{ "ArtistId": 1, "Name": "AC/DC" }],
        "__Album.Track": [{ (INCOMPLETE_ROWS_INDICATOR): ["Album.Track"] }],
    })];

    let display = calculate_display(&tree, &rows, None);

    assert_eq!(display.rows.len(), 2);
    assert!(!display.rows[0].is_incomplete_marker());
    assert_eq!(cell(&display, 0, 0), Some(json!("For Those About To Rock We Salute You")));
    let artist = display.find_column("Album.ArtistId.Name").unwrap().column_index;
    assert_eq!(cell(&display, 0, artist), Some(json!("AC/DC")));

    assert_eq!(display.rows[1].incomplete_rows_indicator, Some(vec!["Album.Track".to_string()]));
    assert_eq!(display.data_rows().count(), 1);
    assert_eq!(display.incomplete_paths, vec!["Album.Track"]);
}
