//! FILENAME: core/perspective-engine/src/lib.rs
//! Perspective subsystem: hierarchical views over joined tables and documents.
//!
//! A perspective is a tree of tables joined by foreign keys, reverse keys,
//! custom joins and nested document fields. The user checks columns anywhere
//! in the tree and sees the result as one flat grid with grouped headers and
//! merged cells.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the perspective IS)
//! - `schema`: Schema metadata supplied by the host (read-only)
//! - `pattern`: Structure detection for schemaless collections
//! - `condition`: Filters translated for relational and document engines
//! - `nodes`: The node tree built from configuration and metadata
//! - `defaults`: Default columns for newly joined tables
//! - `cache`: Loaded rows per query shape (HOW we avoid refetching)
//! - `provider`: Cache-aware loading through the host's data loader
//! - `load`: Nested rows for the whole tree
//! - `view`: Renderable output for the frontend (WHAT we display)
//! - `engine`: Display flattening (HOW we flatten)

pub mod definition;
pub mod schema;
pub mod pattern;
pub mod condition;
pub mod nodes;
pub mod defaults;
pub mod cache;
pub mod provider;
pub mod load;
pub mod view;
pub mod engine;
pub mod error;

pub use definition::*;
pub use schema::*;
pub use pattern::*;
pub use condition::{mongo_condition, sql_condition, SqlCondition};
pub use nodes::{NodeId, PerspectiveNodeKind, PerspectiveTree, PerspectiveTreeNode, PATTERN_PATH_SEPARATOR};
pub use defaults::{perspective_default_column, process_perspective_default_columns, DefaultColumn};
pub use cache::{PerspectiveBindingGroup, PerspectiveCache, PerspectiveCacheTable};
pub use provider::*;
pub use load::{load_perspective_data, PerspectiveLoadedData, INCOMPLETE_ROWS_INDICATOR};
pub use view::*;
pub use engine::calculate_display;
pub use error::{PerspectiveError, Result};
