//! FILENAME: core/perspective-engine/src/error.rs

use thiserror::Error;
use crate::nodes::NodeId;

#[derive(Error, Debug)]
pub enum PerspectiveError {
    /// Reported by the query-execution collaborator; the message is passed through verbatim.
    #[error("{0}")]
    Load(String),

    #[error("Invalid perspective configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Root node {0} is missing from the configuration")]
    MissingRootNode(String),

    #[error("Unknown tree node: {0}")]
    UnknownNode(NodeId),
}

pub type Result<T> = std::result::Result<T, PerspectiveError>;
