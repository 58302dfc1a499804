#![forbid(unsafe_code)]

use crate::model::IdeaState;

/// Rejections raised before any state changes.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("an idea cannot be connected to itself ({id})")]
    SelfLoop { id: String },

    #[error("an edge from {parent_id} to {child_id} already exists")]
    DuplicateEdge { parent_id: String, child_id: String },

    #[error("edge {parent_id} -> {child_id} ({edge_type}) would create a cycle")]
    Cycle {
        parent_id: String,
        child_id: String,
        edge_type: String,
    },

    #[error("unknown idea: {0}")]
    UnknownIdea(String),

    #[error("unknown edge: {0}")]
    UnknownEdge(String),

    #[error("invalid dimensions {width}x{height}; both must be positive")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("idea state cannot move from {} to {}", from.as_str(), to.as_str())]
    InvalidStateTransition { from: IdeaState, to: IdeaState },

    #[error("edge type must not be empty")]
    EmptyEdgeType,

    #[error("nothing to update")]
    EmptyPatch,

    #[error("idea state is owned by enrichment and cannot be edited")]
    StateNotEditable,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?} ({expected})")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}
