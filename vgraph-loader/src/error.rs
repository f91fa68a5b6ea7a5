//! Error types for loading vector graphs into a session.

use vgraph_core::wire::DecodeError;

use crate::pipeline::Stage;

/// Failure reported by a session collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No computed column template registered under this buffer/key
    #[error("missing computed column template {buffer}/{key}")]
    MissingTemplate { buffer: String, key: String },

    /// A column read by a computed column does not exist
    #[error("missing column {name} in {partition}")]
    MissingColumn { name: String, partition: String },

    /// Column length disagrees with the element count of its partition
    #[error("column {name} has {actual} values, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Other collaborator failures
    #[error("{0}")]
    Rejected(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that abort a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The payload could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Only single node and edge partitions are supported
    #[error("unsupported topology: {nodes} node partition(s), {edges} edge partition(s)")]
    UnsupportedTopology { nodes: usize, edges: usize },

    /// Sidecar metadata disagrees with the decoded graph
    #[error("metadata mismatch: {0}")]
    MetadataMismatch(String),

    /// A session collaborator failed during a stage
    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: SessionError,
    },
}

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

impl LoadError {
    pub(crate) fn stage(stage: Stage) -> impl FnOnce(SessionError) -> LoadError {
        move |source| LoadError::Stage { stage, source }
    }
}
