#![forbid(unsafe_code)]

use bdc_core::ValidationError;

/// Failure reported by a persistence or enrichment collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),

    /// A write referenced an entity whose create never reached the backend.
    #[error("{id} was never confirmed by the backend")]
    DependencyFailed { id: String },

    #[error("no canvas is loaded")]
    NoActiveCanvas,

    #[error("{failed} of {total} history steps failed to persist")]
    Replay {
        failed: usize,
        total: usize,
        #[source]
        first: Box<StoreError>,
    },
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
