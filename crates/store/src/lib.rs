#![forbid(unsafe_code)]

mod backend;
mod error;
mod memory;
mod sqlite;
mod store;

pub use backend::{CanvasPersistence, IdeaEnricher, SimilarIdea, default_edge_types};
pub use error::{PersistError, StoreError};
pub use memory::{FailPoint, MemoryBackend};
pub use sqlite::SqliteBackend;
pub use store::{CanvasStore, HistoryOutcome, Pending, Settled, StoreEvent};
