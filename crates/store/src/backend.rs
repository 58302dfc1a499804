#![forbid(unsafe_code)]

use crate::error::PersistError;
use async_trait::async_trait;
use bdc_core::ids::{BrainDumpId, EdgeId, EdgeTypeId, IdeaId};
use bdc_core::model::{BrainDump, Edge, EdgeDraft, EdgePatch, EdgeType, Idea, IdeaDraft, IdeaPatch};

/// The remote system of record for a canvas.
///
/// Creates return the stored entity; when a draft carries an `id` the backend must keep it
/// (this is how undo restores a deleted entity under its old identifier). Deleting an idea
/// cascades to its edges.
#[async_trait]
pub trait CanvasPersistence: Send + Sync {
    async fn create_idea(&self, draft: IdeaDraft) -> Result<Idea, PersistError>;
    async fn update_idea(&self, id: &IdeaId, patch: &IdeaPatch) -> Result<(), PersistError>;
    async fn delete_idea(&self, id: &IdeaId) -> Result<(), PersistError>;

    async fn create_edge(&self, draft: EdgeDraft) -> Result<Edge, PersistError>;
    async fn update_edge(&self, id: &EdgeId, patch: &EdgePatch) -> Result<(), PersistError>;
    async fn delete_edge(&self, id: &EdgeId) -> Result<(), PersistError>;

    /// Archived canvases are reported as `NotFound`.
    async fn fetch_brain_dump(&self, id: &BrainDumpId) -> Result<BrainDump, PersistError>;
    async fn fetch_ideas(&self, canvas: &BrainDumpId) -> Result<Vec<Idea>, PersistError>;
    async fn fetch_edges(&self, canvas: &BrainDumpId) -> Result<Vec<Edge>, PersistError>;
    async fn fetch_edge_types(&self) -> Result<Vec<EdgeType>, PersistError>;

    async fn find_similar(
        &self,
        canvas: &BrainDumpId,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarIdea>, PersistError>;
}

/// AI collaborator producing a short summary and an embedding for an idea's text.
#[async_trait]
pub trait IdeaEnricher: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, PersistError>;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PersistError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimilarIdea {
    pub idea_id: IdeaId,
    pub score: f32,
}

/// Relationship kinds every fresh backend starts with.
pub fn default_edge_types() -> Vec<EdgeType> {
    let edge_type = |id: &str, name: &str, is_default, prevents_cycles, allows_bidirectional| {
        EdgeTypeId::try_new(id).map(|id| EdgeType {
            id,
            name: name.to_string(),
            is_default,
            prevents_cycles,
            allows_bidirectional,
        })
    };
    [
        edge_type("et-related", "related_to", true, None, None),
        edge_type("et-depends", "depends_on", false, Some(true), Some(false)),
        edge_type("et-similar", "similar_to", false, Some(false), Some(true)),
        edge_type("et-leads", "leads_to", false, Some(true), Some(false)),
    ]
    .into_iter()
    .filter_map(Result::ok)
    .collect()
}
