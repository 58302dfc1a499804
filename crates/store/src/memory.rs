#![forbid(unsafe_code)]

//! In-process persistence used by tests and offline tooling.

use crate::backend::{CanvasPersistence, SimilarIdea, default_edge_types};
use crate::error::PersistError;
use async_trait::async_trait;
use bdc_core::geometry::Viewport;
use bdc_core::ids::{BrainDumpId, EdgeId, IdeaId};
use bdc_core::model::{
    BrainDump, Edge, EdgeDraft, EdgePatch, EdgeType, Idea, IdeaDraft, IdeaPatch, now_ms,
};
use bdc_core::similarity::rank_similar;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Which call an injected failure applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    CreateIdea,
    UpdateIdea,
    DeleteIdea,
    CreateEdge,
    UpdateEdge,
    DeleteEdge,
    AnyWrite,
}

#[derive(Debug, Default)]
struct MemoryInner {
    brain_dumps: BTreeMap<BrainDumpId, BrainDump>,
    ideas: BTreeMap<IdeaId, Idea>,
    edges: BTreeMap<EdgeId, Edge>,
    edge_types: Vec<EdgeType>,
    next_id: u64,
    failures: Vec<FailPoint>,
    journal: Vec<String>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    hold: watch::Sender<bool>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let inner = MemoryInner {
            edge_types: default_edge_types(),
            next_id: 1,
            ..MemoryInner::default()
        };
        let (hold, _) = watch::channel(false);
        Self {
            inner: Mutex::new(inner),
            hold,
        }
    }

    pub fn add_brain_dump(&self, name: &str) -> Result<BrainDump, PersistError> {
        let mut inner = self.inner.lock();
        let n = inner.bump();
        let id = BrainDumpId::try_new(format!("bd-{n}"))
            .map_err(|err| PersistError::Rejected(err.message().to_string()))?;
        let brain_dump = BrainDump {
            id: id.clone(),
            name: name.to_string(),
            viewport: Viewport::default(),
            archived_at_ms: None,
            idea_count: 0,
            edge_count: 0,
        };
        inner.brain_dumps.insert(id, brain_dump.clone());
        Ok(brain_dump)
    }

    pub fn archive_brain_dump(&self, id: &BrainDumpId) -> bool {
        let mut inner = self.inner.lock();
        match inner.brain_dumps.get_mut(id) {
            Some(brain_dump) => {
                brain_dump.archived_at_ms = Some(now_ms());
                true
            }
            None => false,
        }
    }

    pub fn set_edge_types(&self, edge_types: Vec<EdgeType>) {
        self.inner.lock().edge_types = edge_types;
    }

    /// Makes the next matching write fail with `Unavailable`.
    pub fn fail_next(&self, point: FailPoint) {
        self.inner.lock().failures.push(point);
    }

    /// Parks every write until [`release_writes`](Self::release_writes) is called.
    pub fn hold_writes(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_writes(&self) {
        self.hold.send_replace(false);
    }

    /// Calls received so far, e.g. `"create_idea idea-3"`.
    pub fn journal(&self) -> Vec<String> {
        self.inner.lock().journal.clone()
    }

    pub fn stored_ideas(&self) -> Vec<Idea> {
        self.inner.lock().ideas.values().cloned().collect()
    }

    pub fn stored_edges(&self) -> Vec<Edge> {
        self.inner.lock().edges.values().cloned().collect()
    }

    async fn gate(&self) {
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
    }
}

impl MemoryInner {
    fn bump(&mut self) -> u64 {
        let n = self.next_id;
        self.next_id += 1;
        n
    }

    fn check_failure(&mut self, point: FailPoint, call: &str) -> Result<(), PersistError> {
        let hit = self
            .failures
            .iter()
            .position(|fp| *fp == point || *fp == FailPoint::AnyWrite);
        if let Some(index) = hit {
            self.failures.remove(index);
            self.journal.push(format!("{call} (failed)"));
            return Err(PersistError::Unavailable(format!("injected failure on {call}")));
        }
        Ok(())
    }

    fn live_canvas(&self, id: &BrainDumpId) -> Result<&BrainDump, PersistError> {
        self.brain_dumps
            .get(id)
            .filter(|brain_dump| !brain_dump.is_archived())
            .ok_or_else(|| PersistError::NotFound(format!("brain dump {id}")))
    }
}

#[async_trait]
impl CanvasPersistence for MemoryBackend {
    async fn create_idea(&self, draft: IdeaDraft) -> Result<Idea, PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::CreateIdea, "create_idea")?;
        inner.live_canvas(&draft.brain_dump_id)?;
        let id = match draft.id.clone() {
            Some(id) if inner.ideas.contains_key(&id) => {
                return Err(PersistError::Conflict(format!("idea {id} exists")));
            }
            Some(id) => id,
            None => {
                let n = inner.bump();
                IdeaId::try_new(format!("idea-{n}"))
                    .map_err(|err| PersistError::Rejected(err.message().to_string()))?
            }
        };
        let idea = draft.into_idea(id.clone(), now_ms());
        inner.journal.push(format!("create_idea {id}"));
        inner.ideas.insert(id, idea.clone());
        Ok(idea)
    }

    async fn update_idea(&self, id: &IdeaId, patch: &IdeaPatch) -> Result<(), PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::UpdateIdea, "update_idea")?;
        let idea = inner
            .ideas
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound(format!("idea {id}")))?;
        patch.apply_to(idea);
        idea.updated_at_ms = now_ms();
        inner.journal.push(format!("update_idea {id}"));
        Ok(())
    }

    async fn delete_idea(&self, id: &IdeaId) -> Result<(), PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::DeleteIdea, "delete_idea")?;
        if inner.ideas.remove(id).is_none() {
            return Err(PersistError::NotFound(format!("idea {id}")));
        }
        inner.edges.retain(|_, edge| !edge.touches(id));
        inner.journal.push(format!("delete_idea {id}"));
        Ok(())
    }

    async fn create_edge(&self, draft: EdgeDraft) -> Result<Edge, PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::CreateEdge, "create_edge")?;
        inner.live_canvas(&draft.brain_dump_id)?;
        for endpoint in [&draft.parent_id, &draft.child_id] {
            match inner.ideas.get(endpoint) {
                Some(idea) if idea.brain_dump_id == draft.brain_dump_id => {}
                Some(_) => {
                    return Err(PersistError::Rejected(format!(
                        "idea {endpoint} belongs to another brain dump"
                    )));
                }
                None => return Err(PersistError::NotFound(format!("idea {endpoint}"))),
            }
        }
        if inner
            .edges
            .values()
            .any(|edge| edge.parent_id == draft.parent_id && edge.child_id == draft.child_id)
        {
            return Err(PersistError::Conflict(format!(
                "edge {} -> {} exists",
                draft.parent_id, draft.child_id
            )));
        }
        let id = match draft.id.clone() {
            Some(id) if inner.edges.contains_key(&id) => {
                return Err(PersistError::Conflict(format!("edge {id} exists")));
            }
            Some(id) => id,
            None => {
                let n = inner.bump();
                EdgeId::try_new(format!("edge-{n}"))
                    .map_err(|err| PersistError::Rejected(err.message().to_string()))?
            }
        };
        let edge = draft.into_edge(id.clone(), now_ms());
        inner.journal.push(format!("create_edge {id}"));
        inner.edges.insert(id, edge.clone());
        Ok(edge)
    }

    async fn update_edge(&self, id: &EdgeId, patch: &EdgePatch) -> Result<(), PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::UpdateEdge, "update_edge")?;
        let edge = inner
            .edges
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound(format!("edge {id}")))?;
        patch.apply_to(edge);
        edge.updated_at_ms = now_ms();
        inner.journal.push(format!("update_edge {id}"));
        Ok(())
    }

    async fn delete_edge(&self, id: &EdgeId) -> Result<(), PersistError> {
        self.gate().await;
        let mut inner = self.inner.lock();
        inner.check_failure(FailPoint::DeleteEdge, "delete_edge")?;
        if inner.edges.remove(id).is_none() {
            return Err(PersistError::NotFound(format!("edge {id}")));
        }
        inner.journal.push(format!("delete_edge {id}"));
        Ok(())
    }

    async fn fetch_brain_dump(&self, id: &BrainDumpId) -> Result<BrainDump, PersistError> {
        let inner = self.inner.lock();
        let mut brain_dump = inner.live_canvas(id)?.clone();
        brain_dump.idea_count = inner
            .ideas
            .values()
            .filter(|idea| &idea.brain_dump_id == id)
            .count();
        brain_dump.edge_count = inner
            .edges
            .values()
            .filter(|edge| &edge.brain_dump_id == id)
            .count();
        Ok(brain_dump)
    }

    async fn fetch_ideas(&self, canvas: &BrainDumpId) -> Result<Vec<Idea>, PersistError> {
        let inner = self.inner.lock();
        inner.live_canvas(canvas)?;
        Ok(inner
            .ideas
            .values()
            .filter(|idea| &idea.brain_dump_id == canvas)
            .cloned()
            .collect())
    }

    async fn fetch_edges(&self, canvas: &BrainDumpId) -> Result<Vec<Edge>, PersistError> {
        let inner = self.inner.lock();
        inner.live_canvas(canvas)?;
        Ok(inner
            .edges
            .values()
            .filter(|edge| &edge.brain_dump_id == canvas)
            .cloned()
            .collect())
    }

    async fn fetch_edge_types(&self) -> Result<Vec<EdgeType>, PersistError> {
        Ok(self.inner.lock().edge_types.clone())
    }

    async fn find_similar(
        &self,
        canvas: &BrainDumpId,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarIdea>, PersistError> {
        let inner = self.inner.lock();
        inner.live_canvas(canvas)?;
        let candidates = inner
            .ideas
            .values()
            .filter(|idea| &idea.brain_dump_id == canvas)
            .filter_map(|idea| {
                idea.embedding
                    .as_deref()
                    .map(|vector| (idea.id.clone(), vector))
            });
        Ok(rank_similar(embedding, candidates, limit, threshold)
            .into_iter()
            .map(|(idea_id, score)| SimilarIdea { idea_id, score })
            .collect())
    }
}
