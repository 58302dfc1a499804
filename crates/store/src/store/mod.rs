#![forbid(unsafe_code)]

//! The canvas store: the in-memory graph of the active brain dump, kept in sync with a
//! [`CanvasPersistence`] backend through optimistic two-phase mutations.
//!
//! Every mutator validates and applies its change locally before returning a [`Pending`];
//! awaiting [`Pending::settle`] performs the backend write and either confirms the change
//! (swapping temporary ids for real ones) or rolls it back.

mod batch;
mod edges;
mod enrich;
mod history;
mod ideas;
mod pending;
mod state;

pub use history::HistoryOutcome;
pub use pending::{Pending, Settled};

use crate::backend::{CanvasPersistence, IdeaEnricher, SimilarIdea};
use crate::error::StoreError;
use bdc_core::ValidationError;
use bdc_core::command::Command;
use bdc_core::config::CanvasConfig;
use bdc_core::ids::{BrainDumpId, EdgeId, IdeaId};
use bdc_core::model::{BrainDump, Edge, EdgeType, Idea};
use bdc_core::validate::EdgeValidator;
use parking_lot::{Mutex, RwLock};
use pending::Step;
use rand::SeedableRng;
use rand::rngs::StdRng;
use state::CanvasState;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Change notification for UI consumers.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    CanvasLoaded(BrainDump),
    CanvasCleared,
    IdeaUpserted(Idea),
    IdeaRemoved(IdeaId),
    EdgeUpserted(Edge),
    EdgeRemoved(EdgeId),
    IdeaIdConfirmed { temp: IdeaId, id: IdeaId },
    EdgeIdConfirmed { temp: EdgeId, id: EdgeId },
    HistoryChanged { can_undo: bool, can_redo: bool },
}

struct Inner {
    config: CanvasConfig,
    persistence: Arc<dyn CanvasPersistence>,
    enricher: RwLock<Option<Arc<dyn IdeaEnricher>>>,
    state: Mutex<CanvasState>,
    events: broadcast::Sender<StoreEvent>,
    replaying: AtomicBool,
    /// Backend writes of history replays that had to wait for unconfirmed ids, chained so they
    /// reach the backend in replay order.
    replay_tail: Mutex<Option<JoinHandle<()>>>,
    deferred_replays: watch::Sender<usize>,
}

/// Shared handle to the active canvas. Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct CanvasStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CanvasStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CanvasStore")
            .field("canvas", &state.canvas.as_ref().map(|canvas| &canvas.id))
            .field("ideas", &state.ideas.len())
            .field("edges", &state.edges.len())
            .finish()
    }
}

impl CanvasStore {
    pub fn new(config: CanvasConfig, persistence: Arc<dyn CanvasPersistence>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = CanvasState::new(config.history_limit);
        Self {
            inner: Arc::new(Inner {
                config,
                persistence,
                enricher: RwLock::new(None),
                state: Mutex::new(state),
                events,
                replaying: AtomicBool::new(false),
                replay_tail: Mutex::new(None),
                deferred_replays: watch::channel(0).0,
            }),
        }
    }

    pub fn with_enricher(self, enricher: Arc<dyn IdeaEnricher>) -> Self {
        *self.inner.enricher.write() = Some(enricher);
        self
    }

    /// Makes placement fallbacks reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        self.inner.state.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Fetches a brain dump with its ideas, edges and edge types and makes it the active
    /// canvas. History and unconfirmed ids of the previous canvas are discarded.
    pub async fn load_canvas(&self, id: &BrainDumpId) -> Result<BrainDump, StoreError> {
        let persistence = &self.inner.persistence;
        let canvas = persistence.fetch_brain_dump(id).await?;
        let ideas = persistence.fetch_ideas(id).await?;
        let edges = persistence.fetch_edges(id).await?;
        let edge_types = persistence.fetch_edge_types().await?;
        let (idea_count, edge_count) = (ideas.len(), edges.len());

        let events = {
            let mut state = self.inner.state.lock();
            state.replace(
                Some(canvas.clone()),
                ideas,
                edges,
                edge_types,
                self.inner.config.history_limit,
            );
            vec![StoreEvent::CanvasLoaded(canvas.clone()), state.history_changed()]
        };
        self.emit(events);
        info!(brain_dump_id = %id, ideas = idea_count, edges = edge_count, "canvas loaded");
        Ok(canvas)
    }

    /// Drops the active canvas and everything tied to it.
    pub fn reset(&self) {
        let events = {
            let mut state = self.inner.state.lock();
            state.replace(None, Vec::new(), Vec::new(), Vec::new(), self.inner.config.history_limit);
            vec![StoreEvent::CanvasCleared, state.history_changed()]
        };
        self.emit(events);
    }

    pub fn active_canvas(&self) -> Option<BrainDump> {
        self.inner.state.lock().canvas.clone()
    }

    pub fn idea(&self, id: &IdeaId) -> Option<Idea> {
        let state = self.inner.state.lock();
        state.ideas.get(&state.idea_ids.resolve(id)).cloned()
    }

    pub fn edge(&self, id: &EdgeId) -> Option<Edge> {
        let state = self.inner.state.lock();
        state.edges.get(&state.edge_ids.resolve(id)).cloned()
    }

    /// All ideas, oldest first.
    pub fn ideas(&self) -> Vec<Idea> {
        let mut out = self.inner.state.lock().ideas.values().cloned().collect::<Vec<_>>();
        out.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// All edges, oldest first.
    pub fn edges(&self) -> Vec<Edge> {
        let mut out = self.inner.state.lock().edges.values().cloned().collect::<Vec<_>>();
        sort_edges(&mut out);
        out
    }

    /// Edges where `id` is either endpoint.
    pub fn edges_for_idea(&self, id: &IdeaId) -> Vec<Edge> {
        let mut out = {
            let state = self.inner.state.lock();
            let id = state.idea_ids.resolve(id);
            state
                .edges
                .values()
                .filter(|edge| edge.touches(&id))
                .cloned()
                .collect::<Vec<_>>()
        };
        sort_edges(&mut out);
        out
    }

    pub fn edges_by_type(&self, edge_type: &str) -> Vec<Edge> {
        let mut out = self
            .inner
            .state
            .lock()
            .edges
            .values()
            .filter(|edge| edge.edge_type == edge_type)
            .cloned()
            .collect::<Vec<_>>();
        sort_edges(&mut out);
        out
    }

    pub fn edge_types(&self) -> Vec<EdgeType> {
        self.inner
            .state
            .lock()
            .edge_types
            .types()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Real id for `id` once its create has been confirmed; `id` itself otherwise.
    pub fn resolve_idea_id(&self, id: &IdeaId) -> IdeaId {
        self.inner.state.lock().idea_ids.resolve(id)
    }

    pub fn resolve_edge_id(&self, id: &EdgeId) -> EdgeId {
        self.inner.state.lock().edge_ids.resolve(id)
    }

    /// Ideas whose embeddings are closest to `id`'s, best first.
    pub async fn similar_ideas(
        &self,
        id: &IdeaId,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarIdea>, StoreError> {
        let (canvas, id, embedding) = {
            let state = self.inner.state.lock();
            let canvas = state.canvas.as_ref().ok_or(StoreError::NoActiveCanvas)?.id.clone();
            let id = state.idea_ids.resolve(id);
            let embedding = state
                .ideas
                .get(&id)
                .ok_or_else(|| ValidationError::UnknownIdea(id.to_string()))?
                .embedding
                .clone();
            (canvas, id, embedding)
        };
        let Some(embedding) = embedding else {
            return Ok(Vec::new());
        };
        let mut found = self
            .inner
            .persistence
            .find_similar(&canvas, &embedding, limit.saturating_add(1), threshold)
            .await?;
        found.retain(|similar| similar.idea_id != id);
        found.truncate(limit);
        Ok(found)
    }

    pub(crate) fn emit(&self, events: Vec<StoreEvent>) {
        for event in events {
            // No receivers is fine.
            let _ = self.inner.events.send(event);
        }
    }

    pub(crate) fn persistence(&self) -> &Arc<dyn CanvasPersistence> {
        &self.inner.persistence
    }

    pub(crate) fn enricher(&self) -> Option<Arc<dyn IdeaEnricher>> {
        self.inner.enricher.read().clone()
    }

    fn validator<'a>(&self, state: &'a CanvasState) -> EdgeValidator<'a> {
        EdgeValidator::new(self.inner.config.cycle_policy, &state.edge_types)
    }

    /// Applies `command` locally and, when `record` is set, pushes it onto the undo stack.
    /// Returns the step that will persist it.
    fn commit(
        state: &mut CanvasState,
        command: Command,
        record: bool,
        enrich: bool,
        events: &mut Vec<StoreEvent>,
    ) -> Step {
        state.apply(&command, events);
        let seq = record.then(|| state.history.record(command.clone()));
        if record {
            events.push(state.history_changed());
        }
        debug!(kind = command.kind(), seq = ?seq, "applied locally");
        Step {
            command,
            seq,
            generation: state.generation,
            enrich,
        }
    }
}

fn sort_edges(edges: &mut [Edge]) {
    edges.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}
