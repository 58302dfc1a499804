#![forbid(unsafe_code)]

use super::StoreEvent;
use bdc_core::command::Command;
use bdc_core::geometry::{Point, Rect, Size};
use bdc_core::history::History;
use bdc_core::ids::{EdgeId, IdeaId};
use bdc_core::model::{BrainDump, Edge, EdgeType, Idea};
use bdc_core::placement::{Anchor, PlacementConfig, PlacementRequest, place};
use bdc_core::validate::EdgeTypeRegistry;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tokio::sync::watch;
use tracing::debug;

/// Ids that may be minted locally before the backend assigns the real one.
pub(crate) trait LocalId: Clone + Eq + Hash + std::fmt::Display {
    fn is_temporary(&self) -> bool;
}

impl LocalId for IdeaId {
    fn is_temporary(&self) -> bool {
        IdeaId::is_temporary(self)
    }
}

impl LocalId for EdgeId {
    fn is_temporary(&self) -> bool {
        EdgeId::is_temporary(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Resolution<K> {
    Confirmed(K),
    Failed,
}

pub(crate) enum Lookup<K> {
    Resolved(K),
    Waiting(watch::Receiver<Option<Resolution<K>>>),
    Failed,
}

/// Bookkeeping for temporary ids: who is still waiting for the backend, and what each one
/// turned into.
#[derive(Debug)]
pub(crate) struct TempIds<K> {
    pending: HashMap<K, watch::Sender<Option<Resolution<K>>>>,
    confirmed: HashMap<K, K>,
    failed: HashSet<K>,
}

impl<K> Default for TempIds<K> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            confirmed: HashMap::new(),
            failed: HashSet::new(),
        }
    }
}

impl<K: LocalId> TempIds<K> {
    pub(crate) fn track(&mut self, temp: K) {
        let (tx, _) = watch::channel(None);
        self.pending.insert(temp, tx);
    }

    pub(crate) fn resolve(&self, id: &K) -> K {
        self.confirmed.get(id).unwrap_or(id).clone()
    }

    pub(crate) fn lookup(&self, id: &K) -> Lookup<K> {
        if let Some(real) = self.confirmed.get(id) {
            return Lookup::Resolved(real.clone());
        }
        if let Some(tx) = self.pending.get(id) {
            return Lookup::Waiting(tx.subscribe());
        }
        if !id.is_temporary() {
            return Lookup::Resolved(id.clone());
        }
        Lookup::Failed
    }

    pub(crate) fn is_pending(&self, id: &K) -> bool {
        self.pending.contains_key(id)
    }

    pub(crate) fn confirm(&mut self, temp: &K, real: K) {
        if let Some(tx) = self.pending.remove(temp) {
            tx.send_replace(Some(Resolution::Confirmed(real.clone())));
        }
        self.failed.remove(temp);
        self.confirmed.insert(temp.clone(), real);
    }

    pub(crate) fn fail(&mut self, temp: &K) {
        if let Some(tx) = self.pending.remove(temp) {
            tx.send_replace(Some(Resolution::Failed));
            self.failed.insert(temp.clone());
        }
    }

    /// Wakes every waiter with `Failed`; used when the canvas goes away underneath them.
    pub(crate) fn fail_all(&mut self) {
        for (_, tx) in self.pending.drain() {
            tx.send_replace(Some(Resolution::Failed));
        }
        self.confirmed.clear();
        self.failed.clear();
    }
}

pub(crate) struct CanvasState {
    pub(crate) canvas: Option<BrainDump>,
    pub(crate) generation: u64,
    pub(crate) ideas: HashMap<IdeaId, Idea>,
    pub(crate) edges: HashMap<EdgeId, Edge>,
    pub(crate) edge_types: EdgeTypeRegistry,
    pub(crate) history: History,
    pub(crate) last_placed: Option<IdeaId>,
    pub(crate) idea_ids: TempIds<IdeaId>,
    pub(crate) edge_ids: TempIds<EdgeId>,
    pub(crate) rng: StdRng,
}

impl CanvasState {
    pub(crate) fn new(history_limit: usize) -> Self {
        Self {
            canvas: None,
            generation: 0,
            ideas: HashMap::new(),
            edges: HashMap::new(),
            edge_types: EdgeTypeRegistry::default(),
            history: History::new(history_limit),
            last_placed: None,
            idea_ids: TempIds::default(),
            edge_ids: TempIds::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Swaps in a freshly fetched canvas (or none) and invalidates everything tied to the
    /// previous one.
    pub(crate) fn replace(
        &mut self,
        canvas: Option<BrainDump>,
        ideas: Vec<Idea>,
        edges: Vec<Edge>,
        edge_types: Vec<EdgeType>,
        history_limit: usize,
    ) {
        self.generation += 1;
        self.canvas = canvas;
        self.ideas = ideas.into_iter().map(|idea| (idea.id.clone(), idea)).collect();
        self.edges = edges.into_iter().map(|edge| (edge.id.clone(), edge)).collect();
        self.edge_types = EdgeTypeRegistry::new(edge_types);
        self.history = History::new(history_limit);
        self.last_placed = None;
        self.idea_ids.fail_all();
        self.edge_ids.fail_all();
    }

    /// Whether writing `command` has to wait for a create that is still in flight.
    pub(crate) fn awaits_confirmation(&self, command: &Command) -> bool {
        command
            .mentioned_idea_ids()
            .into_iter()
            .any(|id| self.idea_ids.is_pending(id))
            || command
                .mentioned_edge_ids()
                .into_iter()
                .any(|id| self.edge_ids.is_pending(id))
    }

    pub(crate) fn history_changed(&self) -> StoreEvent {
        StoreEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }

    /// Applies `command` to the maps without touching history. Parts that no longer fit
    /// (missing endpoints, already removed entities) are skipped.
    pub(crate) fn apply(&mut self, command: &Command, events: &mut Vec<StoreEvent>) {
        match command {
            Command::CreateIdea { idea, edges } => {
                self.ideas.insert(idea.id.clone(), idea.clone());
                events.push(StoreEvent::IdeaUpserted(idea.clone()));
                for edge in edges {
                    self.insert_edge(edge, events);
                }
            }
            Command::DeleteIdea { idea, .. } => {
                let attached = self
                    .edges
                    .values()
                    .filter(|edge| edge.touches(&idea.id))
                    .map(|edge| edge.id.clone())
                    .collect::<Vec<_>>();
                for id in attached {
                    self.edges.remove(&id);
                    events.push(StoreEvent::EdgeRemoved(id));
                }
                if self.ideas.remove(&idea.id).is_some() {
                    events.push(StoreEvent::IdeaRemoved(idea.id.clone()));
                }
                if self.last_placed.as_ref() == Some(&idea.id) {
                    self.last_placed = None;
                }
            }
            Command::UpdateIdea { id, after, .. } => {
                if let Some(idea) = self.ideas.get_mut(id) {
                    after.apply_to(idea);
                    events.push(StoreEvent::IdeaUpserted(idea.clone()));
                }
            }
            Command::CreateEdge { edge } => self.insert_edge(edge, events),
            Command::DeleteEdge { edge } => {
                if self.edges.remove(&edge.id).is_some() {
                    events.push(StoreEvent::EdgeRemoved(edge.id.clone()));
                }
            }
            Command::UpdateEdge { id, after, .. } => {
                if let Some(edge) = self.edges.get_mut(id) {
                    after.apply_to(edge);
                    events.push(StoreEvent::EdgeUpserted(edge.clone()));
                }
            }
        }
    }

    fn insert_edge(&mut self, edge: &Edge, events: &mut Vec<StoreEvent>) {
        if !self.ideas.contains_key(&edge.parent_id) || !self.ideas.contains_key(&edge.child_id) {
            debug!(edge_id = %edge.id, "skipping edge with a missing endpoint");
            return;
        }
        self.edges.insert(edge.id.clone(), edge.clone());
        events.push(StoreEvent::EdgeUpserted(edge.clone()));
    }

    /// Rewrites every confirmed temporary id in `command` to its real id.
    pub(crate) fn canonicalize(&self, command: &mut Command) {
        let ideas = command
            .mentioned_idea_ids()
            .into_iter()
            .filter(|id| id.is_temporary())
            .cloned()
            .collect::<Vec<_>>();
        for temp in ideas {
            let real = self.idea_ids.resolve(&temp);
            if real != temp {
                command.rewrite_idea_id(&temp, &real);
            }
        }
        let edges = command
            .mentioned_edge_ids()
            .into_iter()
            .filter(|id| id.is_temporary())
            .cloned()
            .collect::<Vec<_>>();
        for temp in edges {
            let real = self.edge_ids.resolve(&temp);
            if real != temp {
                command.rewrite_edge_id(&temp, &real);
            }
        }
    }

    pub(crate) fn confirm_idea(&mut self, temp: &IdeaId, real: &IdeaId, events: &mut Vec<StoreEvent>) {
        self.idea_ids.confirm(temp, real.clone());
        self.history.rewrite_idea_id(temp, real);
        if self.last_placed.as_ref() == Some(temp) {
            self.last_placed = Some(real.clone());
        }
        events.push(StoreEvent::IdeaIdConfirmed {
            temp: temp.clone(),
            id: real.clone(),
        });
        if let Some(mut idea) = self.ideas.remove(temp) {
            idea.id = real.clone();
            self.ideas.insert(real.clone(), idea.clone());
            events.push(StoreEvent::IdeaUpserted(idea));
        }
        for edge in self.edges.values_mut() {
            if !edge.touches(temp) {
                continue;
            }
            if &edge.parent_id == temp {
                edge.parent_id = real.clone();
            }
            if &edge.child_id == temp {
                edge.child_id = real.clone();
            }
            events.push(StoreEvent::EdgeUpserted(edge.clone()));
        }
    }

    pub(crate) fn confirm_edge(&mut self, temp: &EdgeId, real: &EdgeId, events: &mut Vec<StoreEvent>) {
        self.edge_ids.confirm(temp, real.clone());
        self.history.rewrite_edge_id(temp, real);
        events.push(StoreEvent::EdgeIdConfirmed {
            temp: temp.clone(),
            id: real.clone(),
        });
        if let Some(mut edge) = self.edges.remove(temp) {
            edge.id = real.clone();
            self.edges.insert(real.clone(), edge.clone());
            events.push(StoreEvent::EdgeUpserted(edge));
        }
    }

    /// Picks a spot for a new idea of `size` on the current canvas.
    pub(crate) fn place(&mut self, config: &PlacementConfig, anchor: Anchor, size: Size) -> Point {
        let viewport_anchor = || {
            let center = self
                .canvas
                .as_ref()
                .map(|canvas| canvas.viewport.canvas_center())
                .unwrap_or(Point::new(0.0, 0.0));
            center.offset(-size.width / 2.0, -size.height / 2.0)
        };
        let last = self
            .last_placed
            .as_ref()
            .and_then(|id| self.ideas.get(id))
            .map(Idea::bounds);

        let (anchor, hint) = match anchor {
            Anchor::At(point) => (point, None),
            Anchor::ViewportCenter => (viewport_anchor(), None),
            Anchor::NearLastPlaced => match last {
                Some(bounds) => (bounds.origin, Some(bounds)),
                None => (viewport_anchor(), None),
            },
        };

        let existing = self.ideas.values().map(Idea::bounds).collect::<Vec<Rect>>();
        let request = PlacementRequest {
            anchor,
            size,
            hint,
            existing: &existing,
        };
        let outcome = place(config, &request, &mut self.rng);
        if !outcome.is_clear() {
            debug!(x = anchor.x, y = anchor.y, "no clear spot found; placing near anchor");
        }
        outcome.point()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_resolve_after_confirmation() {
        let mut ids = TempIds::<IdeaId>::default();
        let temp = IdeaId::temporary();
        ids.track(temp.clone());

        let Lookup::Waiting(rx) = ids.lookup(&temp) else {
            panic!("expected a waiter");
        };
        let real = IdeaId::try_new("idea-7").unwrap();
        ids.confirm(&temp, real.clone());

        assert_eq!(*rx.borrow(), Some(Resolution::Confirmed(real.clone())));
        assert_eq!(ids.resolve(&temp), real);
        assert!(matches!(ids.lookup(&temp), Lookup::Resolved(id) if id == real));
    }

    #[test]
    fn failed_and_unknown_temp_ids_do_not_resolve() {
        let mut ids = TempIds::<EdgeId>::default();
        let temp = EdgeId::temporary();
        ids.track(temp.clone());
        ids.fail(&temp);
        assert!(matches!(ids.lookup(&temp), Lookup::Failed));
        assert!(matches!(ids.lookup(&EdgeId::temporary()), Lookup::Failed));

        let real = EdgeId::try_new("edge-1").unwrap();
        assert!(matches!(ids.lookup(&real), Lookup::Resolved(id) if id == real));
    }

    #[test]
    fn fail_all_wakes_waiters() {
        let mut ids = TempIds::<IdeaId>::default();
        let temp = IdeaId::temporary();
        ids.track(temp.clone());
        let Lookup::Waiting(rx) = ids.lookup(&temp) else {
            panic!("expected a waiter");
        };
        ids.fail_all();
        assert_eq!(*rx.borrow(), Some(Resolution::Failed));
    }
}
