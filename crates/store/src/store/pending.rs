#![forbid(unsafe_code)]

use super::CanvasStore;
use super::state::{LocalId, Lookup, Resolution, TempIds};
use crate::error::StoreError;
use bdc_core::command::Command;
use bdc_core::ids::{EdgeId, IdeaId};
use bdc_core::model::{EdgeDraft, IdeaDraft};
use tracing::{debug, warn};

/// One locally applied command waiting to be written to the backend.
#[derive(Debug)]
pub(crate) struct Step {
    pub(crate) command: Command,
    /// History sequence number; `None` for changes that are not user actions.
    pub(crate) seq: Option<u64>,
    pub(crate) generation: u64,
    pub(crate) enrich: bool,
}

/// Ids handed out by a mutator, mapped to their confirmed form once the write settles.
pub trait Settled: Send + 'static {
    fn resolve(self, store: &CanvasStore) -> Self;
}

impl Settled for () {
    fn resolve(self, _store: &CanvasStore) -> Self {}
}

impl Settled for IdeaId {
    fn resolve(self, store: &CanvasStore) -> Self {
        store.resolve_idea_id(&self)
    }
}

impl Settled for EdgeId {
    fn resolve(self, store: &CanvasStore) -> Self {
        store.resolve_edge_id(&self)
    }
}

impl<T: Settled> Settled for Vec<T> {
    fn resolve(self, store: &CanvasStore) -> Self {
        self.into_iter().map(|item| item.resolve(store)).collect()
    }
}

/// A change that is already visible locally but not yet written to the backend.
#[must_use = "the change is only local until it is settled or detached"]
#[derive(Debug)]
pub struct Pending<T> {
    store: CanvasStore,
    id: T,
    steps: Vec<Step>,
}

impl<T: Settled> Pending<T> {
    pub(crate) fn new(store: CanvasStore, id: T, steps: Vec<Step>) -> Self {
        Self { store, id, steps }
    }

    /// The local id, usable right away (temporary for creates).
    pub fn id(&self) -> &T {
        &self.id
    }

    /// Writes every step to the backend in order. Failed steps are rolled back locally and
    /// dropped from history; the first failure is returned after all steps were attempted.
    pub async fn settle(self) -> Result<T, StoreError> {
        let Self { store, id, steps } = self;
        let mut first = None;
        for step in steps {
            if let Err(err) = store.settle_step(step).await {
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(id.resolve(&store)),
        }
    }

    /// Settles in the background.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn detach(self) -> tokio::task::JoinHandle<Result<T, StoreError>> {
        tokio::spawn(self.settle())
    }
}

impl CanvasStore {
    async fn settle_step(&self, step: Step) -> Result<(), StoreError> {
        let Step {
            command,
            seq,
            generation,
            enrich,
        } = step;
        let (command, result) = self.persist(command, generation, false).await;
        match result {
            Ok(()) => {
                if enrich && let Command::CreateIdea { idea, .. } = &command {
                    self.spawn_enrichment(idea.id.clone());
                }
                Ok(())
            }
            Err(err) => {
                self.roll_back(&command, seq, generation, &err);
                Err(err)
            }
        }
    }

    /// Writes `command` to the backend. Temporary ids it depends on are awaited and swapped
    /// for real ones first; the returned command carries every id known afterwards.
    ///
    /// With `replay` set, ids the command itself creates are also resolved when possible, so
    /// redoing a create that already reached the backend reuses its real id.
    pub(crate) async fn persist(
        &self,
        mut command: Command,
        generation: u64,
        replay: bool,
    ) -> (Command, Result<(), StoreError>) {
        if let Err(err) = self.resolve_dependencies(&mut command, replay).await {
            return (command, Err(err));
        }
        let result = self.write(&mut command, generation).await;
        (command, result)
    }

    async fn resolve_dependencies(&self, command: &mut Command, replay: bool) -> Result<(), StoreError> {
        let created = command
            .created_idea_ids()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        for temp in temporary(command.mentioned_idea_ids()) {
            let own = created.contains(&temp);
            if own && !replay {
                continue;
            }
            match wait_for(|| self.inner.state.lock().idea_ids.lookup(&temp)).await {
                Some(real) => command.rewrite_idea_id(&temp, &real),
                None if own => {}
                None => return Err(StoreError::DependencyFailed { id: temp.to_string() }),
            }
        }

        let created = command
            .created_edge_ids()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        for temp in temporary(command.mentioned_edge_ids()) {
            let own = created.contains(&temp);
            if own && !replay {
                continue;
            }
            match wait_for(|| self.inner.state.lock().edge_ids.lookup(&temp)).await {
                Some(real) => command.rewrite_edge_id(&temp, &real),
                None if own => {}
                None => return Err(StoreError::DependencyFailed { id: temp.to_string() }),
            }
        }
        Ok(())
    }

    async fn write(&self, command: &mut Command, generation: u64) -> Result<(), StoreError> {
        let persistence = self.persistence();
        match command {
            Command::CreateIdea { idea, edges } => {
                let stored = persistence.create_idea(IdeaDraft::from_idea(idea)).await?;
                if stored.id != idea.id {
                    let temp = std::mem::replace(&mut idea.id, stored.id.clone());
                    self.confirm_idea(&temp, &stored.id, generation);
                    for edge in edges.iter_mut() {
                        if edge.parent_id == temp {
                            edge.parent_id = stored.id.clone();
                        }
                        if edge.child_id == temp {
                            edge.child_id = stored.id.clone();
                        }
                    }
                }
                for edge in edges.iter_mut() {
                    let stored = persistence.create_edge(EdgeDraft::from_edge(edge)).await?;
                    if stored.id != edge.id {
                        let temp = std::mem::replace(&mut edge.id, stored.id.clone());
                        self.confirm_edge(&temp, &stored.id, generation);
                    }
                }
            }
            Command::DeleteIdea { idea, .. } => persistence.delete_idea(&idea.id).await?,
            Command::UpdateIdea { id, after, .. } => persistence.update_idea(id, after).await?,
            Command::CreateEdge { edge } => {
                let stored = persistence.create_edge(EdgeDraft::from_edge(edge)).await?;
                if stored.id != edge.id {
                    let temp = std::mem::replace(&mut edge.id, stored.id.clone());
                    self.confirm_edge(&temp, &stored.id, generation);
                }
            }
            Command::DeleteEdge { edge } => persistence.delete_edge(&edge.id).await?,
            Command::UpdateEdge { id, after, .. } => persistence.update_edge(id, after).await?,
        }
        Ok(())
    }

    fn confirm_idea(&self, temp: &IdeaId, real: &IdeaId, generation: u64) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.confirm_idea(temp, real, &mut events);
        }
        self.emit(events);
        debug!(temp_id = %temp, idea_id = %real, "idea confirmed");
    }

    fn confirm_edge(&self, temp: &EdgeId, real: &EdgeId, generation: u64) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.confirm_edge(temp, real, &mut events);
        }
        self.emit(events);
        debug!(temp_id = %temp, edge_id = %real, "edge confirmed");
    }

    /// Reverts a failed step: applies its inverse locally, drops it from history and fails
    /// any temporary ids it was meant to create.
    fn roll_back(&self, command: &Command, seq: Option<u64>, generation: u64, error: &StoreError) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            let mut canonical = command.clone();
            state.canonicalize(&mut canonical);

            // An update or delete whose target never reached the backend has nothing to
            // restore: the target's own rollback already removed it.
            let creates = !canonical.created_idea_ids().is_empty()
                || !canonical.created_edge_ids().is_empty();
            if creates || !matches!(error, StoreError::DependencyFailed { .. }) {
                state.apply(&canonical.inverse(), &mut events);
            }
            if seq.is_none()
                && let Command::UpdateIdea { id, before, .. } = &canonical
            {
                state.history.patch_idea_snapshots(id, before);
            }
            if let Some(seq) = seq
                && state.history.forget(seq)
            {
                events.push(state.history_changed());
            }
            fail_created(&mut state.idea_ids, command.created_idea_ids());
            fail_created(&mut state.edge_ids, command.created_edge_ids());
        }
        self.emit(events);
        warn!(kind = command.kind(), seq = ?seq, error = %error, "rolled back local change");
    }
}

fn temporary<K: LocalId>(ids: Vec<&K>) -> Vec<K> {
    let mut out: Vec<K> = Vec::new();
    for id in ids {
        if id.is_temporary() && !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

fn fail_created<K: LocalId>(ids: &mut TempIds<K>, created: Vec<&K>) {
    for id in created {
        if id.is_temporary() {
            ids.fail(id);
        }
    }
}

/// Resolves a temporary id, waiting for its create to settle if needed. `None` means the
/// create failed or belongs to a canvas that is gone.
async fn wait_for<K: LocalId>(lookup: impl FnOnce() -> Lookup<K>) -> Option<K> {
    let mut rx = match lookup() {
        Lookup::Resolved(real) => return Some(real),
        Lookup::Failed => return None,
        Lookup::Waiting(rx) => rx,
    };
    let resolution = match rx.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    };
    match resolution {
        Some(Resolution::Confirmed(real)) => Some(real),
        Some(Resolution::Failed) | None => None,
    }
}
