#![forbid(unsafe_code)]

//! Multi-select edits. Each helper records one batch, so a single undo reverts the whole
//! selection.

use super::CanvasStore;
use super::ideas::{delete_command, existing_idea, update_command};
use super::pending::{Pending, Step};
use super::state::CanvasState;
use crate::error::StoreError;
use bdc_core::ValidationError;
use bdc_core::command::Command;
use bdc_core::geometry::Point;
use bdc_core::ids::{EdgeId, IdeaId};
use bdc_core::model::{Edge, Idea, IdeaPatch, IdeaState, now_ms};
use std::collections::{HashMap, HashSet};

impl CanvasStore {
    /// Deletes every idea in `ids` (and their edges). Nothing changes unless all ids exist.
    pub fn delete_ideas(&self, ids: &[IdeaId]) -> Result<Pending<()>, StoreError> {
        let mut events = Vec::new();
        let steps = {
            let mut state = self.inner.state.lock();
            let ids = existing_ids(&state, ids)?;
            self.in_batch(&mut state, &mut events, |state| {
                // An edge between two selected ideas is captured by the first delete only.
                let mut captured = HashSet::new();
                ids.iter()
                    .map(|id| -> Result<(Command, bool), ValidationError> {
                        let mut command = delete_command(state, id)?;
                        if let Command::DeleteIdea { edges, .. } = &mut command {
                            edges.retain(|edge| captured.insert(edge.id.clone()));
                        }
                        Ok((command, false))
                    })
                    .collect()
            })?
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), steps))
    }

    /// Moves each idea to its paired position.
    pub fn move_ideas(&self, moves: &[(IdeaId, Point)]) -> Result<Pending<()>, StoreError> {
        let mut events = Vec::new();
        let steps = {
            let mut state = self.inner.state.lock();
            let ids = moves.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
            existing_ids(&state, &ids)?;
            self.in_batch(&mut state, &mut events, |state| {
                moves
                    .iter()
                    .map(|(id, position)| {
                        update_command(state, id, IdeaPatch::position(*position))
                            .map(|command| (command, false))
                    })
                    .collect()
            })?
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), steps))
    }

    /// Copies the selected ideas shifted by `offset`, plus the edges running between them.
    /// Returns the copies' ids in selection order.
    pub fn duplicate_ideas(&self, ids: &[IdeaId], offset: Point) -> Result<Pending<Vec<IdeaId>>, StoreError> {
        let enrich_enabled = self.inner.config.enrich_on_create && self.enricher().is_some();
        let mut events = Vec::new();
        let (copies, steps) = {
            let mut state = self.inner.state.lock();
            let ids = existing_ids(&state, ids)?;

            let now = now_ms();
            let mut mapping: HashMap<IdeaId, IdeaId> = HashMap::new();
            let mut commands = Vec::new();
            for id in &ids {
                let source = existing_idea(&state, id)?;
                let copy = Idea {
                    id: IdeaId::temporary(),
                    position_x: source.position_x + offset.x,
                    position_y: source.position_y + offset.y,
                    created_at_ms: now,
                    updated_at_ms: now,
                    ..source.clone()
                };
                mapping.insert(source.id.clone(), copy.id.clone());
                let enrich = enrich_enabled && copy.state == IdeaState::Generating;
                commands.push((
                    Command::CreateIdea {
                        idea: copy,
                        edges: Vec::new(),
                    },
                    enrich,
                ));
            }

            let mut planned: Vec<Edge> = Vec::new();
            let mut sources = state
                .edges
                .values()
                .filter(|edge| mapping.contains_key(&edge.parent_id) && mapping.contains_key(&edge.child_id))
                .collect::<Vec<_>>();
            sources.sort_by(|a, b| a.id.cmp(&b.id));
            for source in sources {
                let (Some(parent_id), Some(child_id)) =
                    (mapping.get(&source.parent_id), mapping.get(&source.child_id))
                else {
                    continue;
                };
                self.validator(&state).check(
                    state.edges.values().chain(planned.iter()),
                    parent_id,
                    child_id,
                    &source.edge_type,
                )?;
                planned.push(Edge {
                    id: EdgeId::temporary(),
                    parent_id: parent_id.clone(),
                    child_id: child_id.clone(),
                    created_at_ms: now,
                    updated_at_ms: now,
                    ..source.clone()
                });
            }
            commands.extend(
                planned
                    .into_iter()
                    .map(|edge| (Command::CreateEdge { edge }, false)),
            );

            for (command, _) in &commands {
                for id in command.created_idea_ids() {
                    state.idea_ids.track(id.clone());
                }
                for id in command.created_edge_ids() {
                    state.edge_ids.track(id.clone());
                }
            }
            let copies = ids
                .iter()
                .filter_map(|id| mapping.get(id).cloned())
                .collect::<Vec<_>>();
            let steps = self.in_batch(&mut state, &mut events, move |_| Ok(commands))?;
            (copies, steps)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), copies, steps))
    }

    /// Builds commands with `plan` against the current state and commits them as one batch.
    /// Planning happens before anything is applied, so a validation error leaves no trace.
    fn in_batch(
        &self,
        state: &mut CanvasState,
        events: &mut Vec<super::StoreEvent>,
        plan: impl FnOnce(&CanvasState) -> Result<Vec<(Command, bool)>, ValidationError>,
    ) -> Result<Vec<Step>, StoreError> {
        let planned = plan(state)?;
        state.history.start_batch();
        let steps = planned
            .into_iter()
            .map(|(command, enrich)| Self::commit(state, command, true, enrich, events))
            .collect::<Vec<_>>();
        if state.history.end_batch() {
            events.push(state.history_changed());
        }
        Ok(steps)
    }
}

/// Canonical, de-duplicated ids; fails on the first one that does not exist.
fn existing_ids(state: &CanvasState, ids: &[IdeaId]) -> Result<Vec<IdeaId>, StoreError> {
    let mut out: Vec<IdeaId> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = existing_idea(state, id)?.id.clone();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}
