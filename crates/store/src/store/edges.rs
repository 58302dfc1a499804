#![forbid(unsafe_code)]

use super::CanvasStore;
use super::ideas::existing_idea;
use super::pending::Pending;
use crate::error::StoreError;
use bdc_core::ValidationError;
use bdc_core::command::Command;
use bdc_core::ids::EdgeId;
use bdc_core::model::{Edge, EdgePatch, NewEdge, now_ms};

impl CanvasStore {
    /// Connects two ideas after checking self-loops, duplicates and cycles.
    pub fn add_edge(&self, new: NewEdge) -> Result<Pending<EdgeId>, StoreError> {
        let mut events = Vec::new();
        let (id, step) = {
            let mut state = self.inner.state.lock();
            let brain_dump_id = state
                .canvas
                .as_ref()
                .ok_or(StoreError::NoActiveCanvas)?
                .id
                .clone();
            let parent_id = existing_idea(&state, &new.parent_id)?.id.clone();
            let child_id = existing_idea(&state, &new.child_id)?.id.clone();
            self.validator(&state)
                .check(state.edges.values(), &parent_id, &child_id, &new.edge_type)?;

            let id = EdgeId::temporary();
            let now = now_ms();
            let edge = Edge {
                id: id.clone(),
                brain_dump_id,
                parent_id,
                child_id,
                edge_type: new.edge_type,
                note: new.note,
                created_at_ms: now,
                updated_at_ms: now,
            };
            state.edge_ids.track(id.clone());
            let step = Self::commit(&mut state, Command::CreateEdge { edge }, true, false, &mut events);
            (id, step)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), id, vec![step]))
    }

    /// Changes an edge's type or note. A new type is validated as if the edge were being
    /// inserted fresh.
    pub fn update_edge(&self, id: &EdgeId, patch: EdgePatch) -> Result<Pending<()>, StoreError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        let mut events = Vec::new();
        let step = {
            let mut state = self.inner.state.lock();
            let edge = existing_edge(&state, id)?.clone();
            if let Some(edge_type) = &patch.edge_type
                && edge_type != &edge.edge_type
            {
                self.validator(&state).check_ignoring(
                    state.edges.values(),
                    &edge.parent_id,
                    &edge.child_id,
                    edge_type,
                    Some(&edge.id),
                )?;
            }
            let command = Command::UpdateEdge {
                id: edge.id.clone(),
                before: patch.capture(&edge),
                after: patch,
            };
            Self::commit(&mut state, command, true, false, &mut events)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), vec![step]))
    }

    pub fn delete_edge(&self, id: &EdgeId) -> Result<Pending<()>, StoreError> {
        let mut events = Vec::new();
        let step = {
            let mut state = self.inner.state.lock();
            let edge = existing_edge(&state, id)?.clone();
            Self::commit(&mut state, Command::DeleteEdge { edge }, true, false, &mut events)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), vec![step]))
    }
}

fn existing_edge<'a>(
    state: &'a super::state::CanvasState,
    id: &EdgeId,
) -> Result<&'a Edge, ValidationError> {
    let id = state.edge_ids.resolve(id);
    state
        .edges
        .get(&id)
        .ok_or_else(|| ValidationError::UnknownEdge(id.to_string()))
}
