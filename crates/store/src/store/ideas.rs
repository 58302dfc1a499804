#![forbid(unsafe_code)]

use super::pending::Pending;
use super::state::CanvasState;
use super::CanvasStore;
use crate::error::StoreError;
use bdc_core::ValidationError;
use bdc_core::command::Command;
use bdc_core::geometry::{Point, Size};
use bdc_core::ids::IdeaId;
use bdc_core::model::{
    DEFAULT_IDEA_SIZE, Edge, Idea, IdeaPatch, IdeaState, NewIdea, now_ms, validate_dimensions,
};

impl CanvasStore {
    /// Places and inserts a new idea under a temporary id.
    pub fn add_idea(&self, new: NewIdea) -> Result<Pending<IdeaId>, StoreError> {
        let size = new.size.unwrap_or(DEFAULT_IDEA_SIZE);
        validate_dimensions(size)?;
        let enrich = self.inner.config.enrich_on_create && self.enricher().is_some();

        let mut events = Vec::new();
        let (id, step) = {
            let mut state = self.inner.state.lock();
            let brain_dump_id = state
                .canvas
                .as_ref()
                .ok_or(StoreError::NoActiveCanvas)?
                .id
                .clone();
            let position = state.place(&self.inner.config.placement, new.anchor, size);
            let id = IdeaId::temporary();
            let now = now_ms();
            let idea = Idea {
                id: id.clone(),
                brain_dump_id,
                text: new.text,
                summary: None,
                position_x: position.x,
                position_y: position.y,
                width: size.width,
                height: size.height,
                state: if enrich {
                    IdeaState::Generating
                } else {
                    IdeaState::Ready
                },
                session_id: new.session_id,
                embedding: None,
                metadata: new.metadata,
                created_at_ms: now,
                updated_at_ms: now,
            };
            state.idea_ids.track(id.clone());
            let command = Command::CreateIdea {
                idea,
                edges: Vec::new(),
            };
            let step = Self::commit(&mut state, command, true, enrich, &mut events);
            state.last_placed = Some(id.clone());
            (id, step)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), id, vec![step]))
    }

    /// Applies a sparse patch to an idea.
    pub fn update_idea(&self, id: &IdeaId, patch: IdeaPatch) -> Result<Pending<()>, StoreError> {
        self.patch_idea(id, patch, true)
    }

    pub fn update_idea_text(
        &self,
        id: &IdeaId,
        text: impl Into<String>,
    ) -> Result<Pending<()>, StoreError> {
        self.update_idea(id, IdeaPatch::text(text))
    }

    pub fn update_idea_position(&self, id: &IdeaId, position: Point) -> Result<Pending<()>, StoreError> {
        self.update_idea(id, IdeaPatch::position(position))
    }

    pub fn update_idea_dimensions(&self, id: &IdeaId, size: Size) -> Result<Pending<()>, StoreError> {
        self.update_idea(id, IdeaPatch::size(size))
    }

    /// Same as [`update_idea`](Self::update_idea) without an undo entry.
    pub(crate) fn update_idea_unrecorded(
        &self,
        id: &IdeaId,
        patch: IdeaPatch,
    ) -> Result<Pending<()>, StoreError> {
        self.patch_idea(id, patch, false)
    }

    fn patch_idea(&self, id: &IdeaId, patch: IdeaPatch, record: bool) -> Result<Pending<()>, StoreError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        if record && patch.state.is_some() {
            return Err(ValidationError::StateNotEditable.into());
        }
        let mut events = Vec::new();
        let step = {
            let mut state = self.inner.state.lock();
            let command = update_command(&state, id, patch)?;
            if !record && let Command::UpdateIdea { id, after, .. } = &command {
                state.history.patch_idea_snapshots(id, after);
            }
            Self::commit(&mut state, command, record, false, &mut events)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), vec![step]))
    }

    /// Removes an idea together with every edge attached to it.
    pub fn delete_idea(&self, id: &IdeaId) -> Result<Pending<()>, StoreError> {
        let mut events = Vec::new();
        let step = {
            let mut state = self.inner.state.lock();
            let command = delete_command(&state, id)?;
            Self::commit(&mut state, command, true, false, &mut events)
        };
        self.emit(events);
        Ok(Pending::new(self.clone(), (), vec![step]))
    }
}

pub(super) fn existing_idea<'a>(state: &'a CanvasState, id: &IdeaId) -> Result<&'a Idea, ValidationError> {
    let id = state.idea_ids.resolve(id);
    state
        .ideas
        .get(&id)
        .ok_or_else(|| ValidationError::UnknownIdea(id.to_string()))
}

pub(super) fn update_command(
    state: &CanvasState,
    id: &IdeaId,
    patch: IdeaPatch,
) -> Result<Command, ValidationError> {
    let idea = existing_idea(state, id)?;
    patch.validate_for(idea)?;
    Ok(Command::UpdateIdea {
        id: idea.id.clone(),
        before: patch.capture(idea),
        after: patch,
    })
}

pub(super) fn delete_command(state: &CanvasState, id: &IdeaId) -> Result<Command, ValidationError> {
    let idea = existing_idea(state, id)?;
    let mut edges = state
        .edges
        .values()
        .filter(|edge| edge.touches(&idea.id))
        .cloned()
        .collect::<Vec<Edge>>();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Command::DeleteIdea {
        idea: idea.clone(),
        edges,
    })
}
