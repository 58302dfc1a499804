#![forbid(unsafe_code)]

use crate::error::ValidationError;
use crate::geometry::{Point, Rect, Size, Viewport};
use crate::ids::{BrainDumpId, EdgeId, EdgeTypeId, IdeaId};
use crate::placement::Anchor;
use serde::{Deserialize, Serialize};

pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_IDEA_SIZE: Size = Size::new(240.0, 120.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaState {
    Generating,
    Ready,
    Error,
}

impl IdeaState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "generating" => Some(Self::Generating),
            "ready" => Some(Self::Ready),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: IdeaState) -> bool {
        self == next
            || matches!(
                (self, next),
                (Self::Generating, Self::Ready) | (Self::Generating, Self::Error)
            )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub brain_dump_id: BrainDumpId,
    pub text: String,
    pub summary: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    pub state: IdeaState,
    pub session_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Idea {
    pub fn position(&self) -> Point {
        Point::new(self.position_x, self.position_y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position(), self.size())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub brain_dump_id: BrainDumpId,
    pub parent_id: IdeaId,
    pub child_id: IdeaId,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub note: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Edge {
    pub fn touches(&self, idea: &IdeaId) -> bool {
        &self.parent_id == idea || &self.child_id == idea
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeType {
    pub id: EdgeTypeId,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub prevents_cycles: Option<bool>,
    #[serde(default)]
    pub allows_bidirectional: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainDump {
    pub id: BrainDumpId,
    pub name: String,
    pub viewport: Viewport,
    pub archived_at_ms: Option<i64>,
    /// Derived counts reported by the backend; not authoritative.
    #[serde(default)]
    pub idea_count: usize,
    #[serde(default)]
    pub edge_count: usize,
}

impl BrainDump {
    pub fn is_archived(&self) -> bool {
        self.archived_at_ms.is_some()
    }
}

/// Input for creating an idea through the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewIdea {
    pub text: String,
    pub size: Option<Size>,
    pub anchor: Anchor,
    pub session_id: Option<String>,
    pub metadata: Metadata,
}

impl NewIdea {
    pub fn new(text: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            text: text.into(),
            size: None,
            anchor,
            session_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEdge {
    pub parent_id: IdeaId,
    pub child_id: IdeaId,
    pub edge_type: String,
    pub note: Option<String>,
}

impl NewEdge {
    pub fn new(parent_id: IdeaId, child_id: IdeaId, edge_type: impl Into<String>) -> Self {
        Self {
            parent_id,
            child_id,
            edge_type: edge_type.into(),
            note: None,
        }
    }
}

/// Create payload sent to the persistence service. `id` is set when an entity is being
/// restored and must keep its identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdeaDraft {
    pub id: Option<IdeaId>,
    pub brain_dump_id: BrainDumpId,
    pub text: String,
    pub summary: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    pub state: IdeaState,
    pub session_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
}

impl IdeaDraft {
    pub fn from_idea(idea: &Idea) -> Self {
        Self {
            id: (!idea.id.is_temporary()).then(|| idea.id.clone()),
            brain_dump_id: idea.brain_dump_id.clone(),
            text: idea.text.clone(),
            summary: idea.summary.clone(),
            position_x: idea.position_x,
            position_y: idea.position_y,
            width: idea.width,
            height: idea.height,
            state: idea.state,
            session_id: idea.session_id.clone(),
            embedding: idea.embedding.clone(),
            metadata: idea.metadata.clone(),
        }
    }

    pub fn into_idea(self, id: IdeaId, now_ms: i64) -> Idea {
        Idea {
            id,
            brain_dump_id: self.brain_dump_id,
            text: self.text,
            summary: self.summary,
            position_x: self.position_x,
            position_y: self.position_y,
            width: self.width,
            height: self.height,
            state: self.state,
            session_id: self.session_id,
            embedding: self.embedding,
            metadata: self.metadata,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDraft {
    pub id: Option<EdgeId>,
    pub brain_dump_id: BrainDumpId,
    pub parent_id: IdeaId,
    pub child_id: IdeaId,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub note: Option<String>,
}

impl EdgeDraft {
    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            id: (!edge.id.is_temporary()).then(|| edge.id.clone()),
            brain_dump_id: edge.brain_dump_id.clone(),
            parent_id: edge.parent_id.clone(),
            child_id: edge.child_id.clone(),
            edge_type: edge.edge_type.clone(),
            note: edge.note.clone(),
        }
    }

    pub fn into_edge(self, id: EdgeId, now_ms: i64) -> Edge {
        Edge {
            id,
            brain_dump_id: self.brain_dump_id,
            parent_id: self.parent_id,
            child_id: self.child_id,
            edge_type: self.edge_type,
            note: self.note,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

/// Sparse set of idea fields. Nullable fields use `Option<Option<_>>`: the outer `None`
/// means "untouched", `Some(None)` clears the value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IdeaState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Option<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl IdeaPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.summary.is_none()
            && self.position.is_none()
            && self.size.is_none()
            && self.state.is_none()
            && self.session_id.is_none()
            && self.embedding.is_none()
            && self.metadata.is_none()
    }

    /// Snapshot of `idea`'s current values for exactly the fields this patch touches.
    pub fn capture(&self, idea: &Idea) -> Self {
        Self {
            text: self.text.as_ref().map(|_| idea.text.clone()),
            summary: self.summary.as_ref().map(|_| idea.summary.clone()),
            position: self.position.map(|_| idea.position()),
            size: self.size.map(|_| idea.size()),
            state: self.state.map(|_| idea.state),
            session_id: self.session_id.as_ref().map(|_| idea.session_id.clone()),
            embedding: self.embedding.as_ref().map(|_| idea.embedding.clone()),
            metadata: self.metadata.as_ref().map(|_| idea.metadata.clone()),
        }
    }

    pub fn apply_to(&self, idea: &mut Idea) {
        if let Some(text) = &self.text {
            idea.text = text.clone();
        }
        if let Some(summary) = &self.summary {
            idea.summary = summary.clone();
        }
        if let Some(position) = self.position {
            idea.position_x = position.x;
            idea.position_y = position.y;
        }
        if let Some(size) = self.size {
            idea.width = size.width;
            idea.height = size.height;
        }
        if let Some(state) = self.state {
            idea.state = state;
        }
        if let Some(session_id) = &self.session_id {
            idea.session_id = session_id.clone();
        }
        if let Some(embedding) = &self.embedding {
            idea.embedding = embedding.clone();
        }
        if let Some(metadata) = &self.metadata {
            idea.metadata = metadata.clone();
        }
    }

    /// Checks the patch against the invariants of the idea it will be applied to.
    pub fn validate_for(&self, idea: &Idea) -> Result<(), ValidationError> {
        if let Some(size) = self.size {
            validate_dimensions(size)?;
        }
        if let Some(next) = self.state
            && !idea.state.can_transition_to(next)
        {
            return Err(ValidationError::InvalidStateTransition {
                from: idea.state,
                to: next,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePatch {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<String>>,
}

impl EdgePatch {
    pub fn is_empty(&self) -> bool {
        self.edge_type.is_none() && self.note.is_none()
    }

    pub fn capture(&self, edge: &Edge) -> Self {
        Self {
            edge_type: self.edge_type.as_ref().map(|_| edge.edge_type.clone()),
            note: self.note.as_ref().map(|_| edge.note.clone()),
        }
    }

    pub fn apply_to(&self, edge: &mut Edge) {
        if let Some(edge_type) = &self.edge_type {
            edge.edge_type = edge_type.clone();
        }
        if let Some(note) = &self.note {
            edge.note = note.clone();
        }
    }
}

pub fn validate_dimensions(size: Size) -> Result<(), ValidationError> {
    if size.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::InvalidDimensions {
            width: size.width,
            height: size.height,
        })
    }
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea() -> Idea {
        Idea {
            id: IdeaId::try_new("idea-1").unwrap(),
            brain_dump_id: BrainDumpId::try_new("bd-1").unwrap(),
            text: "first".to_string(),
            summary: Some("short".to_string()),
            position_x: 10.0,
            position_y: 20.0,
            width: 240.0,
            height: 120.0,
            state: IdeaState::Generating,
            session_id: None,
            embedding: None,
            metadata: Metadata::new(),
            created_at_ms: 1,
            updated_at_ms: 1,
        }
    }

    #[test]
    fn capture_then_apply_restores_only_touched_fields() {
        let mut target = idea();
        let patch = IdeaPatch {
            text: Some("second".to_string()),
            summary: Some(None),
            position: Some(Point::new(1.0, 2.0)),
            ..IdeaPatch::default()
        };
        let before = patch.capture(&target);
        assert_eq!(before.text.as_deref(), Some("first"));
        assert_eq!(before.summary, Some(Some("short".to_string())));
        assert!(before.size.is_none());

        patch.apply_to(&mut target);
        assert_eq!(target.text, "second");
        assert_eq!(target.summary, None);
        assert_eq!(target.position(), Point::new(1.0, 2.0));

        before.apply_to(&mut target);
        assert_eq!(target, idea());
    }

    #[test]
    fn state_only_moves_forward_from_generating() {
        assert!(IdeaState::Generating.can_transition_to(IdeaState::Ready));
        assert!(IdeaState::Generating.can_transition_to(IdeaState::Error));
        assert!(!IdeaState::Ready.can_transition_to(IdeaState::Generating));
        assert!(!IdeaState::Error.can_transition_to(IdeaState::Ready));

        let mut ready = idea();
        ready.state = IdeaState::Ready;
        let patch = IdeaPatch {
            state: Some(IdeaState::Generating),
            ..IdeaPatch::default()
        };
        assert_eq!(
            patch.validate_for(&ready).unwrap_err(),
            ValidationError::InvalidStateTransition {
                from: IdeaState::Ready,
                to: IdeaState::Generating,
            }
        );
    }

    #[test]
    fn dimensions_must_be_positive() {
        assert!(validate_dimensions(Size::new(1.0, 1.0)).is_ok());
        assert!(validate_dimensions(Size::new(0.0, 1.0)).is_err());
        assert!(validate_dimensions(Size::new(5.0, -1.0)).is_err());
        assert!(validate_dimensions(Size::new(f64::NAN, 1.0)).is_err());
    }

    #[test]
    fn drafts_drop_temporary_ids() {
        let mut local = idea();
        local.id = IdeaId::temporary();
        assert_eq!(IdeaDraft::from_idea(&local).id, None);
        assert_eq!(
            IdeaDraft::from_idea(&idea()).id,
            Some(IdeaId::try_new("idea-1").unwrap())
        );
    }

    #[test]
    fn edge_type_serializes_as_type() {
        let patch = EdgePatch {
            edge_type: Some("depends_on".to_string()),
            note: None,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "depends_on" }));
    }
}
