#![forbid(unsafe_code)]

use crate::ids::{EdgeId, IdeaId};
use crate::model::{Edge, EdgePatch, Idea, IdeaPatch};
use serde::{Deserialize, Serialize};

/// One invertible graph mutation, stored as plain before/after data so it can be replayed
/// through the same code path as a live edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Inserts `idea`, then `edges` (edges that were removed together with the idea).
    CreateIdea { idea: Idea, edges: Vec<Edge> },
    /// Removes `edges`, then `idea`.
    DeleteIdea { idea: Idea, edges: Vec<Edge> },
    UpdateIdea {
        id: IdeaId,
        before: IdeaPatch,
        after: IdeaPatch,
    },
    CreateEdge { edge: Edge },
    DeleteEdge { edge: Edge },
    UpdateEdge {
        id: EdgeId,
        before: EdgePatch,
        after: EdgePatch,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateIdea { .. } => "create_idea",
            Self::DeleteIdea { .. } => "delete_idea",
            Self::UpdateIdea { .. } => "update_idea",
            Self::CreateEdge { .. } => "create_edge",
            Self::DeleteEdge { .. } => "delete_edge",
            Self::UpdateEdge { .. } => "update_edge",
        }
    }

    pub fn inverse(&self) -> Command {
        match self {
            Self::CreateIdea { idea, edges } => Self::DeleteIdea {
                idea: idea.clone(),
                edges: edges.clone(),
            },
            Self::DeleteIdea { idea, edges } => Self::CreateIdea {
                idea: idea.clone(),
                edges: edges.clone(),
            },
            Self::UpdateIdea { id, before, after } => Self::UpdateIdea {
                id: id.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            Self::CreateEdge { edge } => Self::DeleteEdge { edge: edge.clone() },
            Self::DeleteEdge { edge } => Self::CreateEdge { edge: edge.clone() },
            Self::UpdateEdge { id, before, after } => Self::UpdateEdge {
                id: id.clone(),
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    /// Ideas this command brings into existence.
    pub fn created_idea_ids(&self) -> Vec<&IdeaId> {
        match self {
            Self::CreateIdea { idea, .. } => vec![&idea.id],
            _ => Vec::new(),
        }
    }

    pub fn created_edge_ids(&self) -> Vec<&EdgeId> {
        match self {
            Self::CreateIdea { edges, .. } => edges.iter().map(|edge| &edge.id).collect(),
            Self::CreateEdge { edge } => vec![&edge.id],
            _ => Vec::new(),
        }
    }

    /// Every idea id the command mentions, including the ones it creates.
    pub fn mentioned_idea_ids(&self) -> Vec<&IdeaId> {
        match self {
            Self::CreateIdea { idea, edges } | Self::DeleteIdea { idea, edges } => {
                let mut out = vec![&idea.id];
                for edge in edges {
                    out.push(&edge.parent_id);
                    out.push(&edge.child_id);
                }
                out
            }
            Self::UpdateIdea { id, .. } => vec![id],
            Self::CreateEdge { edge } | Self::DeleteEdge { edge } => {
                vec![&edge.parent_id, &edge.child_id]
            }
            Self::UpdateEdge { .. } => Vec::new(),
        }
    }

    pub fn mentioned_edge_ids(&self) -> Vec<&EdgeId> {
        match self {
            Self::CreateIdea { edges, .. } | Self::DeleteIdea { edges, .. } => {
                edges.iter().map(|edge| &edge.id).collect()
            }
            Self::CreateEdge { edge } | Self::DeleteEdge { edge } => vec![&edge.id],
            Self::UpdateEdge { id, .. } => vec![id],
            Self::UpdateIdea { .. } => Vec::new(),
        }
    }

    pub fn rewrite_idea_id(&mut self, from: &IdeaId, to: &IdeaId) {
        let swap = |id: &mut IdeaId| {
            if id == from {
                *id = to.clone();
            }
        };
        match self {
            Self::CreateIdea { idea, edges } | Self::DeleteIdea { idea, edges } => {
                swap(&mut idea.id);
                for edge in edges {
                    swap(&mut edge.parent_id);
                    swap(&mut edge.child_id);
                }
            }
            Self::UpdateIdea { id, .. } => swap(id),
            Self::CreateEdge { edge } | Self::DeleteEdge { edge } => {
                swap(&mut edge.parent_id);
                swap(&mut edge.child_id);
            }
            Self::UpdateEdge { .. } => {}
        }
    }

    /// Writes `patch` into the snapshot of idea `id` carried by a create or delete, so a
    /// replay restores the idea as it is now rather than as it was recorded.
    pub fn patch_idea_snapshot(&mut self, id: &IdeaId, patch: &IdeaPatch) {
        if let Self::CreateIdea { idea, .. } | Self::DeleteIdea { idea, .. } = self
            && &idea.id == id
        {
            patch.apply_to(idea);
        }
    }

    pub fn rewrite_edge_id(&mut self, from: &EdgeId, to: &EdgeId) {
        let swap = |id: &mut EdgeId| {
            if id == from {
                *id = to.clone();
            }
        };
        match self {
            Self::CreateIdea { edges, .. } | Self::DeleteIdea { edges, .. } => {
                for edge in edges {
                    swap(&mut edge.id);
                }
            }
            Self::CreateEdge { edge } | Self::DeleteEdge { edge } => swap(&mut edge.id),
            Self::UpdateEdge { id, .. } => swap(id),
            Self::UpdateIdea { .. } => {}
        }
    }
}
