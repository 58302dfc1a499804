#![forbid(unsafe_code)]

use crate::error::ValidationError;
use crate::ids::{EdgeId, IdeaId};
use crate::model::{Edge, EdgeType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which existing edges the reachability search walks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Only edges of the candidate's type; different relationship kinds never interfere.
    #[default]
    SameType,
    /// Every edge regardless of type.
    AllEdges,
}

impl CyclePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "same_type" => Some(Self::SameType),
            "all_edges" => Some(Self::AllEdges),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeTypeFlags {
    pub prevents_cycles: bool,
    pub allows_bidirectional: bool,
}

impl Default for EdgeTypeFlags {
    fn default() -> Self {
        Self {
            prevents_cycles: true,
            allows_bidirectional: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EdgeTypeRegistry {
    by_name: HashMap<String, EdgeType>,
}

impl EdgeTypeRegistry {
    pub fn new(types: impl IntoIterator<Item = EdgeType>) -> Self {
        Self {
            by_name: types
                .into_iter()
                .map(|edge_type| (edge_type.name.clone(), edge_type))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&EdgeType> {
        self.by_name.get(name)
    }

    /// Unknown types get the strict defaults.
    pub fn flags(&self, name: &str) -> EdgeTypeFlags {
        let defaults = EdgeTypeFlags::default();
        match self.by_name.get(name) {
            Some(edge_type) => EdgeTypeFlags {
                prevents_cycles: edge_type
                    .prevents_cycles
                    .unwrap_or(defaults.prevents_cycles),
                allows_bidirectional: edge_type
                    .allows_bidirectional
                    .unwrap_or(defaults.allows_bidirectional),
            },
            None => defaults,
        }
    }

    pub fn default_type(&self) -> Option<&EdgeType> {
        let mut defaults = self
            .by_name
            .values()
            .filter(|edge_type| edge_type.is_default)
            .collect::<Vec<_>>();
        defaults.sort_by(|a, b| a.name.cmp(&b.name));
        defaults.into_iter().next()
    }

    pub fn types(&self) -> Vec<&EdgeType> {
        let mut out = self.by_name.values().collect::<Vec<_>>();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EdgeValidator<'a> {
    policy: CyclePolicy,
    registry: &'a EdgeTypeRegistry,
}

impl<'a> EdgeValidator<'a> {
    pub fn new(policy: CyclePolicy, registry: &'a EdgeTypeRegistry) -> Self {
        Self { policy, registry }
    }

    /// Decides whether `parent -> child` of `edge_type` may be inserted next to `edges`.
    pub fn check<'e>(
        &self,
        edges: impl IntoIterator<Item = &'e Edge>,
        parent: &IdeaId,
        child: &IdeaId,
        edge_type: &str,
    ) -> Result<(), ValidationError> {
        self.check_ignoring(edges, parent, child, edge_type, None)
    }

    /// Same as [`check`](Self::check) but treats `ignore` as absent; used when an existing
    /// edge changes type.
    pub fn check_ignoring<'e>(
        &self,
        edges: impl IntoIterator<Item = &'e Edge>,
        parent: &IdeaId,
        child: &IdeaId,
        edge_type: &str,
        ignore: Option<&EdgeId>,
    ) -> Result<(), ValidationError> {
        if edge_type.trim().is_empty() {
            return Err(ValidationError::EmptyEdgeType);
        }
        if parent == child {
            return Err(ValidationError::SelfLoop {
                id: parent.to_string(),
            });
        }

        let flags = self.registry.flags(edge_type);
        let walk_cycles = flags.prevents_cycles && !flags.allows_bidirectional;

        let mut adjacency: HashMap<&IdeaId, Vec<&IdeaId>> = HashMap::new();
        for edge in edges {
            if ignore.is_some_and(|id| id == &edge.id) {
                continue;
            }
            if &edge.parent_id == parent && &edge.child_id == child {
                return Err(ValidationError::DuplicateEdge {
                    parent_id: parent.to_string(),
                    child_id: child.to_string(),
                });
            }
            if !walk_cycles {
                continue;
            }
            let in_scope = match self.policy {
                CyclePolicy::SameType => edge.edge_type == edge_type,
                CyclePolicy::AllEdges => true,
            };
            if in_scope {
                adjacency
                    .entry(&edge.parent_id)
                    .or_default()
                    .push(&edge.child_id);
            }
        }

        if walk_cycles && reachable(&adjacency, child, parent) {
            return Err(ValidationError::Cycle {
                parent_id: parent.to_string(),
                child_id: child.to_string(),
                edge_type: edge_type.to_string(),
            });
        }
        Ok(())
    }
}

fn reachable(adjacency: &HashMap<&IdeaId, Vec<&IdeaId>>, from: &IdeaId, to: &IdeaId) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(current) {
            stack.extend(next.iter().copied().filter(|id| !visited.contains(id)));
        }
    }
    false
}
