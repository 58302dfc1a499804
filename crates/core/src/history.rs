#![forbid(unsafe_code)]

//! Linear undo/redo stacks of [`Command`]s with nestable batching.
//!
//! This is pure bookkeeping: nothing here touches the graph. The store pops an entry, applies
//! the commands it hands back and then pushes the entry onto the opposite stack.

use crate::command::Command;
use crate::ids::{EdgeId, IdeaId};
use crate::model::IdeaPatch;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Op {
    pub seq: u64,
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HistoryEntry {
    Single(Op),
    Batch(Vec<Op>),
}

impl HistoryEntry {
    pub fn ops(&self) -> &[Op] {
        match self {
            Self::Single(op) => std::slice::from_ref(op),
            Self::Batch(ops) => ops,
        }
    }

    fn ops_mut(&mut self) -> &mut [Op] {
        match self {
            Self::Single(op) => std::slice::from_mut(op),
            Self::Batch(ops) => ops,
        }
    }

    /// Inverses, last applied first.
    pub fn undo_commands(&self) -> Vec<Command> {
        self.ops()
            .iter()
            .rev()
            .map(|op| op.command.inverse())
            .collect()
    }

    /// Original commands in forward order.
    pub fn redo_commands(&self) -> Vec<Command> {
        self.ops().iter().map(|op| op.command.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ops().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops().is_empty()
    }

    /// Removes the op with `seq`. Returns `None` if it is not in this entry; otherwise
    /// `Some(emptied)`.
    fn remove(&mut self, seq: u64) -> Option<bool> {
        match self {
            Self::Single(op) => (op.seq == seq).then_some(true),
            Self::Batch(ops) => {
                let index = ops.iter().position(|op| op.seq == seq)?;
                ops.remove(index);
                Some(ops.is_empty())
            }
        }
    }
}

#[derive(Debug)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    pending: Vec<Op>,
    depth: usize,
    next_seq: u64,
    /// Maximum undo entries kept; 0 keeps everything.
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            pending: Vec::new(),
            depth: 0,
            next_seq: 1,
            limit,
        }
    }

    /// Records a user mutation and returns its sequence number. Inside a batch the op joins
    /// the pending batch; otherwise it becomes its own entry. Either way redo is cleared.
    pub fn record(&mut self, command: Command) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let op = Op { seq, command };
        self.redo.clear();
        if self.depth > 0 {
            self.pending.push(op);
        } else {
            self.push_undo(HistoryEntry::Single(op));
        }
        seq
    }

    pub fn start_batch(&mut self) {
        self.depth += 1;
    }

    /// Closes one batch level. Only the outermost close flushes; returns true when an entry
    /// was pushed.
    pub fn end_batch(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        if self.depth > 0 || self.pending.is_empty() {
            return false;
        }
        let ops = std::mem::take(&mut self.pending);
        self.push_undo(HistoryEntry::Batch(ops));
        true
    }

    pub fn in_batch(&self) -> bool {
        self.depth > 0
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn take_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    pub fn take_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    pub fn push_undone(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    pub fn push_redone(&mut self, entry: HistoryEntry) {
        self.push_undo(entry);
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        if self.limit > 0 && self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
    }

    /// Drops the op with `seq` wherever it lives (open batch, undo or redo stack). Entries
    /// left empty are removed. Returns whether anything was dropped.
    pub fn forget(&mut self, seq: u64) -> bool {
        if let Some(index) = self.pending.iter().position(|op| op.seq == seq) {
            self.pending.remove(index);
            return true;
        }
        for stack in [&mut self.undo, &mut self.redo] {
            for index in (0..stack.len()).rev() {
                match stack[index].remove(seq) {
                    Some(true) => {
                        stack.remove(index);
                        return true;
                    }
                    Some(false) => return true,
                    None => {}
                }
            }
        }
        false
    }

    pub fn rewrite_idea_id(&mut self, from: &IdeaId, to: &IdeaId) {
        self.for_each_command(|command| command.rewrite_idea_id(from, to));
    }

    pub fn rewrite_edge_id(&mut self, from: &EdgeId, to: &EdgeId) {
        self.for_each_command(|command| command.rewrite_edge_id(from, to));
    }

    /// Folds a change made outside history into every recorded snapshot of the idea.
    pub fn patch_idea_snapshots(&mut self, id: &IdeaId, patch: &IdeaPatch) {
        self.for_each_command(|command| command.patch_idea_snapshot(id, patch));
    }

    fn for_each_command(&mut self, mut f: impl FnMut(&mut Command)) {
        for op in self.pending.iter_mut() {
            f(&mut op.command);
        }
        for entry in self.undo.iter_mut().chain(self.redo.iter_mut()) {
            for op in entry.ops_mut() {
                f(&mut op.command);
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.pending.clear();
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn moved(id: &str, to: f64) -> Command {
        Command::UpdateIdea {
            id: IdeaId::try_new(id).unwrap(),
            before: IdeaPatch::position(Point::new(0.0, 0.0)),
            after: IdeaPatch::position(Point::new(to, to)),
        }
    }

    #[test]
    fn record_clears_redo() {
        let mut history = History::default();
        history.record(moved("a", 1.0));
        let entry = history.take_undo().unwrap();
        history.push_undone(entry);
        assert!(history.can_redo());

        history.record(moved("a", 2.0));
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn nested_batches_flush_once() {
        let mut history = History::default();
        history.start_batch();
        history.record(moved("a", 1.0));
        history.start_batch();
        history.record(moved("b", 1.0));
        assert!(!history.end_batch());
        assert!(!history.can_undo());
        history.record(moved("c", 1.0));
        assert!(history.end_batch());
        assert!(!history.end_batch());

        let entry = history.take_undo().unwrap();
        assert_eq!(entry.len(), 3);
        assert!(history.take_undo().is_none());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut history = History::default();
        history.start_batch();
        assert!(!history.end_batch());
        assert!(!history.can_undo());
    }

    #[test]
    fn undo_commands_run_in_reverse() {
        let mut history = History::default();
        history.start_batch();
        history.record(moved("a", 1.0));
        history.record(moved("b", 2.0));
        history.end_batch();
        let entry = history.take_undo().unwrap();

        let undo = entry.undo_commands();
        assert_eq!(undo[0], moved("b", 2.0).inverse());
        assert_eq!(undo[1], moved("a", 1.0).inverse());
        assert_eq!(entry.redo_commands(), vec![moved("a", 1.0), moved("b", 2.0)]);
    }

    #[test]
    fn forget_removes_ops_and_empty_entries() {
        let mut history = History::default();
        let lone = history.record(moved("a", 1.0));
        history.start_batch();
        let first = history.record(moved("b", 1.0));
        let second = history.record(moved("c", 1.0));
        history.end_batch();

        assert!(history.forget(lone));
        assert_eq!(history.undo_len(), 1);
        assert!(history.forget(first));
        assert_eq!(history.undo_len(), 1);
        assert!(history.forget(second));
        assert_eq!(history.undo_len(), 0);
        assert!(!history.forget(second));
    }

    #[test]
    fn forget_reaches_into_an_open_batch() {
        let mut history = History::default();
        history.start_batch();
        let seq = history.record(moved("a", 1.0));
        assert!(history.forget(seq));
        assert!(!history.end_batch());
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let mut history = History::new(2);
        history.record(moved("a", 1.0));
        history.record(moved("b", 1.0));
        history.record(moved("c", 1.0));
        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.take_undo().unwrap().redo_commands(), vec![moved("c", 1.0)]);
        assert_eq!(history.take_undo().unwrap().redo_commands(), vec![moved("b", 1.0)]);
    }

    #[test]
    fn rewrite_reaches_every_stack() {
        let mut history = History::default();
        let tmp = IdeaId::temporary();
        history.record(Command::UpdateIdea {
            id: tmp.clone(),
            before: IdeaPatch::text("x"),
            after: IdeaPatch::text("y"),
        });
        let real = IdeaId::try_new("idea-1").unwrap();
        history.rewrite_idea_id(&tmp, &real);
        let entry = history.take_undo().unwrap();
        let Command::UpdateIdea { id, .. } = &entry.ops()[0].command else {
            panic!("unexpected command");
        };
        assert_eq!(id, &real);
    }
}
