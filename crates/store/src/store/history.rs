#![forbid(unsafe_code)]

use super::CanvasStore;
use crate::error::StoreError;
use bdc_core::command::Command;
use bdc_core::model::IdeaState;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied,
    /// Nothing to undo or redo.
    Empty,
    /// Another undo or redo is still writing to the backend.
    Busy,
}

impl HistoryOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

struct ReplayGuard<'a>(&'a AtomicBool);

impl<'a> ReplayGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CanvasStore {
    pub fn can_undo(&self) -> bool {
        self.inner.state.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.state.lock().history.can_redo()
    }

    /// Reverts the most recent history entry (a whole batch at once).
    pub async fn undo(&self) -> Result<HistoryOutcome, StoreError> {
        self.replay(Direction::Undo).await
    }

    pub async fn redo(&self) -> Result<HistoryOutcome, StoreError> {
        self.replay(Direction::Redo).await
    }

    /// Applies an entry locally in one step, moves it to the opposite stack, then writes its
    /// commands to the backend one by one. Backend failures do not roll anything back; they
    /// are collected into [`StoreError::Replay`].
    ///
    /// When a command still depends on a create that has not been confirmed, or earlier
    /// deferred writes are outstanding, the backend writes continue on a background task and
    /// the call returns as soon as the local state has flipped.
    async fn replay(&self, direction: Direction) -> Result<HistoryOutcome, StoreError> {
        let Some(_guard) = ReplayGuard::acquire(&self.inner.replaying) else {
            warn!(action = direction.as_str(), "history operation already in progress");
            return Ok(HistoryOutcome::Busy);
        };

        let mut events = Vec::new();
        let (commands, generation, waiting) = {
            let mut state = self.inner.state.lock();
            if state.history.in_batch() {
                drop(state);
                warn!(action = direction.as_str(), "history is locked while a batch is open");
                return Ok(HistoryOutcome::Busy);
            }
            let entry = match direction {
                Direction::Undo => state.history.take_undo(),
                Direction::Redo => state.history.take_redo(),
            };
            let Some(entry) = entry else {
                return Ok(HistoryOutcome::Empty);
            };
            let commands = match direction {
                Direction::Undo => entry.undo_commands(),
                Direction::Redo => entry.redo_commands(),
            };
            for command in &commands {
                state.apply(command, &mut events);
            }
            match direction {
                Direction::Undo => state.history.push_undone(entry),
                Direction::Redo => state.history.push_redone(entry),
            }
            events.push(state.history_changed());
            let waiting = commands.iter().any(|command| state.awaits_confirmation(command));
            (commands, state.generation, waiting)
        };
        self.emit(events);

        let behind = *self.inner.deferred_replays.borrow() > 0;
        if (waiting || behind)
            && let Ok(runtime) = Handle::try_current()
        {
            self.defer_writes(runtime, direction, commands, generation);
            return Ok(HistoryOutcome::Applied);
        }
        self.write_history(direction, commands, generation)
            .await
            .map(|()| HistoryOutcome::Applied)
    }

    fn defer_writes(
        &self,
        runtime: Handle,
        direction: Direction,
        commands: Vec<Command>,
        generation: u64,
    ) {
        debug!(action = direction.as_str(), steps = commands.len(), "history writes deferred");
        self.inner.deferred_replays.send_modify(|count| *count += 1);
        let previous = self.inner.replay_tail.lock().take();
        let store = self.clone();
        let task = runtime.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if let Err(err) = store.write_history(direction, commands, generation).await {
                error!(action = direction.as_str(), error = %err, "deferred history writes failed");
            }
            store
                .inner
                .deferred_replays
                .send_modify(|count| *count = count.saturating_sub(1));
        });
        *self.inner.replay_tail.lock() = Some(task);
    }

    async fn write_history(
        &self,
        direction: Direction,
        commands: Vec<Command>,
        generation: u64,
    ) -> Result<(), StoreError> {
        let total = commands.len();
        let mut failed = 0;
        let mut first = None;
        for command in commands {
            let kind = command.kind();
            let (command, result) = self.persist(command, generation, true).await;
            match result {
                Ok(()) => {
                    // A create replayed before its enrichment landed starts it again.
                    if let Command::CreateIdea { idea, .. } = &command
                        && idea.state == IdeaState::Generating
                    {
                        self.spawn_enrichment(idea.id.clone());
                    }
                }
                Err(err) => {
                    error!(action = direction.as_str(), kind, error = %err, "history step failed to persist");
                    failed += 1;
                    first.get_or_insert(err);
                }
            }
        }
        debug!(action = direction.as_str(), steps = total, failed, "history replayed");

        match first {
            None => Ok(()),
            Some(first) => Err(StoreError::Replay {
                failed,
                total,
                first: Box::new(first),
            }),
        }
    }

    /// Resolves once every deferred history write has reached the backend.
    pub async fn wait_for_history_writes(&self) {
        let mut rx = self.inner.deferred_replays.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Opens a batch. Undo and redo report [`HistoryOutcome::Busy`] until the outermost
    /// [`end_batch`](Self::end_batch).
    pub fn start_batch(&self) {
        self.inner.state.lock().history.start_batch();
    }

    /// Closes one batch level; the outermost close turns everything recorded since the
    /// matching [`start_batch`](Self::start_batch) into a single undo entry.
    pub fn end_batch(&self) {
        let event = {
            let mut state = self.inner.state.lock();
            state.history.end_batch().then(|| state.history_changed())
        };
        if let Some(event) = event {
            self.emit(vec![event]);
        }
    }

    /// Runs `f` inside a batch.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.start_batch();
        let out = f(self);
        self.end_batch();
        out
    }
}
