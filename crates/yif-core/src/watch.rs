//! Mutation watch support: deferred tasks and the debounce slot
//!
//! The engine never sleeps or spawns. It asks a [`Scheduler`] for a deferred
//! task, remembers the task id in a single [`RescanSlot`], and the host calls
//! back into the engine when the task fires. Re-arming the slot always
//! cancels the previous task first, so bursts collapse into one rescan.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::dom::Document;

/// Handle of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Deferred, cancellable task source.
///
/// When a task comes due the host hands its id back to the engine
/// (`FilterEngine::run_task`). Cancelling an unknown or already fired task
/// is a no-op.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TaskId;
    fn cancel(&mut self, task: TaskId);
}

/// Observable debounce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Idle,
    PendingRescan(TaskId),
}

// =============================================================================
// Rescan Slot
// =============================================================================

/// Single pending-rescan slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RescanSlot {
    pending: Option<TaskId>,
}

impl RescanSlot {
    /// Cancel whatever is pending and schedule a fresh task.
    pub fn arm<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S, delay: Duration) -> TaskId {
        self.cancel(scheduler);
        let task = scheduler.schedule(delay);
        self.pending = Some(task);
        task
    }

    /// Consume the slot if `task` is the one pending. Stale ids return false.
    pub fn take(&mut self, task: TaskId) -> bool {
        if self.pending == Some(task) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(task) = self.pending.take() {
            scheduler.cancel(task);
        }
    }

    pub fn state(&self) -> WatchState {
        match self.pending {
            Some(task) => WatchState::PendingRescan(task),
            None => WatchState::Idle,
        }
    }
}

// =============================================================================
// Manual Scheduler
// =============================================================================

/// Virtual-clock scheduler.
///
/// Time only moves through [`ManualScheduler::advance`], which returns the
/// tasks that came due, earliest first.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<TaskId, Duration>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward and pop every task due by then.
    pub fn advance(&mut self, by: Duration) -> Vec<TaskId> {
        self.now += by;
        let now = self.now;

        let mut due: Vec<(Duration, TaskId)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(task, at)| (*at, *task))
            .collect();
        due.sort();

        for (_, task) in &due {
            self.pending.remove(task);
        }
        due.into_iter().map(|(_, task)| task).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Absolute due time of a pending task.
    pub fn due_at(&self, task: TaskId) -> Option<Duration> {
        self.pending.get(&task).copied()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TaskId {
        let task = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.insert(task, self.now + delay);
        task
    }

    fn cancel(&mut self, task: TaskId) {
        self.pending.remove(&task);
    }
}

// =============================================================================
// Batch Qualification
// =============================================================================

/// Is an inserted subtree genuinely new, unfiltered content?
///
/// True when neither the root nor any descendant is currently hidden.
pub fn is_fresh_subtree<D: Document, V>(doc: &D, node: &D::Node, hidden: &HashMap<D::Node, V>) -> bool {
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        if hidden.contains_key(&current) {
            return false;
        }
        stack.extend(doc.children(&current));
    }
    true
}
