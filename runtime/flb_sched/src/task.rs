//! Per-task bookkeeping.
//!
//! A task is the unit the scheduler tracks: it owns a lifecycle state, the
//! number of its segments that are running or queued, the number of waits
//! it has registered, and the reference-counted dependency edges to the
//! tasks it is waiting on. A task counts toward the run's active total
//! exactly while it has at least one segment.

use crate::state::{TaskEvent, TaskState};
use flb_ir::Trace;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type TaskId = u64;

struct Dependency {
    task: Weak<Task>,
    count: usize,
}

struct TaskInner {
    state: TaskState,
    segments: usize,
    waits: usize,
    dependencies: FxHashMap<TaskId, Dependency>,
}

impl TaskInner {
    fn settle(&mut self) {
        self.state = self.state.next(TaskEvent::Settle {
            running: self.segments > 0,
            waiting: self.waits > 0,
        });
    }
}

pub(crate) struct Task {
    id: TaskId,
    trace: Trace,
    inner: Mutex<TaskInner>,
}

impl Task {
    pub(crate) fn new(id: TaskId, trace: Trace) -> Arc<Task> {
        Arc::new(Task {
            id,
            trace,
            inner: Mutex::new(TaskInner {
                state: TaskState::Wait,
                segments: 0,
                waits: 0,
                dependencies: FxHashMap::default(),
            }),
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn trace(&self) -> &Trace {
        &self.trace
    }

    pub(crate) fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// Start or queue a segment, counting the task as active if it was idle.
    pub(crate) fn resume(&self, active: &AtomicUsize) {
        let mut inner = self.inner.lock();
        inner.segments += 1;
        if inner.segments == 1 {
            active.fetch_add(1, Ordering::SeqCst);
        }
        inner.state = inner.state.next(TaskEvent::Resume);
    }

    /// Finish a segment. Returns true if this made the whole run idle.
    pub(crate) fn suspend(&self, active: &AtomicUsize) -> bool {
        let mut inner = self.inner.lock();
        inner.segments = inner.segments.saturating_sub(1);
        inner.settle();
        inner.segments == 0 && active.fetch_sub(1, Ordering::SeqCst) == 1
    }

    pub(crate) fn add_wait(&self) {
        let mut inner = self.inner.lock();
        inner.waits += 1;
        inner.settle();
    }

    pub(crate) fn release_wait(&self) {
        let mut inner = self.inner.lock();
        inner.waits = inner.waits.saturating_sub(1);
        inner.settle();
    }

    pub(crate) fn fail(&self) {
        let mut inner = self.inner.lock();
        inner.state = inner.state.next(TaskEvent::Fail);
    }

    /// Mark the task complete. Returns the state that forbade it, if any.
    pub(crate) fn complete(&self) -> Result<(), TaskState> {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Wait | TaskState::Run => {
                inner.state = inner.state.next(TaskEvent::Complete);
                Ok(())
            }
            state => Err(state),
        }
    }

    /// True if an error may no longer be followed by a completion.
    pub(crate) fn is_error(&self) -> bool {
        self.inner.lock().state.is_error()
    }

    pub(crate) fn add_dependency(&self, on: &Arc<Task>) {
        let mut inner = self.inner.lock();
        inner
            .dependencies
            .entry(on.id)
            .or_insert_with(|| Dependency {
                task: Arc::downgrade(on),
                count: 0,
            })
            .count += 1;
    }

    pub(crate) fn remove_dependency(&self, on: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(dependency) = inner.dependencies.get_mut(&on) {
            dependency.count = dependency.count.saturating_sub(1);
            if dependency.count == 0 {
                inner.dependencies.remove(&on);
            }
        }
    }

    /// Tasks this one is still waiting on.
    pub(crate) fn dependencies(&self) -> SmallVec<[Arc<Task>; 4]> {
        self.inner
            .lock()
            .dependencies
            .values()
            .filter(|dependency| dependency.count > 0)
            .filter_map(|dependency| dependency.task.upgrade())
            .collect()
    }
}

/// Opaque handle to a scheduled task.
///
/// Handed out so that higher layers can name the tasks that hold a resource
/// open (see [`WaitSite::blockers`](crate::WaitSite::blockers)).
#[derive(Clone)]
pub struct TaskHandle(pub(crate) Arc<Task>);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn state(&self) -> TaskState {
        self.0.state()
    }

    pub fn trace(&self) -> &Trace {
        &self.0.trace
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}({})", self.0.id, self.0.state())
    }
}
