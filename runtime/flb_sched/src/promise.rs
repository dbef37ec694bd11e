//! Read side of a single-assignment value.

use crate::task::{Task, TaskHandle};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

pub(crate) type Listener<T> = Box<dyn FnOnce(T) + Send>;

pub(crate) enum SlotState<T> {
    Pending(SmallVec<[Listener<T>; 2]>),
    Ready(T),
}

/// Shared cell written once by a task's [`Future`](crate::Future).
pub(crate) struct Slot<T> {
    pub(crate) owner: Arc<Task>,
    pub(crate) state: Mutex<SlotState<T>>,
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new(owner: Arc<Task>) -> Arc<Self> {
        Arc::new(Slot {
            owner,
            state: Mutex::new(SlotState::Pending(SmallVec::new())),
        })
    }

    pub(crate) fn get(&self) -> Option<T> {
        match &*self.state.lock() {
            SlotState::Ready(value) => Some(value.clone()),
            SlotState::Pending(_) => None,
        }
    }
}

pub(crate) enum PromiseInner<T> {
    Ready(T),
    Broken,
    Pending(Arc<Slot<T>>),
}

/// Read-only handle to a value that becomes available exactly once.
///
/// Values are read immediately with [`try_get`](Promise::try_get) or
/// asynchronously through
/// [`Future::await_promise`](crate::Future::await_promise), which never
/// blocks the calling thread.
pub struct Promise<T>(pub(crate) PromiseInner<T>);

impl<T: Clone> Promise<T> {
    /// A promise that is already resolved.
    pub fn ready(value: T) -> Self {
        Promise(PromiseInner::Ready(value))
    }

    /// A promise that never resolves. Awaiting it blocks the waiter for good.
    pub fn broken() -> Self {
        Promise(PromiseInner::Broken)
    }

    /// The value, if it has been delivered.
    pub fn try_get(&self) -> Option<T> {
        match &self.0 {
            PromiseInner::Ready(value) => Some(value.clone()),
            PromiseInner::Broken => None,
            PromiseInner::Pending(slot) => slot.get(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.try_get().is_some()
    }

    /// The task that will deliver the value, while it is still pending.
    pub fn task(&self) -> Option<TaskHandle> {
        match &self.0 {
            PromiseInner::Pending(slot) if slot.get().is_none() => {
                Some(TaskHandle(Arc::clone(&slot.owner)))
            }
            _ => None,
        }
    }

    /// Run `f` once the value is delivered, without registering a wait.
    ///
    /// Runs immediately when the value is already there and never for a
    /// broken promise. `f` runs on the thread that delivers the value.
    pub fn when_resolved(&self, f: impl FnOnce(T) + Send + 'static) {
        match &self.0 {
            PromiseInner::Ready(value) => f(value.clone()),
            PromiseInner::Broken => {}
            PromiseInner::Pending(slot) => {
                let mut state = slot.state.lock();
                match &mut *state {
                    SlotState::Ready(value) => {
                        let value = value.clone();
                        drop(state);
                        f(value);
                    }
                    SlotState::Pending(listeners) => listeners.push(Box::new(f)),
                }
            }
        }
    }
}

impl<T: Clone> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise(match &self.0 {
            PromiseInner::Ready(value) => PromiseInner::Ready(value.clone()),
            PromiseInner::Broken => PromiseInner::Broken,
            PromiseInner::Pending(slot) => PromiseInner::Pending(Arc::clone(slot)),
        })
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            PromiseInner::Ready(_) => f.write_str("Promise(ready)"),
            PromiseInner::Broken => f.write_str("Promise(broken)"),
            PromiseInner::Pending(slot) => write!(f, "Promise(task#{})", slot.owner.id()),
        }
    }
}
