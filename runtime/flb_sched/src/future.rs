//! Write side of a single-assignment value, and the handle through which a
//! task talks to the scheduler.
//!
//! A [`Future`] is what a running task holds: it delivers the task's value
//! exactly once, reports errors, launches child tasks, schedules further
//! segments, and suspends on promises or other wait sites. None of these
//! block the calling thread; suspending means handing a continuation to the
//! scheduler and returning.

use crate::promise::{Promise, PromiseInner, Slot, SlotState};
use crate::runtime::{Flow, Runtime, Work};
use crate::task::{Task, TaskHandle};
use crate::wait::{DescribedWait, WaitId, WaitKind, WaitSite};
use flb_ir::{state_violation, EvalError, Trace};
use flb_stack::{ensure_sufficient_stack, InlineGuard};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Continuation<T> = Box<dyn FnOnce(T) -> Flow + Send>;

enum Sink<T> {
    /// The task's own result slot.
    Slot(Arc<Slot<T>>),
    /// A sub-computation of the same task that hands its value onward.
    Inner(Mutex<Option<Continuation<T>>>),
}

/// Write side of a task's value.
pub struct Future<T> {
    pub(crate) runtime: Runtime,
    pub(crate) task: Arc<Task>,
    sink: Arc<Sink<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            runtime: self.runtime.clone(),
            task: Arc::clone(&self.task),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Future(task#{}, {})", self.task.id(), self.task.state())
    }
}

impl<T: Clone + Send + Sync + 'static> Future<T> {
    pub(crate) fn primary(runtime: Runtime, task: Arc<Task>, slot: Arc<Slot<T>>) -> Self {
        Future {
            runtime,
            task,
            sink: Arc::new(Sink::Slot(slot)),
        }
    }

    /// Deliver the value.
    ///
    /// Fails with a state violation on a second call, or after an error was
    /// recorded against the task.
    pub fn complete(&self, value: T) -> Flow {
        match &*self.sink {
            Sink::Slot(slot) => {
                if let Err(state) = self.task.complete() {
                    return Err(state_violation(
                        self.task.trace(),
                        format!("Cannot complete a computation in state {state}."),
                    ));
                }
                tracing::debug!(task = self.task.id(), "complete");
                let previous =
                    std::mem::replace(&mut *slot.state.lock(), SlotState::Ready(value.clone()));
                if let SlotState::Pending(listeners) = previous {
                    for listener in listeners {
                        listener(value.clone());
                    }
                }
                Ok(())
            }
            Sink::Inner(continuation) => {
                if self.task.is_error() {
                    return Err(state_violation(
                        self.task.trace(),
                        "Cannot complete a computation after it failed.",
                    ));
                }
                let Some(continuation) = continuation.lock().take() else {
                    return Err(state_violation(
                        self.task.trace(),
                        "Computation completed more than once.",
                    ));
                };
                continuation(value)
            }
        }
    }

    /// A sub-future sharing this task whose value is handed to `then`
    /// instead of a promise.
    pub fn inner<U>(&self, then: impl FnOnce(U) -> Flow + Send + 'static) -> Future<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        Future {
            runtime: self.runtime.clone(),
            task: Arc::clone(&self.task),
            sink: Arc::new(Sink::Inner(Mutex::new(Some(Box::new(then))))),
        }
    }
}

impl<T> Future<T> {
    /// Record an error against this task. May be called any number of
    /// times; every error is kept.
    pub fn error(&self, error: EvalError) {
        self.runtime.record(&self.task, error);
    }

    /// True once an error has been recorded against this task.
    pub fn is_error(&self) -> bool {
        self.task.is_error()
    }

    pub fn trace(&self) -> &Trace {
        self.task.trace()
    }

    pub fn task(&self) -> TaskHandle {
        TaskHandle(Arc::clone(&self.task))
    }

    /// A number unique within the scheduler that runs this task.
    pub fn next_id(&self) -> u64 {
        self.runtime.next_serial()
    }

    /// Start a child task. Its promise is returned immediately; the child
    /// runs on the pool.
    pub fn launch<U>(
        &self,
        trace: Trace,
        start: impl FnOnce(Future<U>) -> Flow + Send + 'static,
    ) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        let (future, promise) = self.runtime.new_future::<U>(trace);
        let task = Arc::clone(&future.task);
        tracing::debug!(parent = self.task.id(), task = task.id(), "launch");
        self.runtime.spawn(&task, Box::new(move || start(future)));
        promise
    }

    /// Collect launches and submit them together with
    /// [`LaunchBatch::execute`].
    pub fn batch(&self) -> LaunchBatch {
        LaunchBatch {
            runtime: self.runtime.clone(),
            parent: self.task.id(),
            pending: Vec::new(),
        }
    }

    /// Run `work` as a further segment of this task, inline if the nesting
    /// bound allows it.
    pub fn reschedule(&self, work: impl FnOnce() -> Flow + Send + 'static) {
        self.runtime.dispatch(&self.task, Box::new(work));
    }

    /// Await `promise`, registering a described wait while it is pending.
    ///
    /// If the value is already there, `then` runs synchronously (or is
    /// trampolined when the thread is nested too deeply) and its result is
    /// returned.
    pub fn await_promise<U>(
        &self,
        promise: &Promise<U>,
        trace: &Trace,
        description: impl Into<String>,
        then: impl FnOnce(U) -> Flow + Send + 'static,
    ) -> Flow
    where
        U: Clone + Send + Sync + 'static,
    {
        self.await_inner(
            promise,
            || -> Arc<dyn WaitSite> {
                Arc::new(DescribedWait::new(WaitKind::Await, trace.clone(), description))
            },
            Box::new(then),
        )
    }

    /// Await `promise`, registering `site` while it is pending.
    pub fn await_with_site<U>(
        &self,
        promise: &Promise<U>,
        site: Arc<dyn WaitSite>,
        then: impl FnOnce(U) -> Flow + Send + 'static,
    ) -> Flow
    where
        U: Clone + Send + Sync + 'static,
    {
        self.await_inner(promise, || site, Box::new(then))
    }

    fn await_inner<U>(
        &self,
        promise: &Promise<U>,
        site: impl FnOnce() -> Arc<dyn WaitSite>,
        then: Continuation<U>,
    ) -> Flow
    where
        U: Clone + Send + Sync + 'static,
    {
        match &promise.0 {
            PromiseInner::Ready(value) => self.run_now(value.clone(), then),
            PromiseInner::Broken => {
                self.runtime.register_wait(site(), &self.task);
                Ok(())
            }
            PromiseInner::Pending(slot) => {
                let mut state = slot.state.lock();
                match &mut *state {
                    SlotState::Ready(value) => {
                        let value = value.clone();
                        drop(state);
                        self.run_now(value, then)
                    }
                    SlotState::Pending(listeners) => {
                        let wait = self.runtime.register_wait(site(), &self.task);
                        self.task.add_dependency(&slot.owner);
                        let owner = slot.owner.id();
                        let runtime = self.runtime.clone();
                        let task = Arc::clone(&self.task);
                        listeners.push(Box::new(move |value| {
                            let waiter = Arc::clone(&task);
                            let resume = runtime.clone();
                            resume.dispatch(
                                &task,
                                Box::new(move || {
                                    runtime.release_wait(wait);
                                    waiter.remove_dependency(owner);
                                    then(value)
                                }),
                            );
                        }));
                        Ok(())
                    }
                }
            }
        }
    }

    fn run_now<U>(&self, value: U, then: Continuation<U>) -> Flow
    where
        U: Send + 'static,
    {
        match InlineGuard::try_enter(self.runtime.max_inline_depth()) {
            Some(_guard) => ensure_sufficient_stack(|| then(value)),
            None => {
                self.reschedule(move || then(value));
                Ok(())
            }
        }
    }

    /// Suspend on something that is not a promise. The wait stays
    /// registered until the returned [`Resumer`] is used.
    pub fn suspend<U>(
        &self,
        site: Arc<dyn WaitSite>,
        then: impl FnOnce(U) -> Flow + Send + 'static,
    ) -> Resumer<U> {
        let wait = self.runtime.register_wait(site, &self.task);
        Resumer {
            runtime: self.runtime.clone(),
            task: Arc::clone(&self.task),
            wait,
            then: Box::new(then),
        }
    }
}

/// One-shot handle that resumes a task suspended by [`Future::suspend`].
pub struct Resumer<U> {
    runtime: Runtime,
    task: Arc<Task>,
    wait: WaitId,
    then: Continuation<U>,
}

impl<U: Send + 'static> Resumer<U> {
    /// Release the wait and run the continuation as a segment of the
    /// suspended task.
    pub fn resume(self, value: U) {
        let Resumer {
            runtime,
            task,
            wait,
            then,
        } = self;
        let release = runtime.clone();
        runtime.dispatch(
            &task,
            Box::new(move || {
                release.release_wait(wait);
                then(value)
            }),
        );
    }
}

/// Launches that are submitted to the pool together.
///
/// Promises exist as soon as [`launch`](LaunchBatch::launch) returns, so
/// siblings can refer to one another before any of them runs. Dropping the
/// batch submits whatever was not yet executed.
pub struct LaunchBatch {
    runtime: Runtime,
    parent: u64,
    pending: Vec<(Arc<Task>, Work)>,
}

impl LaunchBatch {
    pub fn launch<U>(
        &mut self,
        trace: Trace,
        start: impl FnOnce(Future<U>) -> Flow + Send + 'static,
    ) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        let (future, promise) = self.runtime.new_future::<U>(trace);
        let task = Arc::clone(&future.task);
        self.pending.push((task, Box::new(move || start(future))));
        promise
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit every queued launch.
    pub fn execute(mut self) {
        self.submit();
    }

    fn submit(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(parent = self.parent, tasks = self.pending.len(), "launch batch");
        }
        for (task, work) in self.pending.drain(..) {
            self.runtime.spawn(&task, work);
        }
    }
}

impl Drop for LaunchBatch {
    fn drop(&mut self) {
        self.submit();
    }
}
