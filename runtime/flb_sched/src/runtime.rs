//! The scheduler and the per-run state it drives.
//!
//! A [`Scheduler`] owns the worker pool and the id counters; it can execute
//! any number of runs. Each call to [`Scheduler::run`] creates a fresh
//! [`Runtime`] that holds everything one run accumulates: the active-task
//! counter and its idle gate, recorded errors, and the registry of pending
//! waits.
//!
//! # Quiescence
//!
//! A task counts as active while it has a segment running or queued. Every
//! resume happens inside some other counted segment (or before the root is
//! submitted), so once the counter drops to zero nothing can restart and
//! the run is over: each task is complete, erroneous, or blocked for good.

use crate::config::SchedulerConfig;
use crate::deadlock::{self, CycleSink, DeadlockReport};
use crate::future::Future;
use crate::promise::{Promise, PromiseInner, Slot};
use crate::task::Task;
use crate::wait::{RegisteredWait, WaitId, WaitSite};
use flb_ir::{fatal, EvalError, Trace};
use flb_stack::{ensure_sufficient_stack, InlineGuard};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Result of a segment of deferred work.
pub type Flow = Result<(), EvalError>;

/// A segment of deferred work.
pub type Work = Box<dyn FnOnce() -> Flow + Send + 'static>;

struct Shared {
    pool: rayon::ThreadPool,
    config: SchedulerConfig,
    next_task: AtomicU64,
    next_serial: AtomicU64,
}

/// Owns the worker pool and executes runs.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, EvalError> {
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .stack_size(config.stack_size)
            .thread_name(move |index| format!("{prefix}-{index}"))
            .build()
            .map_err(|e| fatal(&Trace::root("scheduler"), format!("cannot start workers: {e}")))?;
        tracing::debug!(
            workers = config.workers,
            max_inline_depth = config.max_inline_depth,
            "scheduler started"
        );
        Ok(Scheduler {
            shared: Arc::new(Shared {
                pool,
                config,
                next_task: AtomicU64::new(0),
                next_serial: AtomicU64::new(0),
            }),
        })
    }

    /// A scheduler configured from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, EvalError> {
        Self::new(SchedulerConfig::from_env())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Run `root` on a fresh task until the whole run goes quiet.
    pub fn run<T, F>(&self, root: F) -> Outcome<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Future<T>) -> Flow + Send + 'static,
    {
        self.run_with_sink(root, &mut DeadlockReport::default())
    }

    /// Like [`run`](Self::run), also streaming any deadlock components into
    /// `sink`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run_with_sink<T, F>(&self, root: F, sink: &mut dyn CycleSink) -> Outcome<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Future<T>) -> Flow + Send + 'static,
    {
        let runtime = Runtime(Arc::new(RunState {
            shared: Arc::clone(&self.shared),
            active: AtomicUsize::new(0),
            gate: Mutex::new(()),
            idle: Condvar::new(),
            errors: Mutex::new(Vec::new()),
            waits: Mutex::new(BTreeMap::new()),
            next_wait: AtomicU64::new(0),
        }));
        let (future, promise) = runtime.new_future::<T>(Trace::root("root"));
        let task = Arc::clone(&future.task);
        runtime.spawn(&task, Box::new(move || root(future)));
        runtime.wait_idle();
        let outcome = runtime.outcome(&promise);
        runtime.0.waits.lock().clear();
        if let Outcome::Deadlocked { report, .. } = &outcome {
            report.replay(sink);
        }
        outcome
    }
}

/// How a run ended.
///
/// Errors take precedence over deadlock, deadlock over success. A root value
/// produced before unrelated parts of the run failed is still reported.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failed {
        errors: Vec<EvalError>,
        value: Option<T>,
    },
    Deadlocked {
        report: DeadlockReport,
        value: Option<T>,
    },
}

impl<T> Outcome<T> {
    /// The root value, whatever else happened.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failed { value, .. } | Outcome::Deadlocked { value, .. } => value.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Recorded errors (empty unless the run failed).
    pub fn errors(&self) -> &[EvalError] {
        match self {
            Outcome::Failed { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn deadlock(&self) -> Option<&DeadlockReport> {
        match self {
            Outcome::Deadlocked { report, .. } => Some(report),
            _ => None,
        }
    }
}

pub(crate) struct RunState {
    shared: Arc<Shared>,
    active: AtomicUsize,
    gate: Mutex<()>,
    idle: Condvar,
    errors: Mutex<Vec<EvalError>>,
    waits: Mutex<BTreeMap<WaitId, RegisteredWait>>,
    next_wait: AtomicU64,
}

/// Handle to the state of one run.
#[derive(Clone)]
pub(crate) struct Runtime(Arc<RunState>);

impl Runtime {
    pub(crate) fn new_future<U>(&self, trace: Trace) -> (Future<U>, Promise<U>)
    where
        U: Clone + Send + Sync + 'static,
    {
        let id = self.0.shared.next_task.fetch_add(1, Ordering::Relaxed);
        let task = Task::new(id, trace);
        let slot = Slot::new(Arc::clone(&task));
        let promise = Promise(PromiseInner::Pending(Arc::clone(&slot)));
        (Future::primary(self.clone(), task, slot), promise)
    }

    pub(crate) fn next_serial(&self) -> u64 {
        self.0.shared.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn max_inline_depth(&self) -> usize {
        self.0.shared.config.max_inline_depth
    }

    /// Run `work` as a segment of `task`: inline while the thread's nesting
    /// depth allows it, otherwise on the pool.
    pub(crate) fn dispatch(&self, task: &Arc<Task>, work: Work) {
        match InlineGuard::try_enter(self.max_inline_depth()) {
            Some(_guard) => {
                task.resume(&self.0.active);
                ensure_sufficient_stack(|| self.execute(task, work));
                self.suspend(task);
            }
            None => self.spawn(task, work),
        }
    }

    /// Queue `work` as a segment of `task` on the pool.
    pub(crate) fn spawn(&self, task: &Arc<Task>, work: Work) {
        task.resume(&self.0.active);
        let runtime = self.clone();
        let task = Arc::clone(task);
        self.0.shared.pool.spawn(move || {
            runtime.execute(&task, work);
            runtime.suspend(&task);
        });
    }

    fn execute(&self, task: &Task, work: Work) {
        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.record(task, error),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.record(task, fatal(task.trace(), format!("worker panicked: {message}")));
            }
        }
    }

    fn suspend(&self, task: &Task) {
        if task.suspend(&self.0.active) {
            let _gate = self.0.gate.lock();
            self.0.idle.notify_all();
        }
    }

    /// Record `error` against `task`. Every error is kept.
    pub(crate) fn record(&self, task: &Task, error: EvalError) {
        tracing::warn!(task = task.id(), "{error}");
        task.fail();
        self.0.errors.lock().push(error);
    }

    pub(crate) fn register_wait(&self, site: Arc<dyn WaitSite>, owner: &Arc<Task>) -> WaitId {
        let id = self.0.next_wait.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(wait = id, task = owner.id(), kind = %site.kind(), "wait registered");
        owner.add_wait();
        self.0.waits.lock().insert(
            id,
            RegisteredWait {
                site,
                owner: Arc::clone(owner),
            },
        );
        id
    }

    pub(crate) fn release_wait(&self, id: WaitId) {
        if let Some(wait) = self.0.waits.lock().remove(&id) {
            wait.owner.release_wait();
        }
    }

    fn wait_idle(&self) {
        let mut gate = self.0.gate.lock();
        while self.0.active.load(Ordering::SeqCst) > 0 {
            self.0.idle.wait(&mut gate);
        }
    }

    fn outcome<T: Clone>(&self, root: &Promise<T>) -> Outcome<T> {
        let value = root.try_get();
        let errors = std::mem::take(&mut *self.0.errors.lock());
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "run failed");
            return Outcome::Failed { errors, value };
        }

        // Wait sites may take their own locks while reporting blockers.
        let pending: Vec<(WaitId, RegisteredWait)> = self
            .0
            .waits
            .lock()
            .iter()
            .map(|(id, wait)| (*id, wait.clone()))
            .collect();
        if !pending.is_empty() {
            let registered: Vec<(WaitId, &RegisteredWait)> =
                pending.iter().map(|(id, wait)| (*id, wait)).collect();
            let mut report = DeadlockReport::default();
            deadlock::detect(&registered, &mut report);
            tracing::debug!(
                waits = registered.len(),
                cycles = report.cycles().len(),
                "run deadlocked"
            );
            return Outcome::Deadlocked { report, value };
        }

        match value {
            Some(value) => Outcome::Success(value),
            None => Outcome::Failed {
                errors: vec![fatal(
                    &Trace::root("root"),
                    "root computation finished without producing a value",
                )],
                value: None,
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
