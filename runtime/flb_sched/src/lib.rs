//! Asynchronous evaluation core of the Flabbergast runtime.
//!
//! Nothing in this crate blocks a worker thread. A computation is a chain of
//! segments: each one runs, perhaps launches child tasks or suspends on a
//! [`Promise`], and returns. The scheduler counts tasks with live segments and
//! declares the run finished when that count reaches zero.
//!
//! # Architecture
//!
//! - [`Promise`] / [`Future`]: read and write halves of a single-assignment
//!   value. The future is also the task's handle to the scheduler.
//! - [`TaskState`]: the six-state lifecycle of each task.
//! - [`Scheduler`]: owns the worker pool, runs a root computation and turns
//!   the end of a run into an [`Outcome`].
//! - [`WaitSite`]: what a suspended task is waiting for; pending sites are
//!   the vertices of the deadlock graph.
//! - [`strongly_connected`]: Tarjan's algorithm used to split permanently
//!   blocked waits into [`DeadlockReport`] components.
//!
//! # Trampolining
//!
//! Continuations run inline on the thread that made them runnable until the
//! per-thread nesting bound ([`SchedulerConfig::max_inline_depth`]) is hit;
//! beyond it they are handed back to the pool and start on a fresh stack.

mod config;
mod deadlock;
mod future;
mod promise;
mod runtime;
mod state;
mod task;
mod wait;

pub use config::{SchedulerConfig, INLINE_DEPTH_ENV, WORKERS_ENV};
pub use deadlock::{strongly_connected, CycleSink, DeadlockReport};
pub use future::{Future, LaunchBatch, Resumer};
pub use promise::Promise;
pub use runtime::{Flow, Outcome, Scheduler, Work};
pub use state::TaskState;
pub use task::TaskHandle;
pub use wait::{DescribedWait, PendingWait, WaitKind, WaitSite};
