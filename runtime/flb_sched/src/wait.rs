//! Registered waits.
//!
//! Every time a task suspends on something that has not happened yet, it
//! registers a [`WaitSite`] with the run. The registry is what the scheduler
//! inspects once the run goes quiet: an empty registry means every task
//! finished; anything left over is permanently blocked and becomes a vertex
//! of the deadlock graph.

use crate::task::{Task, TaskHandle};
use flb_ir::Trace;
use std::fmt;
use std::sync::Arc;

/// What a task is blocked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitKind {
    /// A plain await on another task's promise.
    Await,
    /// A name-resolution query waiting on an attribute value.
    Lookup,
    /// A consumer parked on a gather bucket.
    Gather,
}

impl fmt::Display for WaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitKind::Await => "await",
            WaitKind::Lookup => "lookup",
            WaitKind::Gather => "gather",
        })
    }
}

/// Description of one suspension point.
pub trait WaitSite: Send + Sync {
    fn kind(&self) -> WaitKind;

    fn trace(&self) -> &Trace;

    /// Human-readable summary for deadlock reports.
    fn describe(&self) -> String;

    /// Tasks that must finish before this wait can be satisfied, beyond the
    /// promise dependencies the scheduler already tracks.
    fn blockers(&self) -> Vec<TaskHandle> {
        Vec::new()
    }
}

/// A wait site with a fixed description.
pub struct DescribedWait {
    kind: WaitKind,
    trace: Trace,
    description: String,
}

impl DescribedWait {
    pub fn new(kind: WaitKind, trace: Trace, description: impl Into<String>) -> Self {
        DescribedWait {
            kind,
            trace,
            description: description.into(),
        }
    }
}

impl WaitSite for DescribedWait {
    fn kind(&self) -> WaitKind {
        self.kind
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

pub(crate) type WaitId = u64;

/// Registry entry: the site and the task that is suspended on it.
#[derive(Clone)]
pub(crate) struct RegisteredWait {
    pub(crate) site: Arc<dyn WaitSite>,
    pub(crate) owner: Arc<Task>,
}

impl RegisteredWait {
    pub(crate) fn snapshot(&self, id: WaitId) -> PendingWait {
        PendingWait {
            id,
            kind: self.site.kind(),
            description: self.site.describe(),
            trace: self.site.trace().clone(),
        }
    }
}

/// Snapshot of a wait that was still pending when the run went quiet.
#[derive(Clone, Debug)]
pub struct PendingWait {
    pub id: u64,
    pub kind: WaitKind,
    pub description: String,
    pub trace: Trace,
}

impl fmt::Display for PendingWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.description)
    }
}
