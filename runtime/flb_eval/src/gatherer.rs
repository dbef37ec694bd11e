//! Gather/disperse buckets.
//!
//! A frame that declares bucket names owns an active gatherer. Every
//! attribute computation launched in the frame (or in a frame nested under
//! it through the container chain) holds the gatherer open; dispersed values
//! are collected until the last holder resolves. At that point the gatherer
//! swaps to its finished state, each bucket becomes a list frame, and every
//! parked consumer is resumed. Contributions after the swap are errors.

use crate::frame::Frame;
use crate::value::Value;
use flb_ir::{illegal_dispersion, not_gathered, DispersionFault, EvalError, Name, Trace};
use flb_sched::{Flow, Future, Resumer, TaskHandle, WaitKind, WaitSite};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Result of offering a value to one gatherer in a container chain.
pub(crate) enum Offer {
    Taken,
    Continue,
}

#[derive(Clone)]
pub(crate) enum Gatherer {
    /// Dispersal into this frame is always an error.
    Illegal,
    /// Declares nothing; dispersals pass through to the container.
    Inert,
    Active(Arc<ActiveGatherer>),
}

impl Gatherer {
    pub(crate) fn new(owner: Arc<str>, trace: Trace, names: BTreeSet<Name>) -> Gatherer {
        if names.is_empty() {
            return Gatherer::Inert;
        }
        Gatherer::Active(Arc::new(ActiveGatherer {
            owner,
            trace,
            names,
            state: Mutex::new(GatherState::Collecting(Collecting::default())),
        }))
    }

    pub(crate) fn acquire(&self, holder: Option<&TaskHandle>) {
        if let Gatherer::Active(active) = self {
            active.acquire(holder);
        }
    }

    pub(crate) fn release(&self, holder: Option<u64>) {
        if let Gatherer::Active(active) = self {
            active.release(holder);
        }
    }

    pub(crate) fn offer(&self, trace: &Trace, bucket: &Name, value: &Value) -> Result<Offer, EvalError> {
        match self {
            Gatherer::Illegal => Err(illegal_dispersion(trace, bucket, DispersionFault::NeverGathers)),
            Gatherer::Inert => Ok(Offer::Continue),
            Gatherer::Active(active) => active.offer(trace, bucket, value),
        }
    }

    pub(crate) fn gather<T>(
        &self,
        future: &Future<T>,
        trace: &Trace,
        bucket: &Name,
        then: impl FnOnce(Frame) -> Flow + Send + 'static,
    ) -> Flow {
        match self {
            Gatherer::Active(active) if active.names.contains(bucket) => {
                active.gather(future, trace, bucket, then)
            }
            _ => Err(not_gathered(trace, bucket)),
        }
    }

    pub(crate) fn names(&self) -> Vec<Name> {
        match self {
            Gatherer::Active(active) => active.names.iter().cloned().collect(),
            Gatherer::Illegal | Gatherer::Inert => Vec::new(),
        }
    }
}

pub(crate) struct ActiveGatherer {
    owner: Arc<str>,
    trace: Trace,
    names: BTreeSet<Name>,
    state: Mutex<GatherState>,
}

enum GatherState {
    Collecting(Collecting),
    Finished(Arc<BTreeMap<Name, Frame>>),
}

#[derive(Default)]
struct Collecting {
    buckets: BTreeMap<Name, Vec<Value>>,
    refs: usize,
    /// Tasks holding the gatherer open, with their hold counts.
    holders: FxHashMap<u64, (TaskHandle, usize)>,
    parked: Vec<(Name, Resumer<Frame>)>,
}

impl ActiveGatherer {
    fn acquire(&self, holder: Option<&TaskHandle>) {
        let mut state = self.state.lock();
        let GatherState::Collecting(collecting) = &mut *state else {
            return;
        };
        collecting.refs += 1;
        if let Some(holder) = holder {
            collecting
                .holders
                .entry(holder.id())
                .or_insert_with(|| (holder.clone(), 0))
                .1 += 1;
        }
    }

    fn release(&self, holder: Option<u64>) {
        let (parked, frames) = {
            let mut state = self.state.lock();
            let GatherState::Collecting(collecting) = &mut *state else {
                return;
            };
            collecting.refs = collecting.refs.saturating_sub(1);
            if let Some(id) = holder {
                if let Some(entry) = collecting.holders.get_mut(&id) {
                    entry.1 -= 1;
                    if entry.1 == 0 {
                        collecting.holders.remove(&id);
                    }
                }
            }
            if collecting.refs > 0 {
                return;
            }
            let collecting = std::mem::take(collecting);
            let frames = Arc::new(self.finish(collecting.buckets));
            *state = GatherState::Finished(Arc::clone(&frames));
            (collecting.parked, frames)
        };
        tracing::debug!(frame = %self.owner, consumers = parked.len(), "gatherer finished");
        for (bucket, resumer) in parked {
            resumer.resume(frames.get(&bucket).cloned().unwrap_or_else(Frame::empty));
        }
    }

    fn finish(&self, mut buckets: BTreeMap<Name, Vec<Value>>) -> BTreeMap<Name, Frame> {
        self.names
            .iter()
            .map(|bucket| {
                let values = buckets.remove(bucket).unwrap_or_default();
                let frame = Frame::list(
                    format!("{}:{bucket}", self.owner),
                    self.trace.special("gathered values"),
                    values,
                );
                (bucket.clone(), frame)
            })
            .collect()
    }

    fn offer(&self, trace: &Trace, bucket: &Name, value: &Value) -> Result<Offer, EvalError> {
        if !self.names.contains(bucket) {
            return Ok(Offer::Continue);
        }
        let mut state = self.state.lock();
        match &mut *state {
            GatherState::Finished(_) => {
                Err(illegal_dispersion(trace, bucket, DispersionFault::Inactive))
            }
            GatherState::Collecting(collecting) => {
                collecting
                    .buckets
                    .entry(bucket.clone())
                    .or_default()
                    .push(value.clone());
                Ok(Offer::Taken)
            }
        }
    }

    fn finished(&self, bucket: &Name) -> Option<Frame> {
        match &*self.state.lock() {
            GatherState::Finished(frames) => {
                Some(frames.get(bucket).cloned().unwrap_or_else(Frame::empty))
            }
            GatherState::Collecting(_) => None,
        }
    }

    fn gather<T>(
        self: &Arc<Self>,
        future: &Future<T>,
        trace: &Trace,
        bucket: &Name,
        then: impl FnOnce(Frame) -> Flow + Send + 'static,
    ) -> Flow {
        if let Some(frame) = self.finished(bucket) {
            return then(frame);
        }
        let site: Arc<dyn WaitSite> = Arc::new(GatherWait {
            gatherer: Arc::clone(self),
            bucket: bucket.clone(),
            trace: trace.clone(),
        });
        // Registered before taking the lock: the scheduler's wait registry is
        // never locked while a gatherer is.
        let resumer = future.suspend(site, then);
        let mut state = self.state.lock();
        match &mut *state {
            GatherState::Collecting(collecting) => {
                collecting.parked.push((bucket.clone(), resumer));
            }
            GatherState::Finished(frames) => {
                let frame = frames.get(bucket).cloned().unwrap_or_else(Frame::empty);
                drop(state);
                resumer.resume(frame);
            }
        }
        Ok(())
    }

    fn holders(&self) -> Vec<TaskHandle> {
        match &*self.state.lock() {
            GatherState::Collecting(collecting) => collecting
                .holders
                .values()
                .map(|(handle, _)| handle.clone())
                .collect(),
            GatherState::Finished(_) => Vec::new(),
        }
    }
}

/// A consumer parked on a bucket. Blocked by every task still holding the
/// gatherer open.
struct GatherWait {
    gatherer: Arc<ActiveGatherer>,
    bucket: Name,
    trace: Trace,
}

impl WaitSite for GatherWait {
    fn kind(&self) -> WaitKind {
        WaitKind::Gather
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn describe(&self) -> String {
        format!("gather of “{}” from frame {}", self.bucket, self.gatherer.owner)
    }

    fn blockers(&self) -> Vec<TaskHandle> {
        self.gatherer.holders()
    }
}
