//! Frames.
//!
//! A [`Frame`] is an immutable map from [`Name`] to attribute promises,
//! together with the context it was built in and the frame that contains it.
//! Attributes are launched when the frame is created and are visible to each
//! other immediately, so construction never waits on them.
//!
//! Frames are reference counted and attribute values may refer back to the
//! frame that holds them. Such cycles are never broken; a frame lives as long
//! as the run that built it.

use crate::attribute::{squash, AttributeSource};
use crate::context::Context;
use crate::gatherer::{Gatherer, Offer};
use crate::value::Value;
use flb_ir::{illegal_dispersion, DispersionFault, EvalError, Name, Trace};
use flb_sched::{Flow, Future, Promise, TaskHandle};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
struct Slot {
    promise: Promise<Value>,
    public: bool,
}

struct FrameInner {
    id: Arc<str>,
    trace: Trace,
    /// Context the frame was built in, sources' extensions included.
    inherited: Context,
    /// Whether the frame is the dynamic self of its own context.
    self_is_this: bool,
    container: Option<Frame>,
    /// Set once, before any attribute computation can observe the frame.
    attributes: OnceLock<BTreeMap<Name, Slot>>,
    gatherer: Gatherer,
}

/// Shared handle to a frame. Equality is identity.
#[derive(Clone)]
pub struct Frame(Arc<FrameInner>);

/// Attach 1-based ordinal names to `values`.
pub(crate) fn ordinals<I>(values: I) -> impl Iterator<Item = (Name, Value)>
where
    I: IntoIterator<Item = Value>,
{
    (1_i64..).zip(values).map(|(ordinal, value)| (Name::ordinal(ordinal), value))
}

impl Frame {
    fn assemble(
        id: Arc<str>,
        trace: Trace,
        inherited: Context,
        self_is_this: bool,
        gatherer: Gatherer,
    ) -> Frame {
        let container = inherited.self_frame().cloned();
        Frame(Arc::new(FrameInner {
            id,
            trace,
            inherited,
            self_is_this,
            container,
            attributes: OnceLock::new(),
            gatherer,
        }))
    }

    /// A frame of already known values. It cannot gather.
    fn sealed(
        id: Arc<str>,
        trace: Trace,
        context: Context,
        entries: impl IntoIterator<Item = (Name, Promise<Value>)>,
    ) -> Frame {
        let frame = Frame::assemble(id, trace, context, true, Gatherer::Illegal);
        let slots = entries
            .into_iter()
            .map(|(name, promise)| (name, Slot { promise, public: true }))
            .collect();
        // Freshly assembled, so the cell is empty.
        let _ = frame.0.attributes.set(slots);
        frame
    }

    /// The frame with no attributes.
    pub fn empty() -> Frame {
        static EMPTY: OnceLock<Frame> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Frame::sealed(Arc::from("empty"), Trace::EMPTY, Context::empty(), [])
            })
            .clone()
    }

    /// A frame of fixed values.
    pub fn from_values(
        id: impl Into<String>,
        trace: Trace,
        entries: impl IntoIterator<Item = (Name, Value)>,
    ) -> Frame {
        Frame::sealed(
            Arc::from(id.into()),
            trace,
            Context::empty(),
            entries
                .into_iter()
                .map(|(name, value)| (name, Promise::ready(value))),
        )
    }

    /// A frame of fixed values named by ordinals from 1.
    pub fn list(id: impl Into<String>, trace: Trace, values: impl IntoIterator<Item = Value>) -> Frame {
        Frame::from_values(id, trace, ordinals(values))
    }

    /// The integers `start..=end` as a list frame; empty when `end < start`.
    pub fn through<T>(future: &Future<T>, trace: &Trace, start: i64, end: i64, context: &Context) -> Frame {
        let id: Arc<str> = Arc::from(format!("f{:019}", future.next_id()));
        let values = (start..=end).map(Value::Int);
        Frame::sealed(
            id,
            trace.clone(),
            context.clone(),
            ordinals(values).map(|(name, value)| (name, Promise::ready(value))),
        )
    }

    /// Build a frame in `context` from `sources`, as its own dynamic self.
    pub fn create<T>(
        future: &Future<T>,
        trace: &Trace,
        context: &Context,
        sources: &[AttributeSource],
    ) -> Frame {
        Frame::create_with(future, trace, context, true, &[], sources)
    }

    /// Build a frame, launching its attributes as children of `future`.
    ///
    /// With `self_is_this` unset the frame is searched privately by its own
    /// attributes but the dynamic self stays the enclosing one. The frame
    /// gathers `gatherers` plus every name the sources declare. The gatherer
    /// stays open until construction and every attribute computation
    /// launched here have finished; the same holds for every gatherer up
    /// the container chain.
    #[tracing::instrument(level = "debug", skip_all, fields(sources = sources.len()))]
    pub fn create_with<T>(
        future: &Future<T>,
        trace: &Trace,
        context: &Context,
        self_is_this: bool,
        gatherers: &[Name],
        sources: &[AttributeSource],
    ) -> Frame {
        let inherited = sources
            .iter()
            .fold(context.clone(), |context, source| source.extend_context(&context));
        let id: Arc<str> = Arc::from(format!("f{:019}", future.next_id()));
        let buckets: BTreeSet<Name> = gatherers
            .iter()
            .chain(sources.iter().flat_map(AttributeSource::gatherers))
            .cloned()
            .collect();
        let gatherer = Gatherer::new(Arc::clone(&id), trace.clone(), buckets);
        let frame = Frame::assemble(id, trace.clone(), inherited, self_is_this, gatherer);
        let own = frame.context();

        frame.acquire_gatherers(None);
        let mut batch = future.batch();
        let mut slots = BTreeMap::new();
        let mut pending = Vec::new();
        for attribute in squash(sources) {
            if let Some(promise) = attribute.launch(&mut batch, trace, &own) {
                if !promise.is_resolved() {
                    pending.push(promise.clone());
                }
                let public = attribute.is_public();
                slots.insert(attribute.name().clone(), Slot { promise, public });
            }
        }
        let _ = frame.0.attributes.set(slots);
        for promise in pending {
            let holder = promise.task();
            frame.acquire_gatherers(holder.as_ref());
            let owner = frame.clone();
            let holder = holder.as_ref().map(TaskHandle::id);
            promise.when_resolved(move |_| owner.release_gatherers(holder));
        }
        tracing::debug!(frame = %frame.id(), tasks = batch.len(), "frame created");
        batch.execute();
        frame.release_gatherers(None);
        frame
    }

    fn chain(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(Some(self), |&frame| frame.0.container.as_ref())
    }

    fn acquire_gatherers(&self, holder: Option<&TaskHandle>) {
        for frame in self.chain() {
            frame.0.gatherer.acquire(holder);
        }
    }

    fn release_gatherers(&self, holder: Option<u64>) {
        for frame in self.chain() {
            frame.0.gatherer.release(holder);
        }
    }

    fn slots(&self) -> Option<&BTreeMap<Name, Slot>> {
        self.0.attributes.get()
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn trace(&self) -> &Trace {
        &self.0.trace
    }

    /// The frame whose gatherers this frame's dispersals reach.
    pub fn container(&self) -> Option<&Frame> {
        self.0.container.as_ref()
    }

    /// What the frame's own attributes resolve names against.
    pub fn context(&self) -> Context {
        if self.0.self_is_this {
            self.0.inherited.prepend_private(self)
        } else {
            self.0.inherited.prepend_hidden(self)
        }
    }

    /// A public attribute.
    pub fn get(&self, name: &Name) -> Option<Promise<Value>> {
        self.slots()?
            .get(name)
            .filter(|slot| slot.public)
            .map(|slot| slot.promise.clone())
    }

    /// Any attribute, private ones included.
    pub fn get_private(&self, name: &Name) -> Option<Promise<Value>> {
        self.slots()?.get(name).map(|slot| slot.promise.clone())
    }

    pub fn has(&self, name: &Name) -> bool {
        self.get(name).is_some()
    }

    /// Public names in frame order.
    pub fn names(&self) -> Vec<Name> {
        self.entries().map(|(name, _)| name).collect()
    }

    /// Every name in frame order, private ones included.
    pub fn all_names(&self) -> Vec<Name> {
        self.slots()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Public attributes in frame order.
    pub fn entries(&self) -> impl Iterator<Item = (Name, Promise<Value>)> + '_ {
        self.slots()
            .into_iter()
            .flatten()
            .filter(|(_, slot)| slot.public)
            .map(|(name, slot)| (name.clone(), slot.promise.clone()))
    }

    /// Number of public attributes.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buckets this frame gathers.
    pub fn gatherers(&self) -> Vec<Name> {
        self.0.gatherer.names()
    }

    /// Contribute `value` to the nearest frame on the container chain that
    /// gathers `bucket`.
    pub fn disperse(&self, trace: &Trace, bucket: &Name, value: &Value) -> Result<(), EvalError> {
        for frame in self.chain() {
            if let Offer::Taken = frame.0.gatherer.offer(trace, bucket, value)? {
                tracing::trace!(frame = %frame.id(), %bucket, "dispersed");
                return Ok(());
            }
        }
        Err(illegal_dispersion(trace, bucket, DispersionFault::Undeclared))
    }

    /// Suspend until this frame's `bucket` is complete and hand its values to
    /// `then` as a list frame. Only this frame's own declarations count.
    pub fn gather<T>(
        &self,
        future: &Future<T>,
        trace: &Trace,
        bucket: &Name,
        then: impl FnOnce(Frame) -> Flow + Send + 'static,
    ) -> Flow {
        self.0.gatherer.gather(future, trace, bucket, then)
    }

    /// Await every public attribute and hand the values to `then` in frame
    /// order.
    pub fn for_all<T>(
        &self,
        future: &Future<T>,
        trace: &Trace,
        then: impl FnOnce(Vec<(Name, Value)>) -> Flow + Send + 'static,
    ) -> Flow {
        let entries: Vec<(Name, Promise<Value>)> = self.entries().collect();
        if entries.is_empty() {
            return then(Vec::new());
        }
        let names: Vec<Name> = entries.iter().map(|(name, _)| name.clone()).collect();
        let collector = Arc::new(Collect {
            values: Mutex::new((vec![None; names.len()], names.len())),
            names,
            then: Mutex::new(Some(Box::new(then))),
        });
        for (index, (name, promise)) in entries.into_iter().enumerate() {
            let collector = Arc::clone(&collector);
            let description = format!("value of “{name}” in frame {}", self.id());
            future.await_promise(&promise, trace, description, move |value| {
                collector.fill(index, value)
            })?;
        }
        Ok(())
    }
}

type CollectThen = Box<dyn FnOnce(Vec<(Name, Value)>) -> Flow + Send>;

struct Collect {
    names: Vec<Name>,
    /// Values by position and how many are still missing.
    values: Mutex<(Vec<Option<Value>>, usize)>,
    then: Mutex<Option<CollectThen>>,
}

impl Collect {
    fn fill(&self, index: usize, value: Value) -> Flow {
        let values = {
            let mut state = self.values.lock();
            let (values, missing) = &mut *state;
            if let Some(slot) = values.get_mut(index) {
                *slot = Some(value);
            }
            *missing -= 1;
            if *missing > 0 {
                return Ok(());
            }
            std::mem::take(values)
        };
        let Some(then) = self.then.lock().take() else {
            return Ok(());
        };
        let entries = self
            .names
            .iter()
            .cloned()
            .zip(values.into_iter().flatten())
            .collect();
        then(entries)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0.id)
    }
}

impl From<&Frame> for AttributeSource {
    /// The frame's public attributes, as already computed promises.
    fn from(frame: &Frame) -> Self {
        AttributeSource::promises(frame.entries())
    }
}

#[cfg(test)]
mod tests;
