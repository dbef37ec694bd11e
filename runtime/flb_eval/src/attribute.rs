//! Attributes and attribute sources.
//!
//! An [`Attribute`] is a named step that yields a promise once launched in a
//! context. Sources are squashed in order before a frame or template is
//! built: a later attribute with the same name replaces the earlier one,
//! except that an override wraps it (receiving its value as input) and a
//! drop removes the name.

use crate::context::Context;
use crate::definition::{
    launch_in, CollectorDefinition, Definition, OverrideDefinition,
};
use crate::frame::{ordinals, Frame};
use crate::value::Value;
use flb_ir::{missing_override_target, required_attribute, Name, Trace};
use flb_sched::{Future, LaunchBatch, Promise};
use flb_stack::ensure_sufficient_stack;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
enum AttributeKind {
    /// An existing promise; nothing is launched.
    Value(Promise<Value>),
    Definition(Arc<dyn Definition>),
    /// `inner` is the overridden attribute, absent until squashed over one.
    Override {
        outer: Arc<dyn OverrideDefinition>,
        inner: Option<Box<AttributeKind>>,
    },
    /// A child frame that declares `bucket`, built from `subtree`; its
    /// collection is handed to `collector`.
    Gathered {
        bucket: Name,
        subtree: Arc<[AttributeSource]>,
        collector: Arc<dyn CollectorDefinition>,
    },
    Require,
    Drop,
    Private(Box<AttributeKind>),
}

impl AttributeKind {
    /// Squash `self` over `original`. `None` removes the name.
    fn over(self, original: AttributeKind) -> Option<AttributeKind> {
        // A retained drop means the name was never defined.
        let original = match original {
            AttributeKind::Drop => None,
            original => Some(Box::new(original)),
        };
        match self {
            AttributeKind::Override { outer, inner: None } => {
                Some(AttributeKind::Override { outer, inner: original })
            }
            AttributeKind::Override {
                outer,
                inner: Some(inner),
            } => {
                let inner = match original {
                    Some(original) => inner.over(*original)?,
                    None => *inner,
                };
                Some(AttributeKind::Override {
                    outer,
                    inner: Some(Box::new(inner)),
                })
            }
            AttributeKind::Private(inner) => match original {
                Some(original) => inner.over(*original),
                None => Some(*inner),
            }
            .map(|kind| AttributeKind::Private(Box::new(kind))),
            AttributeKind::Drop => None,
            // A requirement is met by whatever is already there.
            AttributeKind::Require => Some(original.map_or(AttributeKind::Require, |kind| *kind)),
            replacement => Some(replacement),
        }
    }

    fn is_public(&self) -> bool {
        match self {
            AttributeKind::Private(_) => false,
            AttributeKind::Override {
                inner: Some(inner), ..
            } => inner.is_public(),
            _ => true,
        }
    }

    fn launch(
        &self,
        name: &Name,
        batch: &mut LaunchBatch,
        trace: &Trace,
        context: &Context,
    ) -> Option<Promise<Value>> {
        match self {
            AttributeKind::Value(promise) => Some(promise.clone()),
            AttributeKind::Definition(definition) => {
                Some(launch_in(batch, definition, trace, context))
            }
            AttributeKind::Override { inner: None, .. } => {
                let (trace, name) = (trace.clone(), name.clone());
                Some(batch.launch(trace.clone(), move |_: Future<Value>| {
                    Err(missing_override_target(&trace, &name))
                }))
            }
            AttributeKind::Override {
                outer,
                inner: Some(inner),
            } => {
                let original =
                    ensure_sufficient_stack(|| inner.launch(name, batch, trace, context))?;
                let outer = Arc::clone(outer);
                let (inner_trace, context) = (trace.clone(), context.clone());
                let description = format!("overridden value of “{name}”");
                Some(batch.launch(trace.clone(), move |future: Future<Value>| {
                    let done = future.clone();
                    future.await_promise(&original, &inner_trace, description, move |value| {
                        let trace = done.trace().clone();
                        outer.invoke(done, &trace, &context, value)
                    })
                }))
            }
            AttributeKind::Gathered {
                bucket,
                subtree,
                collector,
            } => {
                let (bucket, subtree, collector) =
                    (bucket.clone(), Arc::clone(subtree), Arc::clone(collector));
                let (inner_trace, context) = (trace.clone(), context.clone());
                Some(batch.launch(trace.clone(), move |future: Future<Value>| {
                    let child = Frame::create_with(
                        &future,
                        &inner_trace,
                        &context,
                        true,
                        std::slice::from_ref(&bucket),
                        &subtree,
                    );
                    let done = future.clone();
                    child.gather(&future, &inner_trace, &bucket, move |collected| {
                        let trace = done.trace().clone();
                        collector.invoke(done, &trace, &context, collected)
                    })
                }))
            }
            AttributeKind::Require => {
                let (trace, name) = (trace.clone(), name.clone());
                Some(batch.launch(trace.clone(), move |_: Future<Value>| {
                    Err(required_attribute(&trace, &name))
                }))
            }
            AttributeKind::Drop => None,
            AttributeKind::Private(inner) => inner.launch(name, batch, trace, context),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AttributeKind::Value(_) => "value",
            AttributeKind::Definition(_) => "definition",
            AttributeKind::Override { .. } => "override",
            AttributeKind::Gathered { .. } => "gathered",
            AttributeKind::Require => "required",
            AttributeKind::Drop => "drop",
            AttributeKind::Private(inner) => inner.label(),
        }
    }
}

/// A named step of a frame or template.
#[derive(Clone)]
pub struct Attribute {
    name: Name,
    kind: AttributeKind,
}

impl Attribute {
    fn new(name: impl Into<Name>, kind: AttributeKind) -> Self {
        Attribute {
            name: name.into(),
            kind,
        }
    }

    /// A fixed value.
    pub fn constant(name: impl Into<Name>, value: impl Into<Value>) -> Self {
        Attribute::new(name, AttributeKind::Value(Promise::ready(value.into())))
    }

    /// A value produced elsewhere.
    pub fn promise(name: impl Into<Name>, promise: Promise<Value>) -> Self {
        Attribute::new(name, AttributeKind::Value(promise))
    }

    /// A value computed by `definition` when the frame is built.
    pub fn of(name: impl Into<Name>, definition: Arc<dyn Definition>) -> Self {
        Attribute::new(name, AttributeKind::Definition(definition))
    }

    /// A value computed from the attribute it overrides. Building a frame
    /// where nothing precedes it is an error.
    pub fn override_with(name: impl Into<Name>, outer: Arc<dyn OverrideDefinition>) -> Self {
        Attribute::new(name, AttributeKind::Override { outer, inner: None })
    }

    /// A child frame built from `subtree` that declares `bucket`; once every
    /// computation under it has resolved, its collection goes to `collector`.
    pub fn gathered(
        name: impl Into<Name>,
        bucket: impl Into<Name>,
        subtree: Vec<AttributeSource>,
        collector: Arc<dyn CollectorDefinition>,
    ) -> Self {
        Attribute::new(
            name,
            AttributeKind::Gathered {
                bucket: bucket.into(),
                subtree: Arc::from(subtree),
                collector,
            },
        )
    }

    /// A placeholder that must be replaced by a later source.
    pub fn require(name: impl Into<Name>) -> Self {
        Attribute::new(name, AttributeKind::Require)
    }

    /// Removes any earlier attribute of the same name.
    pub fn drop(name: impl Into<Name>) -> Self {
        Attribute::new(name, AttributeKind::Drop)
    }

    /// The same attribute, hidden from public views.
    #[must_use]
    pub fn private(self) -> Self {
        Attribute {
            name: self.name,
            kind: AttributeKind::Private(Box::new(self.kind)),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.kind.is_public()
    }

    /// True for a drop that was not squashed over anything yet.
    pub(crate) fn removes(&self) -> bool {
        matches!(self.kind, AttributeKind::Drop)
    }

    /// Start the computation. `None` for drops.
    pub(crate) fn launch(
        &self,
        batch: &mut LaunchBatch,
        trace: &Trace,
        context: &Context,
    ) -> Option<Promise<Value>> {
        self.kind.launch(&self.name, batch, trace, context)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visibility = if self.is_public() { "" } else { "private " };
        write!(f, "{visibility}{} {:?}", self.kind.label(), self.name)
    }
}

/// An ordered group of attributes, with the context and gatherer names it
/// contributes to whatever is built from it.
#[derive(Clone, Default)]
pub struct AttributeSource {
    attributes: Vec<Attribute>,
    context: Option<Context>,
    gatherers: Vec<Name>,
}

impl AttributeSource {
    pub fn new() -> Self {
        AttributeSource::default()
    }

    pub fn of(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        AttributeSource {
            attributes: attributes.into_iter().collect(),
            ..AttributeSource::default()
        }
    }

    /// Constant attributes named by ordinals from 1.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        AttributeSource::of(
            ordinals(values).map(|(name, value)| Attribute::constant(name, value)),
        )
    }

    /// Attributes taken from already computed promises.
    pub fn promises(entries: impl IntoIterator<Item = (Name, Promise<Value>)>) -> Self {
        AttributeSource::of(
            entries
                .into_iter()
                .map(|(name, promise)| Attribute::promise(name, promise)),
        )
    }

    #[must_use]
    pub fn with(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Frames built from this source also gather `bucket`.
    #[must_use]
    pub fn gathering(mut self, bucket: impl Into<Name>) -> Self {
        self.gatherers.push(bucket.into());
        self
    }

    /// Frames built from this source also search `context`, after the
    /// context they are built in.
    #[must_use]
    pub fn extending(mut self, context: Context) -> Self {
        self.context = Some(match self.context {
            Some(existing) => existing.append(&context),
            None => context,
        });
        self
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn gatherers(&self) -> &[Name] {
        &self.gatherers
    }

    pub(crate) fn extend_context(&self, context: &Context) -> Context {
        match &self.context {
            Some(extension) => context.append(extension),
            None => context.clone(),
        }
    }
}

impl fmt::Debug for AttributeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSource")
            .field("attributes", &self.attributes)
            .field("gatherers", &self.gatherers)
            .finish_non_exhaustive()
    }
}

impl From<Attribute> for AttributeSource {
    fn from(attribute: Attribute) -> Self {
        AttributeSource::of([attribute])
    }
}

/// Squash sources in order into one attribute per surviving name, sorted by
/// name.
pub(crate) fn squash<'a>(sources: impl IntoIterator<Item = &'a AttributeSource>) -> Vec<Attribute> {
    let mut squashed: BTreeMap<Name, Option<AttributeKind>> = BTreeMap::new();
    for attribute in sources.into_iter().flat_map(|source| source.attributes.iter()) {
        let kind = attribute.kind.clone();
        let entry = squashed.entry(attribute.name.clone()).or_insert(None);
        *entry = match entry.take() {
            Some(existing) => kind.over(existing),
            None => Some(kind),
        };
    }
    squashed
        .into_iter()
        .filter_map(|(name, kind)| kind.map(|kind| Attribute { name, kind }))
        .collect()
}

#[cfg(test)]
mod tests;
