//! Templates: unevaluated frame recipes.
//!
//! A template captures squashed attributes, the context it was defined in
//! and the buckets its instances gather. It can be instantiated into a frame,
//! amended into a new template, or used as an attribute source for either.

use crate::attribute::{squash, Attribute, AttributeSource};
use crate::context::Context;
use crate::frame::Frame;
use crate::value::Value;
use flb_ir::{program_error, EvalError, Name, Trace};
use flb_sched::{Future, Promise};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

struct TemplateInner {
    trace: Trace,
    context: Context,
    gatherers: Vec<Name>,
    attributes: Vec<Attribute>,
}

/// Shared handle to a template. Equality is identity.
#[derive(Clone)]
pub struct Template(Arc<TemplateInner>);

impl Template {
    pub fn new(trace: Trace, context: &Context, sources: &[AttributeSource]) -> Template {
        let context = sources
            .iter()
            .fold(context.clone(), |context, source| source.extend_context(&context));
        let gatherers: BTreeSet<Name> = sources
            .iter()
            .flat_map(AttributeSource::gatherers)
            .cloned()
            .collect();
        Template(Arc::new(TemplateInner {
            trace,
            context,
            gatherers: gatherers.into_iter().collect(),
            attributes: squash(sources),
        }))
    }

    /// A new template with `sources` layered over this one.
    pub fn amend(&self, trace: Trace, context: &Context, sources: &[AttributeSource]) -> Template {
        let mut layered = Vec::with_capacity(sources.len() + 1);
        layered.push(self.source());
        layered.extend_from_slice(sources);
        Template::new(trace, context, &layered)
    }

    /// Build a frame from this template, with `sources` layered over it.
    pub fn instantiate<T>(
        &self,
        future: &Future<T>,
        trace: &Trace,
        context: &Context,
        sources: &[AttributeSource],
    ) -> Frame {
        let mut layered = Vec::with_capacity(sources.len() + 1);
        layered.push(self.source());
        layered.extend_from_slice(sources);
        Frame::create(future, trace, context, &layered)
    }

    /// Instantiate as a function and return the promise of its `value`
    /// attribute. `arguments` are layered last so they replace any defaults
    /// the template declares; the frame is not its own dynamic self.
    pub(crate) fn call<T>(
        &self,
        future: &Future<T>,
        trace: &Trace,
        context: &Context,
        arguments: AttributeSource,
    ) -> Result<Promise<Value>, EvalError> {
        let frame =
            Frame::create_with(future, trace, context, false, &[], &[self.source(), arguments]);
        frame.get(&Name::string("value")).ok_or_else(|| {
            program_error(trace, "Template has no “value” attribute and cannot be called.")
        })
    }

    /// The template as an attribute source: its attributes, its gatherers,
    /// and its definition context appended to whatever it is used in.
    pub fn source(&self) -> AttributeSource {
        let source = AttributeSource::of(self.0.attributes.iter().cloned())
            .extending(self.0.context.clone());
        self.0
            .gatherers
            .iter()
            .cloned()
            .fold(source, |source, bucket| source.gathering(bucket))
    }

    pub fn trace(&self) -> &Trace {
        &self.0.trace
    }

    pub fn context(&self) -> &Context {
        &self.0.context
    }

    pub fn gatherers(&self) -> &[Name] {
        &self.0.gatherers
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.0.attributes
    }

    /// True when instances produce a `value` attribute.
    pub fn is_function_like(&self) -> bool {
        let value = Name::string("value");
        self.0
            .attributes
            .iter()
            .any(|attribute| {
                *attribute.name() == value && attribute.is_public() && !attribute.removes()
            })
    }

    pub fn same(&self, other: &Template) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("attributes", &self.0.attributes)
            .field("gatherers", &self.0.gatherers)
            .finish_non_exhaustive()
    }
}

impl From<&Template> for AttributeSource {
    fn from(template: &Template) -> Self {
        template.source()
    }
}
