//! Computation contracts consumed from the compiler.
//!
//! A compiled program is a tree of definitions. Each one is handed a fresh
//! [`Future`] for the value it must produce, the caller's [`Trace`], and the
//! [`Context`] its names resolve against. It either completes the future,
//! records an error, or suspends and returns; it never blocks.
//!
//! Closures with the right shape implement the traits directly. Prefer the
//! `*_fn` constructors when passing closures, so their argument types are
//! inferred.

use crate::context::Context;
use crate::frame::Frame;
use crate::value::Value;
use flb_ir::{program_error, Trace};
use flb_sched::{Flow, Future, LaunchBatch, Outcome, Promise, Scheduler};
use std::sync::Arc;

/// Computes an attribute value.
pub trait Definition: Send + Sync {
    fn invoke(&self, future: Future<Value>, trace: &Trace, context: &Context) -> Flow;
}

/// Computes an attribute value from the value it overrides.
pub trait OverrideDefinition: Send + Sync {
    fn invoke(&self, future: Future<Value>, trace: &Trace, context: &Context, original: Value)
        -> Flow;
}

/// Computes an attribute value from a gathered collection.
pub trait CollectorDefinition: Send + Sync {
    fn invoke(&self, future: Future<Value>, trace: &Trace, context: &Context, collected: Frame)
        -> Flow;
}

/// Entry point of a program: no context exists yet.
pub trait RootDefinition: Send + Sync {
    fn invoke(&self, future: Future<Value>, trace: &Trace) -> Flow;
}

impl<F> Definition for F
where
    F: Fn(Future<Value>, &Trace, &Context) -> Flow + Send + Sync,
{
    fn invoke(&self, future: Future<Value>, trace: &Trace, context: &Context) -> Flow {
        self(future, trace, context)
    }
}

impl<F> OverrideDefinition for F
where
    F: Fn(Future<Value>, &Trace, &Context, Value) -> Flow + Send + Sync,
{
    fn invoke(
        &self,
        future: Future<Value>,
        trace: &Trace,
        context: &Context,
        original: Value,
    ) -> Flow {
        self(future, trace, context, original)
    }
}

impl<F> CollectorDefinition for F
where
    F: Fn(Future<Value>, &Trace, &Context, Frame) -> Flow + Send + Sync,
{
    fn invoke(
        &self,
        future: Future<Value>,
        trace: &Trace,
        context: &Context,
        collected: Frame,
    ) -> Flow {
        self(future, trace, context, collected)
    }
}

impl<F> RootDefinition for F
where
    F: Fn(Future<Value>, &Trace) -> Flow + Send + Sync,
{
    fn invoke(&self, future: Future<Value>, trace: &Trace) -> Flow {
        self(future, trace)
    }
}

pub fn definition_fn<F>(f: F) -> Arc<dyn Definition>
where
    F: Fn(Future<Value>, &Trace, &Context) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn override_fn<F>(f: F) -> Arc<dyn OverrideDefinition>
where
    F: Fn(Future<Value>, &Trace, &Context, Value) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn collector_fn<F>(f: F) -> Arc<dyn CollectorDefinition>
where
    F: Fn(Future<Value>, &Trace, &Context, Frame) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A definition that always produces `value`.
pub fn constant(value: Value) -> Arc<dyn Definition> {
    definition_fn(move |future, _, _| future.complete(value.clone()))
}

/// A definition that always raises a program error.
pub fn fail(message: impl Into<String>) -> Arc<dyn Definition> {
    let message: Arc<str> = Arc::from(message.into());
    definition_fn(move |_, trace, _| Err(program_error(trace, &*message)))
}

/// Launch `definition` as a child of `future`.
pub fn launch<T>(
    future: &Future<T>,
    definition: &Arc<dyn Definition>,
    trace: &Trace,
    context: &Context,
) -> Promise<Value> {
    let definition = Arc::clone(definition);
    let (inner, context) = (trace.clone(), context.clone());
    future.launch(trace.clone(), move |future: Future<Value>| {
        definition.invoke(future, &inner, &context)
    })
}

/// Queue `definition` on a launch batch.
pub(crate) fn launch_in(
    batch: &mut LaunchBatch,
    definition: &Arc<dyn Definition>,
    trace: &Trace,
    context: &Context,
) -> Promise<Value> {
    let definition = Arc::clone(definition);
    let (inner, context) = (trace.clone(), context.clone());
    batch.launch(trace.clone(), move |future: Future<Value>| {
        definition.invoke(future, &inner, &context)
    })
}

/// Run a program on `scheduler`.
pub fn evaluate(scheduler: &Scheduler, root: Arc<dyn RootDefinition>) -> Outcome<Value> {
    scheduler.run(move |future: Future<Value>| {
        let trace = future.trace().clone();
        root.invoke(future, &trace)
    })
}
