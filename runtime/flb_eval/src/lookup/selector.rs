//! Built-in selectors.

use super::{selector_fn, LookupEnv, LookupSelector, Select, SelectorFactory};
use crate::attribute::{Attribute, AttributeSource};
use crate::context::Context;
use crate::frame::Frame;
use crate::template::Template;
use crate::value::Value;
use flb_ir::{type_mismatch, EvalError, Name};
use flb_sched::Promise;
use std::collections::BTreeMap;
use std::sync::Arc;

struct First;

impl LookupSelector for First {
    fn accept(&mut self, value: Value) -> Select {
        Select::Finish(value)
    }

    fn empty(&mut self) -> Select {
        Select::Fail
    }
}

/// The first value found; an unresolved name if there is none.
pub fn first() -> Arc<dyn SelectorFactory> {
    selector_fn("first", |_| Box::new(First))
}

struct Exists;

impl LookupSelector for Exists {
    fn accept(&mut self, _: Value) -> Select {
        Select::Finish(Value::Bool(true))
    }

    fn empty(&mut self) -> Select {
        Select::Finish(Value::Bool(false))
    }
}

/// Whether anything was found.
pub fn exists() -> Arc<dyn SelectorFactory> {
    selector_fn("exists", |_| Box::new(Exists))
}

struct All {
    env: LookupEnv,
    items: Vec<Value>,
}

impl LookupSelector for All {
    fn accept(&mut self, value: Value) -> Select {
        self.items.push(value);
        Select::Next
    }

    fn empty(&mut self) -> Select {
        let items = std::mem::take(&mut self.items);
        let frame = Frame::create(
            self.env.future(),
            self.env.trace(),
            self.env.context(),
            &[AttributeSource::list(items)],
        );
        Select::Finish(Value::Frame(frame))
    }
}

/// Every value found, as a list frame in discovery order.
pub fn all() -> Arc<dyn SelectorFactory> {
    selector_fn("all", |env| {
        Box::new(All {
            env: env.clone(),
            items: Vec::new(),
        })
    })
}

struct Merging {
    env: LookupEnv,
    composite: BTreeMap<Name, Promise<Value>>,
}

impl LookupSelector for Merging {
    fn accept(&mut self, value: Value) -> Select {
        let Value::Frame(frame) = value else {
            return Select::Error(type_mismatch(self.env.trace(), "Frame", value.type_name()));
        };
        let accessor = self.env.context().accessor(&frame);
        for name in accessor.names() {
            if self.composite.contains_key(&name) {
                continue;
            }
            if let Some(promise) = accessor.get(&name) {
                self.composite.insert(name, promise);
            }
        }
        Select::Next
    }

    fn empty(&mut self) -> Select {
        let composite = std::mem::take(&mut self.composite);
        let frame = Frame::create(
            self.env.future(),
            self.env.trace(),
            self.env.context(),
            &[AttributeSource::promises(composite)],
        );
        Select::Finish(Value::Frame(frame))
    }
}

/// Every frame found, merged into one; earlier frames win on shared names.
pub fn merging() -> Arc<dyn SelectorFactory> {
    selector_fn("merging", |env| {
        Box::new(Merging {
            env: env.clone(),
            composite: BTreeMap::new(),
        })
    })
}

/// Call a function-like template with `args` bound to `argument`.
fn call(env: &LookupEnv, template: &Template, argument: Value) -> Result<Promise<Value>, EvalError> {
    let trace = env
        .trace()
        .special_junction("instantiate template inside lookup handler", template.trace());
    template.call(
        env.future(),
        &trace,
        &Context::empty(),
        AttributeSource::from(Attribute::constant("args", argument)),
    )
}

/// Ask `template` whether to keep `argument`; `keep` and `reject` decide
/// what each answer means.
fn decide(
    env: &LookupEnv,
    template: &Template,
    argument: Value,
    keep: impl FnOnce() -> Select + Send + 'static,
    reject: impl FnOnce() -> Select + Send + 'static,
) -> Select {
    let trace = env.trace().clone();
    match call(env, template, argument) {
        Ok(promise) => Select::then(promise, move |answer| match answer {
            Value::Bool(true) => keep(),
            Value::Bool(false) => reject(),
            other => Select::Error(type_mismatch(&trace, "Bool", other.type_name())),
        }),
        Err(error) => Select::Error(error),
    }
}

struct Filter {
    env: LookupEnv,
    template: Template,
    inner: Box<dyn LookupSelector>,
}

impl LookupSelector for Filter {
    fn accept(&mut self, value: Value) -> Select {
        let (env, template) = (self.env.clone(), self.template.clone());
        self.inner.accept(value.clone()).and_then(move |result| {
            decide(&env, &template, value, || Select::Finish(result), || Select::Next)
        })
    }

    fn empty(&mut self) -> Select {
        let (env, template) = (self.env.clone(), self.template.clone());
        self.inner.empty().and_then(move |value| {
            let kept = value.clone();
            decide(
                &env,
                &template,
                value,
                || Select::Finish(kept),
                || Select::Finish(Value::Null),
            )
        })
    }
}

/// Run `inner`, then keep each value it would finish with only if
/// `template` (given `args`) produces `True`.
pub fn filter(template: Template, inner: Arc<dyn SelectorFactory>) -> Arc<dyn SelectorFactory> {
    let description = format!("{} then filtering by template", inner.description());
    selector_fn(description, move |env| {
        Box::new(Filter {
            env: env.clone(),
            template: template.clone(),
            inner: inner.start(env),
        })
    })
}

struct Map {
    env: LookupEnv,
    template: Template,
    inner: Box<dyn LookupSelector>,
}

impl Map {
    fn transform(env: LookupEnv, template: Template, argument: Value) -> Select {
        match call(&env, &template, argument) {
            Ok(promise) => Select::then(promise, Select::Finish),
            Err(error) => Select::Error(error),
        }
    }
}

impl LookupSelector for Map {
    fn accept(&mut self, value: Value) -> Select {
        let (env, template) = (self.env.clone(), self.template.clone());
        self.inner
            .accept(value.clone())
            .and_then(move |_| Map::transform(env, template, value))
    }

    fn empty(&mut self) -> Select {
        let (env, template) = (self.env.clone(), self.template.clone());
        self.inner
            .empty()
            .and_then(move |value| Map::transform(env, template, value))
    }
}

/// Run `inner`, then replace the finishing value with what `template`
/// (given `args`) produces.
pub fn map(template: Template, inner: Arc<dyn SelectorFactory>) -> Arc<dyn SelectorFactory> {
    let description = format!("{} then calling template", inner.description());
    selector_fn(description, move |env| {
        Box::new(Map {
            env: env.clone(),
            template: template.clone(),
            inner: inner.start(env),
        })
    })
}

struct OrElse {
    inner: Box<dyn LookupSelector>,
    default: Value,
}

impl LookupSelector for OrElse {
    fn accept(&mut self, value: Value) -> Select {
        self.inner.accept(value)
    }

    fn empty(&mut self) -> Select {
        let default = self.default.clone();
        self.inner.empty().or_else(move || Select::Finish(default))
    }
}

/// `inner`, with `default` instead of a failure.
pub fn or_else(inner: Arc<dyn SelectorFactory>, default: Value) -> Arc<dyn SelectorFactory> {
    let description = format!("{} or default value", inner.description());
    selector_fn(description, move |env| {
        Box::new(OrElse {
            inner: inner.start(env),
            default: default.clone(),
        })
    })
}

struct OrElseCompute {
    env: LookupEnv,
    template: Template,
    inner: Box<dyn LookupSelector>,
}

impl LookupSelector for OrElseCompute {
    fn accept(&mut self, value: Value) -> Select {
        self.inner.accept(value)
    }

    fn empty(&mut self) -> Select {
        let (env, template) = (self.env.clone(), self.template.clone());
        self.inner.empty().or_else(move || {
            let trace = env
                .trace()
                .special_junction("instantiate template inside lookup selector", template.trace());
            let frame = template.instantiate(env.future(), &trace, env.context(), &[]);
            match frame.get(&Name::string("value")) {
                Some(promise) => Select::then(promise, Select::Finish),
                None => Select::Fail,
            }
        })
    }
}

/// `inner`, with the `value` of an instance of `template` instead of a
/// failure.
pub fn or_else_compute(
    inner: Arc<dyn SelectorFactory>,
    template: Template,
) -> Arc<dyn SelectorFactory> {
    let description = format!("{} or default value from template", inner.description());
    selector_fn(description, move |env| {
        Box::new(OrElseCompute {
            env: env.clone(),
            template: template.clone(),
            inner: inner.start(env),
        })
    })
}
