//! Templates and the host-facing `resolve`/`invoke` operations.

#![allow(clippy::unwrap_used, reason = "tests unwrap scheduler construction")]

use flb_eval::host::{invoke, resolve};
use flb_eval::{
    definition_fn, Attribute, AttributeSource, Context, Definition, Frame, LookupHandler,
    Template, Value,
};
use flb_ir::{ErrorKind, Name, Trace};
use flb_sched::{Future, Outcome, Scheduler, SchedulerConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default().workers(2).max_inline_depth(4)).unwrap()
}

/// A definition producing the value at `path`, resolved in its own context.
fn lookup(path: Vec<Name>) -> Arc<dyn Definition> {
    LookupHandler::contextual().definition(path)
}

/// A definition producing `path` plus one.
fn increment(path: Vec<Name>) -> Arc<dyn Definition> {
    definition_fn(move |future, trace, context| {
        let done = future.clone();
        let trace_inner = trace.clone();
        LookupHandler::contextual().lookup(&future, trace, context, &path, move |value| {
            done.complete(Value::Int(value.as_int(&trace_inner)? + 1))
        })
    })
}

fn template(sources: &[AttributeSource]) -> Template {
    Template::new(Trace::root("template"), &Context::empty(), sources)
}

fn invoke_with(callee: Value, arguments: Vec<Value>, context: Context) -> Outcome<Value> {
    scheduler().run(move |future: Future<Value>| {
        let trace = Trace::root("host");
        let done = future.clone();
        invoke(&future, &trace, &context, &callee, arguments, move |value| {
            done.complete(value)
        })
    })
}

#[test]
fn test_resolve_reads_dotted_name() {
    let inner = Frame::from_values("inner", Trace::EMPTY, [(Name::string("b"), Value::Int(4))]);
    let outer = Frame::from_values("outer", Trace::EMPTY, [(Name::string("a"), Value::Frame(inner))]);
    let outcome = scheduler().run(move |future: Future<Value>| {
        let done = future.clone();
        resolve(
            &future,
            &Trace::root("host"),
            &Value::Frame(outer),
            &[Name::string("a"), Name::string("b")],
            move |value| done.complete(value),
        )
    });
    assert_eq!(outcome.value(), Some(&Value::Int(4)));
}

#[test]
fn test_resolve_requires_frame() {
    let outcome = scheduler().run(|future: Future<Value>| {
        let done = future.clone();
        resolve(
            &future,
            &Trace::root("host"),
            &Value::Int(1),
            &[Name::string("a")],
            move |value| done.complete(value),
        )
    });
    assert_eq!(
        outcome.errors().first().map(|error| error.kind.clone()),
        Some(ErrorKind::TypeMismatch {
            expected: "Frame".to_owned(),
            got: "Int".to_owned(),
        })
    );
}

#[test]
fn test_invoke_template_with_positional_arguments() {
    let callee = template(&[AttributeSource::from(Attribute::of(
        "value",
        increment(vec![Name::string("args"), Name::ordinal(0)]),
    ))]);
    assert!(callee.is_function_like());
    let outcome = invoke_with(Value::Template(callee), vec![Value::Int(41)], Context::empty());
    assert_eq!(outcome.value(), Some(&Value::Int(42)));
}

#[test]
fn test_invoke_arguments_replace_template_defaults() {
    let defaults = Frame::from_values("defaults", Trace::EMPTY, [(Name::ordinal(0), Value::Int(-1))]);
    let callee = template(&[AttributeSource::new()
        .with(Attribute::constant("args", Value::Frame(defaults)))
        .with(Attribute::of(
            "value",
            lookup(vec![Name::string("args"), Name::ordinal(0)]),
        ))]);
    let outcome = invoke_with(Value::Template(callee), vec![Value::Int(41)], Context::empty());
    assert_eq!(outcome.value(), Some(&Value::Int(41)));
}

#[test]
fn test_invoke_template_without_value_fails() {
    let callee = template(&[AttributeSource::from(Attribute::constant("other", 1_i64))]);
    assert!(!callee.is_function_like());
    let outcome = invoke_with(Value::Template(callee), Vec::new(), Context::empty());
    let messages: Vec<String> = outcome.errors().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec!["Template has no “value” attribute and cannot be called."]
    );
}

#[test]
fn test_invoke_lookup_handler_resolves_arguments() {
    let inner = Frame::from_values("inner", Trace::EMPTY, [(Name::string("y"), Value::from("found"))]);
    let outer = Frame::from_values("outer", Trace::EMPTY, [(Name::string("x"), Value::Frame(inner))]);
    let context = Context::empty().prepend(&outer);
    let outcome = invoke_with(
        Value::LookupHandler(LookupHandler::contextual()),
        vec![Value::from("x"), Value::from("y")],
        context,
    );
    assert_eq!(outcome.value(), Some(&Value::from("found")));
}

#[test]
fn test_invoke_rejects_other_values() {
    let outcome = invoke_with(Value::Int(3), Vec::new(), Context::empty());
    assert_eq!(
        outcome.errors().first().map(|error| error.kind.clone()),
        Some(ErrorKind::TypeMismatch {
            expected: "Template or LookupHandler".to_owned(),
            got: "Int".to_owned(),
        })
    );
}

#[test]
fn test_amended_template_overrides_and_keeps() {
    let base = template(&[AttributeSource::new()
        .with(Attribute::constant("a", 1_i64))
        .with(Attribute::of("b", lookup(vec![Name::string("a")])))]);
    let amended = base.amend(
        Trace::root("amend"),
        &Context::empty(),
        &[AttributeSource::from(Attribute::constant("a", 10_i64))],
    );
    let outcome = scheduler().run(move |future: Future<Vec<String>>| {
        let trace = Trace::root("instantiate");
        let frame = amended.instantiate(&future, &trace, &Context::empty(), &[]);
        let done = future.clone();
        frame.for_all(&future, &trace, move |entries| {
            done.complete(
                entries
                    .into_iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect(),
            )
        })
    });
    assert_eq!(outcome.value(), Some(&vec!["a=10".to_owned(), "b=10".to_owned()]));
}

#[test]
fn test_template_carries_definition_context_and_gatherers() {
    let scope = Frame::from_values("scope", Trace::EMPTY, [(Name::string("z"), Value::Int(7))]);
    let defining = Context::empty().prepend(&scope);
    let base = Template::new(
        Trace::root("template"),
        &defining,
        &[AttributeSource::from(Attribute::of("w", lookup(vec![Name::string("z")])))
            .gathering("bucket")],
    );
    assert_eq!(base.gatherers(), &[Name::string("bucket")]);
    let outcome = scheduler().run(move |future: Future<Value>| {
        let trace = Trace::root("instantiate");
        let frame = base.instantiate(&future, &trace, &Context::empty(), &[]);
        let value = frame.get(&Name::string("w")).unwrap();
        let done = future.clone();
        future.await_promise(&value, &trace, "w", move |value| done.complete(value))
    });
    assert_eq!(outcome.value(), Some(&Value::Int(7)));
}
