#![allow(clippy::unwrap_used, reason = "tests unwrap scheduler construction")]

use super::*;
use crate::definition::{collector_fn, definition_fn, override_fn};
use crate::lookup::LookupHandler;
use flb_ir::{program_error, ErrorKind};
use flb_sched::{Outcome, Scheduler, SchedulerConfig};
use pretty_assertions::assert_eq;

type Rendered = Vec<(String, String)>;

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default().workers(2).max_inline_depth(4)).unwrap()
}

/// Build a frame from `sources` and render its public attribute values.
fn evaluate(sources: Vec<AttributeSource>) -> Outcome<Rendered> {
    scheduler().run(move |future: Future<Rendered>| {
        let trace = Trace::root("test");
        let frame = Frame::create(&future, &trace, &Context::empty(), &sources);
        let done = future.clone();
        frame.for_all(&future, &trace, move |entries| {
            done.complete(
                entries
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            )
        })
    })
}

fn pairs(expected: &[(&str, &str)]) -> Rendered {
    expected
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

fn add(amount: i64) -> Arc<dyn OverrideDefinition> {
    override_fn(move |future, trace, _, original| {
        let value = original.as_int(trace)?;
        future.complete(Value::Int(value + amount))
    })
}

#[test]
fn test_later_source_replaces_earlier() {
    let outcome = evaluate(vec![
        AttributeSource::new()
            .with(Attribute::constant("x", 1_i64))
            .with(Attribute::constant("y", 2_i64)),
        Attribute::constant("x", 3_i64).into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "3"), ("y", "2")])));
}

#[test]
fn test_override_receives_original() {
    let outcome = evaluate(vec![
        Attribute::constant("x", 1_i64).into(),
        Attribute::override_with("x", add(10)).into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "11")])));
}

#[test]
fn test_overrides_stack_in_source_order() {
    let double = override_fn(|future, trace, _, original| {
        let value = original.as_int(trace)?;
        future.complete(Value::Int(value * 2))
    });
    let outcome = evaluate(vec![
        Attribute::constant("x", 1_i64).into(),
        Attribute::override_with("x", add(10)).into(),
        Attribute::override_with("x", double).into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "22")])));
}

#[test]
fn test_override_of_absent_fails() {
    let outcome = evaluate(vec![Attribute::override_with("x", add(1)).into()]);
    let errors = outcome.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].kind,
        ErrorKind::MissingOverrideTarget {
            name: Name::string("x")
        }
    );
    let message = errors[0].to_string();
    assert!(message.contains("x"));
    assert!(message.contains("non-existent"));
}

#[test]
fn test_drop_removes_name() {
    let outcome = evaluate(vec![
        AttributeSource::new()
            .with(Attribute::constant("x", 1_i64))
            .with(Attribute::constant("y", 2_i64)),
        Attribute::drop("x").into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("y", "2")])));
}

#[test]
fn test_definition_after_drop_starts_fresh() {
    let outcome = evaluate(vec![
        Attribute::constant("x", 1_i64).into(),
        Attribute::drop("x").into(),
        Attribute::constant("x", 5_i64).into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "5")])));
}

#[test]
fn test_override_after_drop_of_undefined_fails() {
    let outcome = evaluate(vec![
        Attribute::drop("x").into(),
        Attribute::override_with("x", add(1)).into(),
    ]);
    assert_eq!(
        outcome.errors().first().map(|error| error.kind.clone()),
        Some(ErrorKind::MissingOverrideTarget {
            name: Name::string("x")
        })
    );
}

#[test]
fn test_require_after_drop_of_undefined_fails() {
    let outcome = evaluate(vec![
        Attribute::drop("x").into(),
        Attribute::require("x").into(),
    ]);
    let messages: Vec<String> = outcome.errors().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["Attribute “x” must be overridden."]);
}

#[test]
fn test_require_is_met_by_later_source() {
    let outcome = evaluate(vec![
        Attribute::require("x").into(),
        Attribute::constant("x", 5_i64).into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "5")])));
}

#[test]
fn test_require_keeps_earlier_value() {
    let outcome = evaluate(vec![
        Attribute::constant("x", 5_i64).into(),
        Attribute::require("x").into(),
    ]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "5")])));
}

#[test]
fn test_unmet_require_fails() {
    let outcome = evaluate(vec![Attribute::require("x").into()]);
    let messages: Vec<String> = outcome.errors().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["Attribute “x” must be overridden."]);
}

#[test]
fn test_private_attribute_is_squashed_private() {
    let source = AttributeSource::new()
        .with(Attribute::constant("x", 1_i64).private())
        .with(Attribute::constant("y", 2_i64));
    let overridden: AttributeSource = Attribute::override_with("x", add(1)).into();
    let squashed = squash(&[source, overridden]);
    let visibility: Vec<(String, bool)> = squashed
        .iter()
        .map(|attribute| (attribute.name().to_string(), attribute.is_public()))
        .collect();
    assert_eq!(
        visibility,
        vec![("x".to_owned(), false), ("y".to_owned(), true)]
    );
}

#[test]
fn test_private_attributes_are_not_listed() {
    let outcome = evaluate(vec![AttributeSource::new()
        .with(Attribute::constant("hidden", 1_i64).private())
        .with(Attribute::constant("shown", 2_i64))]);
    assert_eq!(outcome.value(), Some(&pairs(&[("shown", "2")])));
}

#[test]
fn test_squash_sorts_by_name() {
    let source = AttributeSource::new()
        .with(Attribute::constant("b", 1_i64))
        .with(Attribute::constant(2_i64, 2_i64))
        .with(Attribute::constant("a", 3_i64));
    let names: Vec<String> = squash([&source])
        .iter()
        .map(|attribute| attribute.name().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b", "Attribute(2)"]);
}

#[test]
fn test_list_source_uses_ordinals_from_one() {
    let source = AttributeSource::list([Value::from("p"), Value::from("q")]);
    let names: Vec<Name> = source
        .attributes()
        .iter()
        .map(|attribute| attribute.name().clone())
        .collect();
    assert_eq!(names, vec![Name::ordinal(1), Name::ordinal(2)]);
}

#[test]
fn test_definition_resolves_names_in_frame() {
    let lookup_x = definition_fn(|future, trace, context| {
        let done = future.clone();
        LookupHandler::contextual().lookup(
            &future,
            trace,
            context,
            &[Name::string("x")],
            move |value| done.complete(value),
        )
    });
    let outcome = evaluate(vec![AttributeSource::new()
        .with(Attribute::constant("x", 7_i64))
        .with(Attribute::of("y", lookup_x))]);
    assert_eq!(outcome.value(), Some(&pairs(&[("x", "7"), ("y", "7")])));
}

#[test]
fn test_gathered_attribute_collects_subtree() {
    let contribute = definition_fn(|future, trace, context| {
        let Some(frame) = context.self_frame() else {
            return Err(program_error(trace, "no self frame"));
        };
        frame.disperse(trace, &Name::string("g"), &Value::Int(1))?;
        future.complete(Value::Null)
    });
    let count = collector_fn(|future, _, _, collected| {
        future.complete(Value::Int(i64::try_from(collected.len()).unwrap()))
    });
    let subtree = vec![AttributeSource::new()
        .with(Attribute::of("a", Arc::clone(&contribute)))
        .with(Attribute::of("b", Arc::clone(&contribute)))
        .with(Attribute::of("c", contribute))];
    let outcome = evaluate(vec![Attribute::gathered("total", "g", subtree, count).into()]);
    assert_eq!(outcome.value(), Some(&pairs(&[("total", "3")])));
}
