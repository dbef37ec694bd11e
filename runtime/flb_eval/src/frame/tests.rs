#![allow(clippy::unwrap_used, reason = "tests unwrap scheduler construction")]

use super::*;
use crate::attribute::Attribute;
use crate::definition::definition_fn;
use flb_ir::{program_error, ErrorKind};
use flb_sched::{Outcome, Scheduler, SchedulerConfig};
use pretty_assertions::assert_eq;

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default().workers(2).max_inline_depth(4)).unwrap()
}

fn run<T>(root: impl FnOnce(Future<T>, Trace) -> Flow + Send + 'static) -> Outcome<T>
where
    T: Clone + Send + Sync + 'static,
{
    scheduler().run(move |future: Future<T>| root(future, Trace::root("test")))
}

fn names(names: &[Name]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[test]
fn test_public_names_are_subset_of_all_names() {
    let outcome = run(|future: Future<(Vec<String>, Vec<String>)>, trace| {
        let source = AttributeSource::new()
            .with(Attribute::constant("a", 1_i64))
            .with(Attribute::constant("b", 2_i64).private())
            .with(Attribute::constant("c", 3_i64));
        let frame = Frame::create(&future, &trace, &Context::empty(), &[source]);
        future.complete((names(&frame.names()), names(&frame.all_names())))
    });
    let (public, all) = outcome.value().cloned().unwrap();
    assert_eq!(public, vec!["a", "c"]);
    assert_eq!(all, vec!["a", "b", "c"]);
    assert!(public.iter().all(|name| all.contains(name)));
}

#[test]
fn test_get_hides_private_attributes() {
    let outcome = run(|future: Future<(bool, bool, bool)>, trace| {
        let source = AttributeSource::from(Attribute::constant("secret", 1_i64).private());
        let frame = Frame::create(&future, &trace, &Context::empty(), &[source]);
        let name = Name::string("secret");
        future.complete((
            frame.get(&name).is_some(),
            frame.get_private(&name).is_some(),
            frame.has(&name),
        ))
    });
    assert_eq!(outcome.value(), Some(&(false, true, false)));
}

#[test]
fn test_created_ids_are_zero_padded_serials() {
    let outcome = run(|future: Future<(String, String)>, trace| {
        let first = Frame::create(&future, &trace, &Context::empty(), &[]);
        let second = Frame::create(&future, &trace, &Context::empty(), &[]);
        future.complete((first.id().to_owned(), second.id().to_owned()))
    });
    let (first, second) = outcome.value().cloned().unwrap();
    assert_eq!(first.len(), 20);
    assert!(first.starts_with('f'));
    assert_ne!(first, second);
}

#[test]
fn test_value_frames_never_gather() {
    let frame = Frame::from_values("fixed", Trace::EMPTY, [(Name::string("x"), Value::Null)]);
    let error = frame
        .disperse(&Trace::EMPTY, &Name::string("g"), &Value::Null)
        .unwrap_err();
    assert_eq!(
        error.kind,
        ErrorKind::IllegalDispersion {
            bucket: Name::string("g"),
            fault: DispersionFault::NeverGathers,
        }
    );
}

#[test]
fn test_list_and_empty() {
    let list = Frame::list("list", Trace::EMPTY, [Value::from("a"), Value::from("b")]);
    assert_eq!(names(&list.names()), vec!["Attribute(1)", "Attribute(2)"]);
    assert_eq!(list.len(), 2);
    assert!(Frame::empty().is_empty());
    assert_eq!(Frame::empty(), Frame::empty());
}

#[test]
fn test_through_builds_inclusive_range() {
    let outcome = run(|future: Future<Vec<(String, String)>>, trace| {
        let frame = Frame::through(&future, &trace, 3, 5, &Context::empty());
        let empty = Frame::through(&future, &trace, 5, 3, &Context::empty());
        assert!(empty.is_empty());
        let done = future.clone();
        frame.for_all(&future, &trace, move |entries| {
            done.complete(
                entries
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            )
        })
    });
    let expected: Vec<(String, String)> = (1..=3)
        .map(|ordinal| (format!("Attribute({ordinal})"), (ordinal + 2).to_string()))
        .collect();
    assert_eq!(outcome.value(), Some(&expected));
}

#[test]
fn test_for_all_on_empty_frame_runs_immediately() {
    let outcome = run(|future: Future<usize>, trace| {
        let frame = Frame::create(&future, &trace, &Context::empty(), &[]);
        let done = future.clone();
        frame.for_all(&future, &trace, move |entries| done.complete(entries.len()))
    });
    assert_eq!(outcome.value(), Some(&0));
}

#[test]
fn test_disperse_without_gatherer_is_undeclared() {
    let outcome = run(|future: Future<String>, trace| {
        let frame = Frame::create(&future, &trace, &Context::empty(), &[]);
        let error = frame
            .disperse(&trace, &Name::string("g"), &Value::Null)
            .err()
            .map(|error| error.to_string())
            .unwrap_or_default();
        future.complete(error)
    });
    let message = outcome.value().cloned().unwrap();
    assert!(message.contains("illegal cross-frame dispersion"));
}

#[test]
fn test_disperse_after_finish_is_inactive() {
    let outcome = run(|future: Future<bool>, trace| {
        // Nothing holds the gatherer open, so it finishes during construction.
        let source = AttributeSource::new().gathering("g");
        let frame = Frame::create(&future, &trace, &Context::empty(), &[source]);
        let inactive = matches!(
            frame.disperse(&trace, &Name::string("g"), &Value::Null),
            Err(EvalError {
                kind: ErrorKind::IllegalDispersion {
                    fault: DispersionFault::Inactive,
                    ..
                },
                ..
            })
        );
        future.complete(inactive)
    });
    assert_eq!(outcome.value(), Some(&true));
}

#[test]
fn test_gather_after_finish_runs_immediately() {
    let outcome = run(|future: Future<usize>, trace| {
        let source = AttributeSource::new().gathering("g");
        let frame = Frame::create(&future, &trace, &Context::empty(), &[source]);
        let done = future.clone();
        frame.gather(&future, &trace, &Name::string("g"), move |collected| {
            done.complete(collected.len())
        })
    });
    assert_eq!(outcome.value(), Some(&0));
}

#[test]
fn test_gather_of_undeclared_bucket_fails() {
    let outcome = run(|future: Future<usize>, trace| {
        let frame = Frame::create(&future, &trace, &Context::empty(), &[]);
        let done = future.clone();
        frame.gather(&future, &trace, &Name::string("g"), move |collected| {
            done.complete(collected.len())
        })
    });
    assert_eq!(
        outcome.errors().first().map(|error| error.kind.clone()),
        Some(ErrorKind::NotGathered {
            bucket: Name::string("g")
        })
    );
}

#[test]
fn test_nested_frame_disperses_to_container() {
    let disperse = definition_fn(|future, trace, context| {
        let Some(frame) = context.self_frame() else {
            return Err(program_error(trace, "no self frame"));
        };
        frame.disperse(trace, &Name::string("g"), &Value::from("deep"))?;
        future.complete(Value::Null)
    });
    let nest = definition_fn(move |future, trace, context| {
        let inner = AttributeSource::from(Attribute::of("leaf", Arc::clone(&disperse)));
        let nested = Frame::create(&future, trace, context, &[inner]);
        future.complete(Value::Frame(nested))
    });
    let outcome = run(move |future: Future<Vec<String>>, trace| {
        let source = AttributeSource::from(Attribute::of("child", nest)).gathering("g");
        let frame = Frame::create(&future, &trace, &Context::empty(), &[source]);
        assert_eq!(frame.gatherers(), vec![Name::string("g")]);
        let done = future.clone();
        let inner = future.clone();
        frame.gather(&future, &trace, &Name::string("g"), move |collected| {
            let trace = inner.trace().clone();
            collected.for_all(&inner, &trace, move |entries| {
                done.complete(entries.iter().map(|(_, value)| value.to_string()).collect())
            })
        })
    });
    assert_eq!(outcome.value(), Some(&vec!["deep".to_owned()]));
}

#[test]
fn test_container_follows_dynamic_self() {
    let outcome = run(|future: Future<bool>, trace| {
        let outer = Frame::create(&future, &trace, &Context::empty(), &[]);
        let inner = Frame::create(&future, &trace, &outer.context(), &[]);
        let hidden = Frame::create_with(&future, &trace, &outer.context(), false, &[], &[]);
        future.complete(
            inner.container() == Some(&outer)
                && hidden.container() == Some(&outer)
                && hidden.context().self_frame() == Some(&outer),
        )
    });
    assert_eq!(outcome.value(), Some(&true));
}
