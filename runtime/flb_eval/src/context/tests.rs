use super::*;
use flb_ir::Trace;
use pretty_assertions::assert_eq;

fn frame(id: &str, names: &[&str]) -> Frame {
    Frame::from_values(
        id,
        Trace::EMPTY,
        names.iter().map(|name| (Name::string(name), Value::Bool(true))),
    )
}

fn ids(context: &Context) -> Vec<String> {
    context.iter().map(|accessor| format!("{accessor:?}")).collect()
}

#[test]
fn test_prepend_sets_self_and_public_view() {
    let a = frame("a", &["x"]);
    let context = Context::empty().prepend(&a);
    assert_eq!(ids(&context), vec!["Public(a)"]);
    assert_eq!(context.self_frame(), Some(&a));
}

#[test]
fn test_prepend_hidden_keeps_self() {
    let (a, b) = (frame("a", &[]), frame("b", &[]));
    let context = Context::empty().prepend(&a).prepend_hidden(&b);
    assert_eq!(ids(&context), vec!["Private(b)", "Public(a)"]);
    assert_eq!(context.self_frame(), Some(&a));
}

#[test]
fn test_duplicate_views_keep_innermost() {
    let (a, b) = (frame("a", &[]), frame("b", &[]));
    let context = Context::empty().prepend(&a).prepend(&b).prepend(&a);
    assert_eq!(ids(&context), vec!["Public(a)", "Public(b)"]);

    // Different visibility of the same frame is a different view.
    let mixed = Context::empty().prepend(&a).prepend_private(&a);
    assert_eq!(ids(&mixed), vec!["Private(a)", "Public(a)"]);
}

#[test]
fn test_append_keeps_own_self() {
    let (a, b) = (frame("a", &[]), frame("b", &[]));
    let inner = Context::empty().prepend(&a);
    let outer = Context::empty().prepend(&b);
    let joined = inner.append(&outer);
    assert_eq!(ids(&joined), vec!["Public(a)", "Public(b)"]);
    assert_eq!(joined.self_frame(), Some(&a));
    assert_eq!(Context::empty().append(&outer).self_frame(), Some(&b));
}

#[test]
fn test_for_frame_demotes_unreachable_private_views() {
    let a = frame("a", &["x"]);
    // A sealed frame sees itself privately.
    assert_eq!(ids(&a.context()), vec!["Private(a)"]);

    let public = Context::empty().prepend(&a);
    assert_eq!(ids(&public.for_frame(&a)), vec!["Public(a)"]);

    let private = Context::empty().prepend_private(&a);
    assert_eq!(ids(&private.for_frame(&a)), vec!["Private(a)"]);
}

#[test]
fn test_reduce_visibility() {
    let (a, b) = (frame("a", &[]), frame("b", &[]));
    let context = Context::empty().prepend_private(&a).prepend_hidden(&b);
    assert_eq!(ids(&context.reduce_visibility()), vec!["Public(b)", "Public(a)"]);
}

#[test]
fn test_accessor_defaults_to_public() {
    let (a, b) = (frame("a", &[]), frame("b", &[]));
    let context = Context::empty().prepend_private(&a);
    assert_eq!(context.accessor(&a).visibility(), Visibility::Private);
    assert_eq!(context.accessor(&b).visibility(), Visibility::Public);
}

#[test]
fn test_names_innermost_first_without_duplicates() {
    let a = frame("a", &["x", "y"]);
    let b = frame("b", &["y", "z"]);
    let context = Context::empty().prepend(&b).prepend(&a);
    let names: Vec<String> = context.names().iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert_eq!(context.len(), 2);
    assert!(Context::empty().is_empty());
}
