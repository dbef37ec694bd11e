//! Built-in explorers.
//!
//! Every constructor returns a factory; the lookup engine starts one
//! explorer per column from it. Composite explorers start their parts at the
//! same time and duplicate them on fork, so each branch carries its own
//! state.

use super::{explorer_fn, Explore, ExplorerFactory, LookupEnv, LookupExplorer};
use crate::attribute::{Attribute, AttributeSource};
use crate::context::{Context, FrameAccessor};
use crate::template::Template;
use crate::value::Value;
use flb_ir::{type_mismatch, Name};
use std::fmt;
use std::sync::Arc;

/// A named test on attribute names, used to split a path between explorers.
#[derive(Clone)]
pub struct NamePredicate {
    description: Arc<str>,
    test: Arc<dyn Fn(&Name) -> bool + Send + Sync>,
}

impl NamePredicate {
    pub fn new(
        description: impl Into<String>,
        test: impl Fn(&Name) -> bool + Send + Sync + 'static,
    ) -> Self {
        NamePredicate {
            description: Arc::from(description.into()),
            test: Arc::new(test),
        }
    }

    pub fn is_ordinal() -> Self {
        NamePredicate::new("ordinal", |name| name.as_ordinal().is_some())
    }

    pub fn is_string() -> Self {
        NamePredicate::new("string", |name| name.as_str().is_some())
    }

    pub fn test(&self, name: &Name) -> bool {
        (self.test)(name)
    }
}

impl fmt::Display for NamePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl fmt::Debug for NamePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePredicate({})", self.description)
    }
}

#[derive(Clone, Copy)]
struct Exact;

impl LookupExplorer for Exact {
    fn process(&mut self, name: &Name, target: &FrameAccessor, _: usize, _: usize) -> Explore {
        target.get(name).map_or(Explore::Next, Explore::awaiting)
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(*self)
    }
}

/// The attribute of exactly the requested name; the column is abandoned
/// without it.
pub fn exact() -> Arc<dyn ExplorerFactory> {
    explorer_fn("exact", |_| Box::new(Exact))
}

#[derive(Clone, Copy)]
struct NullCoalescing;

impl LookupExplorer for NullCoalescing {
    fn process(&mut self, name: &Name, target: &FrameAccessor, _: usize, _: usize) -> Explore {
        match target.get(name) {
            Some(promise) => Explore::then(promise, |value| {
                if value.is_null() {
                    Explore::Next
                } else {
                    Explore::Found(value)
                }
            }),
            None => Explore::Next,
        }
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(*self)
    }
}

/// Like [`exact`], but a `Null` value also abandons the column.
pub fn null_coalescing() -> Arc<dyn ExplorerFactory> {
    explorer_fn("null coalescing", |_| Box::new(NullCoalescing))
}

/// Query ordinal first, attribute ordinal second.
type Flags = fn(i64, i64) -> bool;

#[derive(Clone, Copy)]
struct Numeric(Flags);

impl LookupExplorer for Numeric {
    fn process(&mut self, name: &Name, target: &FrameAccessor, _: usize, _: usize) -> Explore {
        let matches = target
            .names()
            .into_iter()
            .filter(|candidate| match (name, candidate) {
                (Name::Ordinal(query), Name::Ordinal(attribute)) => (self.0)(*query, *attribute),
                (Name::Str(query), Name::Str(attribute)) => query == attribute,
                _ => false,
            })
            .filter_map(|candidate| target.get(&candidate))
            .map(Explore::awaiting)
            .collect();
        Explore::Fork(matches)
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(*self)
    }
}

fn numeric(description: &'static str, flags: Flags) -> Arc<dyn ExplorerFactory> {
    explorer_fn(description, move |_| Box::new(Numeric(flags)))
}

/// Ordinal attributes whose bits are all set in the query.
pub fn flag_contains() -> Arc<dyn ExplorerFactory> {
    numeric("query contains bits in attribute", |query, attribute| {
        query & attribute == attribute
    })
}

/// Ordinal attributes that have every bit of the query set.
pub fn flag_contained() -> Arc<dyn ExplorerFactory> {
    numeric("query contained bits in attribute", |query, attribute| {
        query & attribute == query
    })
}

/// Ordinal attributes the query divides evenly.
pub fn flag_divides() -> Arc<dyn ExplorerFactory> {
    numeric("query divides attribute", |query, attribute| {
        attribute.checked_rem(query) == Some(0)
    })
}

/// Ordinal attributes that divide the query evenly.
pub fn flag_divided() -> Arc<dyn ExplorerFactory> {
    numeric("query divided by attribute", |query, attribute| {
        query.checked_rem(attribute) == Some(0)
    })
}

/// Ordinal attributes sharing at least one bit with the query.
pub fn flag_intersects() -> Arc<dyn ExplorerFactory> {
    numeric("query and attribute have bit-wise intersection", |query, attribute| {
        query & attribute != 0
    })
}

/// Edit distance between two strings, by characters.
fn levenshtein(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, l) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, r) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(l != *r);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

fn distance(query: &Name, candidate: &Name) -> u64 {
    match (query, candidate) {
        (Name::Str(query), Name::Str(candidate)) => {
            u64::try_from(levenshtein(query, candidate)).unwrap_or(u64::MAX)
        }
        (Name::Ordinal(query), Name::Ordinal(candidate)) => query.abs_diff(*candidate),
        _ => u64::MAX,
    }
}

#[derive(Clone, Copy)]
struct Fuzzy(u64);

impl LookupExplorer for Fuzzy {
    fn process(&mut self, name: &Name, target: &FrameAccessor, _: usize, _: usize) -> Explore {
        let mut scored: Vec<(u64, Name)> = target
            .names()
            .into_iter()
            .map(|candidate| (distance(name, &candidate), candidate))
            .filter(|(score, _)| *score < self.0)
            .collect();
        scored.sort_by_key(|(score, _)| *score);
        Explore::Fork(
            scored
                .into_iter()
                .filter_map(|(_, candidate)| target.get(&candidate))
                .map(Explore::awaiting)
                .collect(),
        )
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(*self)
    }
}

/// Every attribute closer than `cutoff` to the requested name, nearest
/// first: edit distance between strings, absolute difference between
/// ordinals. Strings and ordinals never match each other.
pub fn fuzzy(cutoff: u64) -> Arc<dyn ExplorerFactory> {
    explorer_fn(format!("fuzzy with cut-off {cutoff}"), move |_| Box::new(Fuzzy(cutoff)))
}

struct TakeFirst {
    count: usize,
    first: Box<dyn LookupExplorer>,
    second: Box<dyn LookupExplorer>,
}

impl LookupExplorer for TakeFirst {
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore {
        if seen < self.count {
            self.first.process(name, target, seen, remaining.min(self.count))
        } else {
            self.second.process(name, target, seen - self.count, remaining)
        }
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(TakeFirst {
            count: self.count,
            first: self.first.duplicate(),
            second: self.second.duplicate(),
        })
    }
}

/// `first` for the first `count` names of the path, `second` for the rest.
pub fn take_first(
    count: usize,
    first: Arc<dyn ExplorerFactory>,
    second: Arc<dyn ExplorerFactory>,
) -> Arc<dyn ExplorerFactory> {
    let description = format!(
        "({} for first {count} then {})",
        first.description(),
        second.description()
    );
    explorer_fn(description, move |env| {
        Box::new(TakeFirst {
            count,
            first: first.start(env),
            second: second.start(env),
        })
    })
}

struct TakeLast {
    count: usize,
    first: Box<dyn LookupExplorer>,
    second: Box<dyn LookupExplorer>,
}

impl LookupExplorer for TakeLast {
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore {
        if remaining > self.count {
            self.first.process(name, target, seen, remaining - self.count)
        } else {
            self.second
                .process(name, target, self.count - remaining, remaining)
        }
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(TakeLast {
            count: self.count,
            first: self.first.duplicate(),
            second: self.second.duplicate(),
        })
    }
}

/// `second` for the last `count` names of the path, `first` for the ones
/// before.
pub fn take_last(
    count: usize,
    first: Arc<dyn ExplorerFactory>,
    second: Arc<dyn ExplorerFactory>,
) -> Arc<dyn ExplorerFactory> {
    let description = format!(
        "({} until last {count} then {})",
        first.description(),
        second.description()
    );
    explorer_fn(description, move |env| {
        Box::new(TakeLast {
            count,
            first: first.start(env),
            second: second.start(env),
        })
    })
}

struct TakeUntil {
    predicate: NamePredicate,
    first: Box<dyn LookupExplorer>,
    second: Box<dyn LookupExplorer>,
    /// Rows handed to `first` so far.
    count: usize,
    valid: bool,
}

impl LookupExplorer for TakeUntil {
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore {
        self.valid &= self.predicate.test(name);
        if self.valid {
            self.count += 1;
            self.first.process(name, target, seen, remaining)
        } else {
            self.second
                .process(name, target, seen.saturating_sub(self.count), remaining)
        }
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(TakeUntil {
            predicate: self.predicate.clone(),
            first: self.first.duplicate(),
            second: self.second.duplicate(),
            count: self.count,
            valid: self.valid,
        })
    }
}

/// `first` while the names of the path satisfy `predicate`, `second` from
/// the first name that does not.
pub fn take_until(
    predicate: NamePredicate,
    first: Arc<dyn ExplorerFactory>,
    second: Arc<dyn ExplorerFactory>,
) -> Arc<dyn ExplorerFactory> {
    let description = format!(
        "({} until {predicate} then {})",
        first.description(),
        second.description()
    );
    explorer_fn(description, move |env| {
        Box::new(TakeUntil {
            predicate: predicate.clone(),
            first: first.start(env),
            second: second.start(env),
            count: 0,
            valid: true,
        })
    })
}

struct Where {
    predicate: NamePredicate,
    matching: Box<dyn LookupExplorer>,
    other: Box<dyn LookupExplorer>,
}

impl LookupExplorer for Where {
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore {
        if self.predicate.test(name) {
            self.matching.process(name, target, seen, remaining)
        } else {
            self.other.process(name, target, seen, remaining)
        }
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(Where {
            predicate: self.predicate.clone(),
            matching: self.matching.duplicate(),
            other: self.other.duplicate(),
        })
    }
}

/// `matching` for names that satisfy `predicate`, `other` for the rest.
pub fn where_rows(
    predicate: NamePredicate,
    matching: Arc<dyn ExplorerFactory>,
    other: Arc<dyn ExplorerFactory>,
) -> Arc<dyn ExplorerFactory> {
    let description = format!(
        "(if {predicate} then {} else {})",
        matching.description(),
        other.description()
    );
    explorer_fn(description, move |env| {
        Box::new(Where {
            predicate: predicate.clone(),
            matching: matching.start(env),
            other: other.start(env),
        })
    })
}

#[derive(Clone, Copy)]
enum Adapt {
    Filter,
    Map,
}

impl Adapt {
    fn message(self) -> &'static str {
        match self {
            Adapt::Filter => "instantiate template inside filter lookup handler",
            Adapt::Map => "instantiate template inside map lookup handler",
        }
    }
}

/// Passes each value `inner` finds through a function-like template that
/// receives `input` (the value) and `name` (the requested name).
struct Adapted {
    adapt: Adapt,
    template: Template,
    env: LookupEnv,
    inner: Box<dyn LookupExplorer>,
}

impl LookupExplorer for Adapted {
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore {
        let (adapt, template, env) = (self.adapt, self.template.clone(), self.env.clone());
        let requested = Value::from(name);
        self.inner
            .process(name, target, seen, remaining)
            .and_then(move |input| {
                let trace = env
                    .trace()
                    .special_junction(adapt.message(), template.trace());
                let arguments = AttributeSource::of([
                    Attribute::constant("input", input.clone()),
                    Attribute::constant("name", requested),
                ]);
                let promise =
                    match template.call(env.future(), &trace, &Context::empty(), arguments) {
                        Ok(promise) => promise,
                        Err(error) => return Explore::Fail(error),
                    };
                match adapt {
                    Adapt::Map => Explore::awaiting(promise),
                    Adapt::Filter => Explore::then(promise, move |keep| match keep {
                        Value::Bool(true) => Explore::Found(input),
                        Value::Bool(false) => Explore::Next,
                        other => Explore::Fail(type_mismatch(&trace, "Bool", other.type_name())),
                    }),
                }
            })
    }

    fn duplicate(&self) -> Box<dyn LookupExplorer> {
        Box::new(Adapted {
            adapt: self.adapt,
            template: self.template.clone(),
            env: self.env.clone(),
            inner: self.inner.duplicate(),
        })
    }
}

fn adapted(
    adapt: Adapt,
    description: String,
    template: Template,
    inner: Arc<dyn ExplorerFactory>,
) -> Arc<dyn ExplorerFactory> {
    explorer_fn(description, move |env| {
        Box::new(Adapted {
            adapt,
            template: template.clone(),
            env: env.clone(),
            inner: inner.start(env),
        })
    })
}

/// Keep a value `inner` finds only if `template` (given `input` and `name`)
/// produces `True`; otherwise abandon the column.
pub fn filter(template: Template, inner: Arc<dyn ExplorerFactory>) -> Arc<dyn ExplorerFactory> {
    let description = format!("{} then filtering by template", inner.description());
    adapted(Adapt::Filter, description, template, inner)
}

/// Replace each value `inner` finds with what `template` (given `input` and
/// `name`) produces.
pub fn map(template: Template, inner: Arc<dyn ExplorerFactory>) -> Arc<dyn ExplorerFactory> {
    let description = format!("{} then calling template", inner.description());
    adapted(Adapt::Map, description, template, inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("naïve", "naive"), 1);
    }

    #[test]
    fn test_distance_never_mixes_kinds() {
        assert_eq!(distance(&Name::ordinal(3), &Name::ordinal(-2)), 5);
        assert_eq!(distance(&Name::string("a"), &Name::ordinal(1)), u64::MAX);
        assert_eq!(distance(&Name::string("colour"), &Name::string("color")), 1);
    }

    #[test]
    fn test_composite_descriptions() {
        let split = take_first(2, exact(), null_coalescing());
        assert_eq!(split.description(), "(exact for first 2 then null coalescing)");
        let tail = take_last(1, exact(), fuzzy(3));
        assert_eq!(tail.description(), "(exact until last 1 then fuzzy with cut-off 3)");
        let until = take_until(NamePredicate::is_string(), exact(), flag_contains());
        assert_eq!(
            until.description(),
            "(exact until string then query contains bits in attribute)"
        );
        let rows = where_rows(NamePredicate::is_ordinal(), flag_divides(), exact());
        assert_eq!(rows.description(), "(if ordinal then query divides attribute else exact)");
    }
}
