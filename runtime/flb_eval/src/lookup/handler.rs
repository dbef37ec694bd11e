//! Lookup handlers: an explorer strategy paired with a selector strategy.

use super::explorer::{self, NamePredicate};
use super::selector;
use super::{ExplorerFactory, Lookup, SelectorFactory};
use crate::context::Context;
use crate::definition::{definition_fn, Definition};
use crate::value::Value;
use flb_ir::{program_error, Name, Trace};
use flb_sched::{Flow, Future};
use std::fmt;
use std::sync::Arc;

struct HandlerInner {
    explorer: Arc<dyn ExplorerFactory>,
    selector: Arc<dyn SelectorFactory>,
}

/// How a name is resolved. Handlers are values and compare by identity.
#[derive(Clone)]
pub struct LookupHandler(Arc<HandlerInner>);

impl LookupHandler {
    pub fn new(explorer: Arc<dyn ExplorerFactory>, selector: Arc<dyn SelectorFactory>) -> Self {
        LookupHandler(Arc::new(HandlerInner { explorer, selector }))
    }

    /// Ordinary name resolution: the exact name, innermost frame first.
    pub fn contextual() -> Self {
        LookupHandler::new(explorer::exact(), selector::first())
    }

    pub fn explorer(&self) -> &Arc<dyn ExplorerFactory> {
        &self.0.explorer
    }

    pub fn selector(&self) -> &Arc<dyn SelectorFactory> {
        &self.0.selector
    }

    pub fn description(&self) -> String {
        format!(
            "{} selecting {}",
            self.0.explorer.description(),
            self.0.selector.description()
        )
    }

    #[must_use]
    pub fn with_explorer(&self, explorer: Arc<dyn ExplorerFactory>) -> Self {
        LookupHandler::new(explorer, Arc::clone(&self.0.selector))
    }

    #[must_use]
    pub fn with_selector(&self, selector: Arc<dyn SelectorFactory>) -> Self {
        LookupHandler::new(Arc::clone(&self.0.explorer), selector)
    }

    /// This handler's explorer for the first `count` names, `rest` after.
    #[must_use]
    pub fn take_first(&self, count: usize, rest: Arc<dyn ExplorerFactory>) -> Self {
        self.with_explorer(explorer::take_first(count, Arc::clone(&self.0.explorer), rest))
    }

    /// `head` until the last `count` names, this handler's explorer for those.
    #[must_use]
    pub fn take_last(&self, count: usize, head: Arc<dyn ExplorerFactory>) -> Self {
        self.with_explorer(explorer::take_last(count, head, Arc::clone(&self.0.explorer)))
    }

    /// This handler's explorer while names satisfy `predicate`, `rest` after.
    #[must_use]
    pub fn take_until(&self, predicate: NamePredicate, rest: Arc<dyn ExplorerFactory>) -> Self {
        self.with_explorer(explorer::take_until(
            predicate,
            Arc::clone(&self.0.explorer),
            rest,
        ))
    }

    /// Resolve the path `names` in `context` and hand the result to `then`.
    pub fn lookup(
        &self,
        future: &Future<Value>,
        trace: &Trace,
        context: &Context,
        names: &[Name],
        then: impl FnOnce(Value) -> Flow + Send + 'static,
    ) -> Flow {
        if names.is_empty() {
            return Err(program_error(trace, "Missing names in lookup."));
        }
        Lookup::start(self, future, trace, context, Arc::from(names), then)
    }

    /// A definition whose value is the result of looking up `names` in the
    /// context it is invoked in.
    pub fn definition(&self, names: Vec<Name>) -> Arc<dyn Definition> {
        let handler = self.clone();
        let names: Arc<[Name]> = Arc::from(names);
        definition_fn(move |future, trace, context| {
            let done = future.clone();
            handler.lookup(&future, trace, context, &names, move |value| done.complete(value))
        })
    }

    pub fn same(&self, other: &LookupHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LookupHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LookupHandler({})", self.description())
    }
}
