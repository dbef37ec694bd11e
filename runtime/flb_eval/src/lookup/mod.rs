//! Grid-driven name resolution.
//!
//! A lookup of the path `n0.n1…nk` in a context of frames `c0…cm` fills a
//! grid: one column per context frame (innermost first), one row per name.
//! Columns are explored left to right and each column top to bottom.
//!
//! # Architecture
//!
//! - A [`LookupExplorer`] is started fresh for every column. For each row it
//!   is given the name and the frame to search, and answers with an
//!   [`Explore`]: a value, an awaited value, a fork into several values, a
//!   request to abandon the column, or an error. A value found for a row
//!   other than the last must be a frame; it becomes the search target of
//!   the next row.
//! - One [`LookupSelector`] per lookup receives the value of every completed
//!   column and answers with a [`Select`]: finish the lookup, try the next
//!   column, or fail. Once every column is exhausted it gets a last word
//!   through [`LookupSelector::empty`].
//! - Forks duplicate the explorer and continue depth first from an explicit
//!   stack, so fan-out never grows the native stack.
//!
//! The grid is driven by a single continuation chain; its state sits behind
//! a lock only because that chain may hop between worker threads.

pub mod explorer;
mod handler;
pub mod selector;

pub use explorer::NamePredicate;
pub use handler::LookupHandler;

use crate::context::{Context, FrameAccessor};
use crate::value::Value;
use flb_ir::{lookup_type_mismatch, unresolved_name, EvalError, Name, Trace};
use flb_sched::{Flow, Future, Promise, WaitKind, WaitSite};
use parking_lot::Mutex;
use std::sync::Arc;

/// What explorers and selectors may use while a lookup runs.
#[derive(Clone)]
pub struct LookupEnv {
    future: Future<Value>,
    trace: Trace,
    context: Context,
}

impl LookupEnv {
    pub fn future(&self) -> &Future<Value> {
        &self.future
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

type ExploreThen = Box<dyn FnOnce(Value) -> Explore + Send>;
type SelectThen = Box<dyn FnOnce(Value) -> Select + Send>;

/// An explorer's answer for one grid cell.
pub enum Explore {
    /// The row's value.
    Found(Value),
    /// Continue with the value of `promise` once it is available.
    Then(Promise<Value>, ExploreThen),
    /// Continue the column once for each branch, depth first.
    Fork(Vec<Explore>),
    /// Abandon this column (or branch).
    Next,
    Fail(EvalError),
}

impl Explore {
    /// The value of `promise` is the row's value.
    pub fn awaiting(promise: Promise<Value>) -> Explore {
        Explore::Then(promise, Box::new(Explore::Found))
    }

    /// Continue with the value of `promise`.
    pub fn then(
        promise: Promise<Value>,
        then: impl FnOnce(Value) -> Explore + Send + 'static,
    ) -> Explore {
        Explore::Then(promise, Box::new(then))
    }

    /// Feed a found value through `f`. Forks pass through untouched.
    #[must_use]
    pub fn and_then(self, f: impl FnOnce(Value) -> Explore + Send + 'static) -> Explore {
        match self {
            Explore::Found(value) => f(value),
            Explore::Then(promise, then) => {
                Explore::Then(promise, Box::new(move |value| then(value).and_then(f)))
            }
            other => other,
        }
    }
}

/// A selector's answer.
pub enum Select {
    /// The result of the whole lookup.
    Finish(Value),
    /// Keep exploring.
    Next,
    /// Give up; the lookup reports an unresolved name.
    Fail,
    Error(EvalError),
    /// Continue with the value of `promise` once it is available.
    Then(Promise<Value>, SelectThen),
}

impl Select {
    pub fn then(
        promise: Promise<Value>,
        then: impl FnOnce(Value) -> Select + Send + 'static,
    ) -> Select {
        Select::Then(promise, Box::new(then))
    }

    /// Feed a finishing value through `f`.
    #[must_use]
    pub fn and_then(self, f: impl FnOnce(Value) -> Select + Send + 'static) -> Select {
        match self {
            Select::Finish(value) => f(value),
            Select::Then(promise, then) => {
                Select::Then(promise, Box::new(move |value| then(value).and_then(f)))
            }
            other => other,
        }
    }

    /// Replace a failure with the result of `f`.
    #[must_use]
    pub fn or_else(self, f: impl FnOnce() -> Select + Send + 'static) -> Select {
        match self {
            Select::Fail => f(),
            Select::Then(promise, then) => {
                Select::Then(promise, Box::new(move |value| then(value).or_else(f)))
            }
            other => other,
        }
    }
}

/// Per-column search strategy.
pub trait LookupExplorer: Send {
    /// Search `target` for `name`. `seen` rows of this column were processed
    /// before this one; `remaining` counts this row and the ones after it.
    fn process(
        &mut self,
        name: &Name,
        target: &FrameAccessor,
        seen: usize,
        remaining: usize,
    ) -> Explore;

    /// An independent copy for a forked branch.
    fn duplicate(&self) -> Box<dyn LookupExplorer>;
}

/// Per-lookup result strategy.
pub trait LookupSelector: Send {
    /// A column produced `value`.
    fn accept(&mut self, value: Value) -> Select;

    /// Every column is exhausted.
    fn empty(&mut self) -> Select;
}

/// Creates an explorer for each column.
pub trait ExplorerFactory: Send + Sync {
    fn description(&self) -> String;

    fn start(&self, env: &LookupEnv) -> Box<dyn LookupExplorer>;
}

/// Creates the selector of each lookup.
pub trait SelectorFactory: Send + Sync {
    fn description(&self) -> String;

    fn start(&self, env: &LookupEnv) -> Box<dyn LookupSelector>;
}

/// A factory built from a description and a start function.
struct Operation<F> {
    description: String,
    start: F,
}

impl<F> ExplorerFactory for Operation<F>
where
    F: Fn(&LookupEnv) -> Box<dyn LookupExplorer> + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn start(&self, env: &LookupEnv) -> Box<dyn LookupExplorer> {
        (self.start)(env)
    }
}

impl<F> SelectorFactory for Operation<F>
where
    F: Fn(&LookupEnv) -> Box<dyn LookupSelector> + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn start(&self, env: &LookupEnv) -> Box<dyn LookupSelector> {
        (self.start)(env)
    }
}

pub fn explorer_fn<F>(description: impl Into<String>, start: F) -> Arc<dyn ExplorerFactory>
where
    F: Fn(&LookupEnv) -> Box<dyn LookupExplorer> + Send + Sync + 'static,
{
    Arc::new(Operation {
        description: description.into(),
        start,
    })
}

pub fn selector_fn<F>(description: impl Into<String>, start: F) -> Arc<dyn SelectorFactory>
where
    F: Fn(&LookupEnv) -> Box<dyn LookupSelector> + Send + Sync + 'static,
{
    Arc::new(Operation {
        description: description.into(),
        start,
    })
}

struct Cursor {
    explorer: Box<dyn LookupExplorer>,
    row: usize,
    column: usize,
    synthetic: usize,
}

/// A forked value waiting for its turn.
struct Branch {
    cursor: Cursor,
    pending: Explore,
}

#[derive(Clone)]
struct Step {
    row: usize,
    column: usize,
    synthetic: usize,
    frame: Arc<str>,
}

struct Grid {
    /// Next context column to open.
    column: usize,
    synthetic_width: usize,
    forks: Vec<Branch>,
    steps: Vec<Step>,
}

enum Action {
    Advance,
    Resolve(Cursor, Explore),
    Found(Cursor, Value),
    Select(Select, bool),
}

pub(crate) struct Lookup {
    handler: LookupHandler,
    env: LookupEnv,
    names: Arc<[Name]>,
    columns: Vec<FrameAccessor>,
    result: Future<Value>,
    selector: Mutex<Box<dyn LookupSelector>>,
    grid: Mutex<Grid>,
    site: Arc<dyn WaitSite>,
}

impl Lookup {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %render_path(&names)))]
    pub(crate) fn start(
        handler: &LookupHandler,
        future: &Future<Value>,
        trace: &Trace,
        context: &Context,
        names: Arc<[Name]>,
        then: impl FnOnce(Value) -> Flow + Send + 'static,
    ) -> Flow {
        let env = LookupEnv {
            future: future.clone(),
            trace: trace.clone(),
            context: context.clone(),
        };
        let selector = handler.selector().start(&env);
        let columns = context.frames().to_vec();
        let site: Arc<dyn WaitSite> = Arc::new(LookupWait {
            path: render_path(&names),
            handler: handler.description(),
            trace: trace.clone(),
        });
        let lookup = Arc::new(Lookup {
            handler: handler.clone(),
            result: future.inner(then),
            grid: Mutex::new(Grid {
                column: 0,
                synthetic_width: columns.len(),
                forks: Vec::new(),
                steps: Vec::new(),
            }),
            selector: Mutex::new(selector),
            env,
            names,
            columns,
            site,
        });
        lookup.drive(Action::Advance)
    }

    fn drive(self: &Arc<Self>, mut action: Action) -> Flow {
        loop {
            action = match action {
                Action::Advance => self.advance(),
                Action::Resolve(cursor, explore) => match explore {
                    Explore::Found(value) => Action::Found(cursor, value),
                    Explore::Then(promise, then) => match promise.try_get() {
                        Some(value) => Action::Resolve(cursor, then(value)),
                        None => {
                            let lookup = Arc::clone(self);
                            return self.env.future.await_with_site(
                                &promise,
                                Arc::clone(&self.site),
                                move |value| lookup.drive(Action::Resolve(cursor, then(value))),
                            );
                        }
                    },
                    Explore::Fork(branches) => self.fork(cursor, branches),
                    Explore::Next => Action::Advance,
                    Explore::Fail(error) => return Err(error),
                },
                Action::Found(cursor, value) => self.found(cursor, value)?,
                Action::Select(select, exhausted) => match select {
                    Select::Finish(value) => {
                        tracing::trace!(path = %render_path(&self.names), "lookup finished");
                        return self.result.complete(value);
                    }
                    Select::Next if !exhausted => Action::Advance,
                    Select::Next | Select::Fail => return Err(self.unresolved()),
                    Select::Error(error) => return Err(error),
                    Select::Then(promise, then) => match promise.try_get() {
                        Some(value) => Action::Select(then(value), exhausted),
                        None => {
                            let lookup = Arc::clone(self);
                            return self.env.future.await_with_site(
                                &promise,
                                Arc::clone(&self.site),
                                move |value| lookup.drive(Action::Select(then(value), exhausted)),
                            );
                        }
                    },
                },
            };
        }
    }

    /// Resume the most recent fork, or open the next column.
    fn advance(&self) -> Action {
        let mut grid = self.grid.lock();
        if let Some(Branch { cursor, pending }) = grid.forks.pop() {
            return Action::Resolve(cursor, pending);
        }
        let column = grid.column;
        let Some(accessor) = self.columns.get(column) else {
            drop(grid);
            return Action::Select(self.selector.lock().empty(), true);
        };
        grid.column += 1;
        drop(grid);
        let cursor = Cursor {
            explorer: self.handler.explorer().start(&self.env),
            row: 0,
            column,
            synthetic: column,
        };
        self.explore(cursor, accessor)
    }

    fn explore(&self, mut cursor: Cursor, target: &FrameAccessor) -> Action {
        let Some(name) = self.names.get(cursor.row) else {
            return Action::Advance;
        };
        tracing::trace!(
            row = cursor.row,
            column = cursor.column,
            frame = %target.frame().id(),
            %name,
            "lookup step"
        );
        self.grid.lock().steps.push(Step {
            row: cursor.row,
            column: cursor.column,
            synthetic: cursor.synthetic,
            frame: Arc::from(target.frame().id()),
        });
        let remaining = self.names.len() - cursor.row;
        let explore = cursor.explorer.process(name, target, cursor.row, remaining);
        Action::Resolve(cursor, explore)
    }

    fn found(&self, mut cursor: Cursor, value: Value) -> Result<Action, EvalError> {
        if cursor.row + 1 >= self.names.len() {
            return Ok(Action::Select(self.selector.lock().accept(value), false));
        }
        let Value::Frame(frame) = value else {
            return Err(lookup_type_mismatch(
                &self.env.trace,
                render_path(&self.names),
                value.type_name(),
            ));
        };
        cursor.row += 1;
        let target = self.env.context.accessor(&frame);
        Ok(self.explore(cursor, &target))
    }

    /// Continue with the first branch now; queue the rest so that they are
    /// resumed in order, each with its own explorer.
    fn fork(&self, cursor: Cursor, branches: Vec<Explore>) -> Action {
        let mut branches = branches.into_iter();
        let Some(first) = branches.next() else {
            return Action::Advance;
        };
        let rest: Vec<Explore> = branches.collect();
        if !rest.is_empty() {
            let mut grid = self.grid.lock();
            for pending in rest.into_iter().rev() {
                grid.synthetic_width += 1;
                let synthetic = grid.synthetic_width;
                let copied: Vec<Step> = grid
                    .steps
                    .iter()
                    .filter(|step| step.synthetic == cursor.synthetic)
                    .map(|step| Step {
                        synthetic,
                        ..step.clone()
                    })
                    .collect();
                grid.steps.extend(copied);
                grid.forks.push(Branch {
                    cursor: Cursor {
                        explorer: cursor.explorer.duplicate(),
                        row: cursor.row,
                        column: cursor.column,
                        synthetic,
                    },
                    pending,
                });
            }
        }
        Action::Resolve(cursor, first)
    }

    #[cold]
    fn unresolved(&self) -> EvalError {
        let grid = self.grid.lock();
        let explored = grid
            .steps
            .iter()
            .map(|step| {
                let name = self
                    .names
                    .get(step.row)
                    .map_or_else(String::new, ToString::to_string);
                if step.synthetic == step.column {
                    format!("{name} in frame {} (column {})", step.frame, step.column)
                } else {
                    format!(
                        "{name} in frame {} (column {}, branch {})",
                        step.frame, step.column, step.synthetic
                    )
                }
            })
            .collect();
        unresolved_name(&self.env.trace, render_path(&self.names), explored)
    }
}

fn render_path(names: &[Name]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// A lookup suspended on an attribute value.
struct LookupWait {
    path: String,
    handler: String,
    trace: Trace,
}

impl WaitSite for LookupWait {
    fn kind(&self) -> WaitKind {
        WaitKind::Lookup
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn describe(&self) -> String {
        format!("lookup of “{}” using {}", self.path, self.handler)
    }
}
