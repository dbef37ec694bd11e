//! Execution traces.
//!
//! A [`Trace`] is an immutable linked chain of records describing how the
//! runtime reached a computation: each record carries a message, an optional
//! source location, its caller, and (for junctions) a second chain describing
//! where a template or override came from. Traces are cheap to clone and are
//! attached to every task, wait and error so that diagnostics can show the
//! path that led to a failure or a deadlock.
//!
//! Rendering is left to callers through [`TraceVisitor`]; the `Display` impl
//! is a plain one-record-per-line dump.

use std::fmt;
use std::sync::Arc;

/// Position range in a source file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceLocation {
    pub fn new(
        file: impl AsRef<str>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        SourceLocation {
            file: Arc::from(file.as_ref()),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file, self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

struct TraceNode {
    message: Arc<str>,
    location: Option<SourceLocation>,
    caller: Trace,
    branch: Option<Trace>,
}

/// Linked chain of execution records.
///
/// The empty trace terminates every chain.
#[derive(Clone, Default)]
pub struct Trace(Option<Arc<TraceNode>>);

/// Receives the records of a [`Trace`] from innermost to outermost.
pub trait TraceVisitor {
    /// A plain record.
    fn record(&mut self, message: &str, location: Option<&SourceLocation>);

    /// A record that joins a second chain. The default visits the record
    /// and ignores the branch.
    fn junction(&mut self, message: &str, location: Option<&SourceLocation>, branch: &Trace) {
        let _ = branch;
        self.record(message, location);
    }
}

impl Trace {
    /// The empty trace.
    pub const EMPTY: Trace = Trace(None);

    fn node(
        message: &str,
        location: Option<SourceLocation>,
        caller: Trace,
        branch: Option<Trace>,
    ) -> Trace {
        Trace(Some(Arc::new(TraceNode {
            message: Arc::from(message),
            location,
            caller,
            branch,
        })))
    }

    /// A new chain with a single record and no location.
    pub fn root(message: &str) -> Trace {
        Trace::node(message, None, Trace::EMPTY, None)
    }

    /// Extend this chain with a record at a source location.
    pub fn basic(&self, message: &str, location: SourceLocation) -> Trace {
        Trace::node(message, Some(location), self.clone(), None)
    }

    /// Extend this chain with a record produced by the runtime itself.
    pub fn special(&self, message: &str) -> Trace {
        Trace::node(message, None, self.clone(), None)
    }

    /// Extend this chain with a located record that joins `branch`.
    pub fn junction(&self, message: &str, location: SourceLocation, branch: &Trace) -> Trace {
        Trace::node(message, Some(location), self.clone(), Some(branch.clone()))
    }

    /// Extend this chain with a runtime record that joins `branch`.
    pub fn special_junction(&self, message: &str, branch: &Trace) -> Trace {
        Trace::node(message, None, self.clone(), Some(branch.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Message of the innermost record.
    pub fn message(&self) -> Option<&str> {
        self.0.as_deref().map(|node| &*node.message)
    }

    /// Number of records along the caller chain (branches not included).
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(node) = &current.0 {
            depth += 1;
            current = &node.caller;
        }
        depth
    }

    /// Visit every record along the caller chain, innermost first.
    pub fn walk(&self, visitor: &mut dyn TraceVisitor) {
        let mut current = self;
        while let Some(node) = &current.0 {
            match &node.branch {
                Some(branch) => visitor.junction(&node.message, node.location.as_ref(), branch),
                None => visitor.record(&node.message, node.location.as_ref()),
            }
            current = &node.caller;
        }
    }
}

struct LineWriter<'a, 'b> {
    f: &'a mut fmt::Formatter<'b>,
    result: fmt::Result,
}

impl TraceVisitor for LineWriter<'_, '_> {
    fn record(&mut self, message: &str, location: Option<&SourceLocation>) {
        if self.result.is_err() {
            return;
        }
        self.result = match location {
            Some(location) => writeln!(self.f, "  at {message} ({location})"),
            None => writeln!(self.f, "  at {message}"),
        };
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = LineWriter { f, result: Ok(()) };
        self.walk(&mut writer);
        writer.result
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "Trace({message:?}, depth {})", self.depth()),
            None => f.write_str("Trace(empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Collect(Vec<String>);

    impl TraceVisitor for Collect {
        fn record(&mut self, message: &str, _: Option<&SourceLocation>) {
            self.0.push(message.to_owned());
        }

        fn junction(&mut self, message: &str, _: Option<&SourceLocation>, branch: &Trace) {
            self.0.push(format!("{message} <{}>", branch.message().unwrap_or("")));
        }
    }

    #[test]
    fn test_walk_innermost_first() {
        let template = Trace::root("template");
        let trace = Trace::root("run")
            .basic("attribute x", SourceLocation::new("a.flbgst", 1, 1, 1, 5))
            .special_junction("instantiate", &template)
            .special("lookup");
        let mut collect = Collect(Vec::new());
        trace.walk(&mut collect);
        assert_eq!(
            collect.0,
            vec!["lookup", "instantiate <template>", "attribute x", "run"]
        );
        assert_eq!(trace.depth(), 4);
    }

    #[test]
    fn test_display_lines() {
        let trace =
            Trace::root("run").basic("x", SourceLocation::new("a.flbgst", 2, 3, 2, 9));
        assert_eq!(trace.to_string(), "  at x (a.flbgst:2:3-2:9)\n  at run\n");
        assert!(Trace::EMPTY.is_empty());
        assert_eq!(Trace::EMPTY.to_string(), "");
    }
}
