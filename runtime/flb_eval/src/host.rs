//! Operations offered to an embedding host.
//!
//! A host never sees attributes, gatherers or lookups directly. It holds
//! values and calls the two operations here: [`resolve`] to read a dotted
//! name out of a frame, and [`invoke`] to call a function-like value with
//! positional arguments. Anything more specific to a host belongs in an
//! adapter built on top of these.

use crate::attribute::{Attribute, AttributeSource};
use crate::context::Context;
use crate::frame::Frame;
use crate::lookup::LookupHandler;
use crate::value::Value;
use flb_ir::{type_mismatch, Name, Trace};
use flb_sched::{Flow, Future};

/// Resolve `names` against the frame `value` and hand the result to `then`.
///
/// The lookup starts from a context holding only that frame, so its
/// containers are not searched.
pub fn resolve(
    future: &Future<Value>,
    trace: &Trace,
    value: &Value,
    names: &[Name],
    then: impl FnOnce(Value) -> Flow + Send + 'static,
) -> Flow {
    let Value::Frame(frame) = value else {
        return Err(type_mismatch(trace, "Frame", value.type_name()));
    };
    let context = Context::empty().prepend(frame);
    LookupHandler::contextual().lookup(future, trace, &context, names, then)
}

/// Call `value` with positional `arguments`.
///
/// A template is instantiated with an `args` frame whose ordinals start at
/// zero and its `value` attribute is delivered. A lookup handler treats each
/// argument as a name and resolves the path in `context`.
pub fn invoke(
    future: &Future<Value>,
    trace: &Trace,
    context: &Context,
    value: &Value,
    arguments: Vec<Value>,
    then: impl FnOnce(Value) -> Flow + Send + 'static,
) -> Flow {
    match value {
        Value::Template(template) => {
            let entries = (0_i64..)
                .zip(arguments)
                .map(|(index, argument)| (Name::ordinal(index), argument));
            let args = Frame::from_values(format!("f{:019}", future.next_id()), trace.clone(), entries);
            let source = AttributeSource::from(Attribute::constant("args", args));
            let result = template.call(future, trace, context, source)?;
            future.await_promise(&result, trace, "value of invoked template", then)
        }
        Value::LookupHandler(handler) => {
            let names = arguments
                .iter()
                .map(|argument| argument.as_name(trace))
                .collect::<Result<Vec<_>, _>>()?;
            handler.lookup(future, trace, context, &names, then)
        }
        other => Err(type_mismatch(trace, "Template or LookupHandler", other.type_name())),
    }
}
