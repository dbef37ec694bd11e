//! Shared vocabulary of the Flabbergast evaluation runtime.
//!
//! This crate holds the small, dependency-free types every other runtime
//! crate speaks in:
//!
//! - [`Name`]: attribute keys, either ordinals or string identifiers, with a
//!   total order used for frame maps.
//! - [`Trace`]: the linked chain of execution records attached to every
//!   computation and every error, walked by diagnostic renderers.
//! - [`EvalError`] / [`ErrorKind`]: the error taxonomy of the runtime.

mod error;
mod name;
mod trace;

pub use error::{
    fatal, illegal_dispersion, lookup_type_mismatch, missing_override_target, not_gathered,
    program_error, required_attribute, state_violation, type_mismatch, unresolved_name,
    DispersionFault, ErrorKind, EvalError,
};
pub use name::Name;
pub use trace::{SourceLocation, Trace, TraceVisitor};
