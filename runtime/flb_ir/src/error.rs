//! Error taxonomy of the evaluation runtime.
//!
//! Every failure a running program can produce is an [`EvalError`]: a
//! structured [`ErrorKind`] plus the [`Trace`] at which it was raised.
//! Errors accumulate per run rather than short-circuiting, so they are
//! `Clone` and carry everything needed to report them later.
//!
//! Factory functions (e.g. [`type_mismatch`]) are the public way to build
//! errors; they are `#[cold]` since every caller is an error path.
//!
//! Deadlocks are not errors: they are detected once the whole run has gone
//! quiet and are reported as a separate outcome.

use crate::{Name, Trace};
use thiserror::Error;

/// Why a dispersed value was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispersionFault {
    /// No frame on the container chain declares the bucket.
    Undeclared,
    /// The owning bucket already finished collecting.
    Inactive,
    /// The target frame was built from plain values and cannot gather.
    NeverGathers,
}

/// Structured error category.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// A consumer received a value of the wrong variant.
    #[error("Expected {expected}, but got {got}.")]
    TypeMismatch { expected: String, got: String },

    /// A lookup exhausted every column without a match.
    #[error("Undefined name “{path}”. Lookup was as follows:{}", render_steps(.explored))]
    UnresolvedName { path: String, explored: Vec<String> },

    /// An intermediate lookup step was not a frame.
    #[error("Unexpected type {got} while resolving name “{path}”.")]
    LookupTypeMismatch { path: String, got: String },

    /// A value was dispersed where it cannot be collected.
    #[error("{}", describe_dispersion(.bucket, .fault))]
    IllegalDispersion { bucket: Name, fault: DispersionFault },

    /// A gather named a bucket the frame never declared.
    #[error("Frame does not gather {bucket} values.")]
    NotGathered { bucket: Name },

    /// An override had nothing to override.
    #[error("Attempt to override non-existent attribute “{name}”.")]
    MissingOverrideTarget { name: Name },

    /// A required attribute was never supplied.
    #[error("Attribute “{name}” must be overridden.")]
    RequiredAttribute { name: Name },

    /// The program raised an error deliberately.
    #[error("{0}")]
    Program(String),

    /// A future was used against its state machine.
    #[error("{0}")]
    StateViolation(String),

    /// Scheduler-level abort.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

fn render_steps(explored: &[String]) -> String {
    if explored.is_empty() {
        return " nothing was searched.".to_owned();
    }
    explored.iter().fold(String::new(), |mut out, step| {
        out.push_str("\n  ");
        out.push_str(step);
        out
    })
}

fn describe_dispersion(bucket: &Name, fault: &DispersionFault) -> String {
    match fault {
        DispersionFault::Undeclared => format!(
            "No frame gathers {bucket} values. This is an illegal cross-frame dispersion."
        ),
        DispersionFault::Inactive => format!(
            "Value dispersed to {bucket} in inactive frame. This is an illegal cross-frame dispersion."
        ),
        DispersionFault::NeverGathers => format!(
            "Value dispersed to {bucket} in frame which never allowed gathering. This is an illegal cross-frame dispersion."
        ),
    }
}

/// A runtime error and the trace at which it was raised.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub trace: Trace,
}

impl EvalError {
    pub fn new(kind: ErrorKind, trace: Trace) -> Self {
        EvalError { kind, trace }
    }

    /// True for errors produced by the scheduler itself rather than the
    /// program.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Fatal(_) | ErrorKind::StateViolation(_))
    }
}

#[cold]
pub fn type_mismatch(trace: &Trace, expected: &str, got: &str) -> EvalError {
    EvalError::new(
        ErrorKind::TypeMismatch {
            expected: expected.to_owned(),
            got: got.to_owned(),
        },
        trace.clone(),
    )
}

#[cold]
pub fn unresolved_name(trace: &Trace, path: String, explored: Vec<String>) -> EvalError {
    EvalError::new(ErrorKind::UnresolvedName { path, explored }, trace.clone())
}

#[cold]
pub fn lookup_type_mismatch(trace: &Trace, path: String, got: &str) -> EvalError {
    EvalError::new(
        ErrorKind::LookupTypeMismatch {
            path,
            got: got.to_owned(),
        },
        trace.clone(),
    )
}

#[cold]
pub fn illegal_dispersion(trace: &Trace, bucket: &Name, fault: DispersionFault) -> EvalError {
    EvalError::new(
        ErrorKind::IllegalDispersion {
            bucket: bucket.clone(),
            fault,
        },
        trace.clone(),
    )
}

#[cold]
pub fn not_gathered(trace: &Trace, bucket: &Name) -> EvalError {
    EvalError::new(
        ErrorKind::NotGathered {
            bucket: bucket.clone(),
        },
        trace.clone(),
    )
}

#[cold]
pub fn missing_override_target(trace: &Trace, name: &Name) -> EvalError {
    EvalError::new(
        ErrorKind::MissingOverrideTarget { name: name.clone() },
        trace.clone(),
    )
}

#[cold]
pub fn required_attribute(trace: &Trace, name: &Name) -> EvalError {
    EvalError::new(ErrorKind::RequiredAttribute { name: name.clone() }, trace.clone())
}

#[cold]
pub fn program_error(trace: &Trace, message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::Program(message.into()), trace.clone())
}

#[cold]
pub fn state_violation(trace: &Trace, message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::StateViolation(message.into()), trace.clone())
}

#[cold]
pub fn fatal(trace: &Trace, message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::Fatal(message.into()), trace.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_override_message_names_attribute() {
        let error = missing_override_target(&Trace::EMPTY, &Name::string("x"));
        assert_eq!(
            error.to_string(),
            "Attempt to override non-existent attribute “x”."
        );
    }

    #[test]
    fn test_unresolved_lists_steps() {
        let error = unresolved_name(
            &Trace::EMPTY,
            "a.b".to_owned(),
            vec!["f1.a → f2".to_owned(), "f2.b → missing".to_owned()],
        );
        assert_eq!(
            error.to_string(),
            "Undefined name “a.b”. Lookup was as follows:\n  f1.a → f2\n  f2.b → missing"
        );
    }

    #[test]
    fn test_dispersion_messages() {
        let bucket = Name::string("g");
        let inactive = illegal_dispersion(&Trace::EMPTY, &bucket, DispersionFault::Inactive);
        assert!(inactive.to_string().contains("inactive frame"));
        let undeclared =
            illegal_dispersion(&Trace::EMPTY, &Name::ordinal(2), DispersionFault::Undeclared);
        assert!(undeclared.to_string().contains("Attribute(2)"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(fatal(&Trace::EMPTY, "boom").is_fatal());
        assert!(!program_error(&Trace::EMPTY, "boom").is_fatal());
    }
}
