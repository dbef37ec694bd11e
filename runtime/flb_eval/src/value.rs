//! Runtime values.

use crate::frame::Frame;
use crate::lookup::LookupHandler;
use crate::template::Template;
use flb_ir::{type_mismatch, EvalError, Name, Trace};
use std::fmt;
use std::sync::Arc;

/// A boxed runtime value.
///
/// Cloning is cheap: text, binary data, frames and templates are shared.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bin(Arc<[u8]>),
    Frame(Frame),
    Template(Template),
    LookupHandler(LookupHandler),
}

impl Value {
    /// Name of the variant, as used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::Bin(_) => "Bin",
            Value::Frame(_) => "Frame",
            Value::Template(_) => "Template",
            Value::LookupHandler(_) => "LookupHandler",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self, trace: &Trace) -> Result<bool, EvalError> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(type_mismatch(trace, "Bool", other.type_name())),
        }
    }

    pub fn as_int(&self, trace: &Trace) -> Result<i64, EvalError> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(type_mismatch(trace, "Int", other.type_name())),
        }
    }

    /// The value as a float; integers are widened.
    #[allow(clippy::cast_precision_loss, reason = "integer widening matches float arithmetic")]
    pub fn as_float(&self, trace: &Trace) -> Result<f64, EvalError> {
        match self {
            Value::Float(value) => Ok(*value),
            Value::Int(value) => Ok(*value as f64),
            other => Err(type_mismatch(trace, "Float", other.type_name())),
        }
    }

    pub fn as_str(&self, trace: &Trace) -> Result<&Arc<str>, EvalError> {
        match self {
            Value::Str(value) => Ok(value),
            other => Err(type_mismatch(trace, "Str", other.type_name())),
        }
    }

    pub fn as_frame(&self, trace: &Trace) -> Result<&Frame, EvalError> {
        match self {
            Value::Frame(frame) => Ok(frame),
            other => Err(type_mismatch(trace, "Frame", other.type_name())),
        }
    }

    pub fn as_template(&self, trace: &Trace) -> Result<&Template, EvalError> {
        match self {
            Value::Template(template) => Ok(template),
            other => Err(type_mismatch(trace, "Template", other.type_name())),
        }
    }

    /// Interpret the value as an attribute name: integers become ordinals,
    /// strings become string names.
    pub fn as_name(&self, trace: &Trace) -> Result<Name, EvalError> {
        match self {
            Value::Int(ordinal) => Ok(Name::ordinal(*ordinal)),
            Value::Str(name) => Ok(Name::Str(Arc::clone(name))),
            other => Err(type_mismatch(trace, "Int or Str", other.type_name())),
        }
    }
}

impl From<&Name> for Value {
    fn from(name: &Name) -> Self {
        match name {
            Name::Ordinal(ordinal) => Value::Int(*ordinal),
            Name::Str(name) => Value::Str(Arc::clone(name)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bin(Arc::from(value))
    }
}

impl From<Frame> for Value {
    fn from(frame: Frame) -> Self {
        Value::Frame(frame)
    }
}

impl From<Template> for Value {
    fn from(template: Template) -> Self {
        Value::Template(template)
    }
}

impl From<LookupHandler> for Value {
    fn from(handler: LookupHandler) -> Self {
        Value::LookupHandler(handler)
    }
}

/// Frames, templates and handlers compare by identity; floats compare
/// numerically, so `NaN` is unequal to itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bin(a), Value::Bin(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => a.same(b),
            (Value::LookupHandler(a), Value::LookupHandler(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
            Value::Bin(value) => write!(f, "<{} bytes>", value.len()),
            Value::Frame(frame) => write!(f, "Frame {}", frame.id()),
            Value::Template(_) => f.write_str("Template"),
            Value::LookupHandler(handler) => write!(f, "LookupHandler {}", handler.description()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(value) => write!(f, "Str({value:?})"),
            Value::Bin(value) => write!(f, "Bin({} bytes)", value.len()),
            Value::Frame(frame) => write!(f, "{frame:?}"),
            Value::Template(template) => write!(f, "{template:?}"),
            Value::LookupHandler(handler) => write!(f, "{handler:?}"),
            Value::Null => f.write_str("Null"),
            Value::Bool(value) => write!(f, "Bool({value})"),
            Value::Int(value) => write!(f, "Int({value})"),
            Value::Float(value) => write!(f, "Float({value})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests unwrap expected errors")]
mod tests {
    use super::*;
    use flb_ir::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "Null");
        assert_eq!(Value::from(1_i64).type_name(), "Int");
        assert_eq!(Value::from("x").type_name(), "Str");
        assert_eq!(Value::from(vec![1_u8]).type_name(), "Bin");
    }

    #[test]
    fn test_accessor_reports_type_mismatch() {
        let error = Value::from("text").as_int(&Trace::EMPTY).unwrap_err();
        assert_eq!(
            error.kind,
            ErrorKind::TypeMismatch {
                expected: "Int".to_owned(),
                got: "Str".to_owned(),
            }
        );
        assert_eq!(error.to_string(), "Expected Int, but got Str.");
    }

    #[test]
    fn test_int_widens_to_float() {
        assert_eq!(Value::from(3_i64).as_float(&Trace::EMPTY).ok(), Some(3.0));
        assert!(Value::from(true).as_float(&Trace::EMPTY).is_err());
    }

    #[test]
    fn test_names_convert_both_ways() {
        let trace = Trace::EMPTY;
        assert_eq!(Value::from(4_i64).as_name(&trace).ok(), Some(Name::ordinal(4)));
        assert_eq!(Value::from("a").as_name(&trace).ok(), Some(Name::string("a")));
        assert_eq!(Value::from(&Name::string("b")), Value::from("b"));
        assert!(Value::Null.as_name(&trace).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "Null");
        assert_eq!(Value::from(vec![0_u8; 3]).to_string(), "<3 bytes>");
    }
}
