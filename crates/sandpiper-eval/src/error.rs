//! Interpreter errors.
//!
//! Script exceptions travel as `Error::Exception` and propagate with `?`
//! until a `try` statement catches them or they reach the session, which
//! hands them to the diagnostics translator.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::value::{ExcClass, ExceptionValue, Value};

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub name: String,
    pub line: usize,
}

/// A raised script exception and the stack captured where it was raised.
#[derive(Debug, Clone)]
pub struct Raised {
    pub exc: Rc<ExceptionValue>,
    /// Outermost frame first. Empty until the exception leaves the statement
    /// that raised it.
    pub traceback: Vec<TraceFrame>,
}

impl Raised {
    pub fn new(exc: Rc<ExceptionValue>) -> Self {
        Self {
            exc,
            traceback: Vec::new(),
        }
    }

    pub fn class(&self) -> ExcClass {
        self.exc.class
    }

    pub fn message(&self) -> String {
        self.exc.message()
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.exc.class.name())
        } else {
            write!(f, "{}: {}", self.exc.class.name(), message)
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A script-level exception.
    #[error("{0}")]
    Exception(Raised),

    /// The host tore the session down while an input request was pending.
    #[error("input request abandoned")]
    Abandoned,
}

impl Error {
    /// Raise `class` with a single string argument.
    pub fn exception(class: ExcClass, message: impl Into<String>) -> Self {
        Self::raise(ExceptionValue::new(class, vec![Value::from(message.into())]))
    }

    pub fn raise(exc: ExceptionValue) -> Self {
        Error::Exception(Raised::new(Rc::new(exc)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exception(ExcClass::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::exception(ExcClass::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::exception(ExcClass::IndexError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::exception(ExcClass::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::exception(ExcClass::OverflowError, "integer overflow")
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::exception(ExcClass::RuntimeError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::exception(ExcClass::NameError, format!("name '{}' is not defined", name))
    }

    pub fn attribute_error(value: &Value, attr: &str) -> Self {
        Self::exception(
            ExcClass::AttributeError,
            format!("'{}' object has no attribute '{}'", value.type_name(), attr),
        )
    }

    /// `KeyError` carries the key itself, so `str()` shows its repr.
    pub fn key_error(key: Value) -> Self {
        Self::raise(ExceptionValue::new(ExcClass::KeyError, vec![key]))
    }

    /// The exception class, if this is a script exception.
    pub fn class(&self) -> Option<ExcClass> {
        match self {
            Error::Exception(raised) => Some(raised.class()),
            Error::Abandoned => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_class_and_message() {
        let err = Error::value_error("bad value");
        assert_eq!(err.to_string(), "ValueError: bad value");
        assert_eq!(err.class(), Some(ExcClass::ValueError));
    }

    #[test]
    fn test_display_without_message() {
        let err = Error::raise(ExceptionValue::new(ExcClass::StopIteration, vec![]));
        assert_eq!(err.to_string(), "StopIteration");
    }

    #[test]
    fn test_key_error_shows_repr() {
        assert_eq!(Error::key_error(Value::str("k")).to_string(), "KeyError: 'k'");
    }

    #[test]
    fn test_abandoned_has_no_class() {
        assert_eq!(Error::Abandoned.class(), None);
    }
}
