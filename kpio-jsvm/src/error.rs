//! JavaScript error types.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::agent::Location;
use crate::token::Span;
use crate::value::Value;

/// Result type for JavaScript operations.
pub type JsResult<T> = Result<T, JsError>;

/// JavaScript error types.
///
/// The named variants are raised by the engine itself and become proper
/// error objects the moment they cross a statement boundary. `Thrown`
/// carries a script-visible exception value. `Terminated` is never visible
/// to script: `try`/`catch`/`finally` let it pass through untouched.
#[derive(Debug, Clone)]
pub enum JsError {
    /// Syntax error during parsing.
    SyntaxError(String),
    /// Type error during execution.
    TypeError(String),
    /// Reference error (undefined variable).
    ReferenceError(String),
    /// Range error (invalid array length, stack overflow, etc.).
    RangeError(String),
    /// URI error.
    UriError(String),
    /// Internal error.
    InternalError(String),
    /// Eval error.
    EvalError(String),
    /// Generic error.
    Error(String),
    /// An exception value unwinding through script.
    Thrown(Box<Thrown>),
    /// Execution was interrupted by the embedder.
    Terminated,
}

/// An exception value together with the place it was raised.
#[derive(Debug, Clone)]
pub struct Thrown {
    /// The thrown value.
    pub value: Value,
    /// Where the exception was raised, when known.
    pub location: Option<Location>,
}

impl JsError {
    /// Create a syntax error.
    pub fn syntax<S: Into<String>>(msg: S) -> Self {
        JsError::SyntaxError(msg.into())
    }

    /// Create a type error.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        JsError::TypeError(msg.into())
    }

    /// Create a reference error.
    pub fn reference<S: Into<String>>(msg: S) -> Self {
        JsError::ReferenceError(msg.into())
    }

    /// Create a range error.
    pub fn range<S: Into<String>>(msg: S) -> Self {
        JsError::RangeError(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        JsError::InternalError(msg.into())
    }

    /// Wrap a script value as an exception.
    pub fn thrown(value: Value, location: Option<Location>) -> Self {
        JsError::Thrown(Box::new(Thrown { value, location }))
    }

    /// Whether script can observe this error with `catch`.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, JsError::Terminated)
    }

    /// Get error name.
    pub fn name(&self) -> &'static str {
        match self {
            JsError::SyntaxError(_) => "SyntaxError",
            JsError::TypeError(_) => "TypeError",
            JsError::ReferenceError(_) => "ReferenceError",
            JsError::RangeError(_) => "RangeError",
            JsError::UriError(_) => "URIError",
            JsError::InternalError(_) => "InternalError",
            JsError::EvalError(_) => "EvalError",
            JsError::Error(_) => "Error",
            JsError::Thrown(_) => "Uncaught",
            JsError::Terminated => "Terminated",
        }
    }

    /// Get error message.
    pub fn message(&self) -> &str {
        match self {
            JsError::SyntaxError(msg)
            | JsError::TypeError(msg)
            | JsError::ReferenceError(msg)
            | JsError::RangeError(msg)
            | JsError::UriError(msg)
            | JsError::InternalError(msg)
            | JsError::EvalError(msg)
            | JsError::Error(msg) => msg,
            JsError::Thrown(_) => "exception thrown",
            JsError::Terminated => "execution terminated",
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsError::Thrown(thrown) => write!(f, "Uncaught {}", thrown.value),
            JsError::Terminated => f.write_str("execution terminated"),
            _ => write!(f, "{}: {}", self.name(), self.message()),
        }
    }
}

/// A syntax error found while tokenizing or parsing, with the position of
/// the offending token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// V8-style message, e.g. `Unexpected token (`.
    pub message: String,
    /// Offending token.
    pub span: Span,
}

impl ParseError {
    pub fn new<S: Into<String>>(message: S, span: Span) -> Self {
        ParseError {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} ({}:{})",
            self.message, self.span.line, self.span.column
        )
    }
}

impl From<ParseError> for JsError {
    fn from(err: ParseError) -> Self {
        JsError::SyntaxError(err.message)
    }
}

/// Result type for the lexer and parser.
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(feature = "std")]
impl std::error::Error for JsError {}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}
