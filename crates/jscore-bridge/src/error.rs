//! Error types for bridge operations
//!
//! Every native failure maps onto exactly one variant. Script failures keep
//! the thrown value alive so callers can inspect it, alongside the details
//! pulled out of it (error type, message, location, stack).

use std::fmt;
use thiserror::Error;

use crate::value::JsValue;

/// Result type alias for bridge operations
pub type JscResult<T> = Result<T, JscError>;

#[derive(Debug, Error)]
pub enum JscError {
    /// The frame had no usable execution context
    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    /// Script threw or failed to compile
    #[error("{0}")]
    ScriptEvaluation(Box<ScriptException>),

    /// The engine rejected a JSON document
    #[error("JSON parse error: {message}")]
    JsonParse { message: String },

    /// The bridge (or the bridge that minted a value) has been disposed
    #[error("Context bridge has been disposed")]
    Disposed,

    /// A value was used with a context other than the one that produced it
    #[error("Value belongs to a different JavaScript context")]
    ContextMismatch,

    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// serde marshaling between host values and JSON text
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An engine call returned null where a value was required
    #[error("Internal JSC error: {operation} returned null")]
    NullPointer { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JscError {
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn null_pointer(operation: impl Into<String>) -> Self {
        Self::NullPointer {
            operation: operation.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wrap a thrown value together with its extracted details
    pub(crate) fn script(exception: JsValue) -> Self {
        let details = ExceptionDetails::extract(&exception);
        Self::ScriptEvaluation(Box::new(ScriptException { exception, details }))
    }

    /// Check if this is a user-facing script error
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::ScriptEvaluation(_))
    }

    /// The thrown value, for script errors
    pub fn exception(&self) -> Option<&JsValue> {
        match self {
            Self::ScriptEvaluation(e) => Some(&e.exception),
            _ => None,
        }
    }

    pub fn exception_details(&self) -> Option<&ExceptionDetails> {
        match self {
            Self::ScriptEvaluation(e) => Some(&e.details),
            _ => None,
        }
    }

    /// Error type name (e.g. "TypeError", "SyntaxError")
    pub fn error_type(&self) -> &str {
        match self {
            Self::ScriptEvaluation(e) => &e.details.error_type,
            Self::InvalidFrame { .. } => "InvalidFrameError",
            Self::JsonParse { .. } => "JSONParseError",
            Self::Disposed => "DisposedError",
            Self::ContextMismatch => "ContextMismatchError",
            Self::TypeError { .. } => "TypeError",
            Self::Json(_) => "JsonError",
            Self::NullPointer { .. } | Self::Internal(_) => "InternalError",
        }
    }
}

/// A thrown JavaScript value and what could be learned from it
#[derive(Debug)]
pub struct ScriptException {
    pub exception: JsValue,
    pub details: ExceptionDetails,
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.details.fmt(f)
    }
}

/// Structured view of a thrown value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionDetails {
    pub error_type: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
}

impl ExceptionDetails {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
            stack: None,
        }
    }

    /// Pull name, message, stack and location out of a thrown value.
    ///
    /// JSC reports location as `sourceURL`/`line`/`column`; other engines'
    /// `fileName`/`lineNumber`/`columnNumber` are accepted as fallbacks.
    /// Primitive throws (`throw 42`) become an `Error` with the value's string form.
    pub(crate) fn extract(exception: &JsValue) -> Self {
        let fallback = || exception.to_string().unwrap_or_else(|_| "Unknown error".into());

        let Ok(object) = exception.to_object() else {
            return Self::new("Error", fallback());
        };

        let string_prop = |name: &str| {
            object
                .get(name)
                .ok()
                .filter(|v| !v.is_undefined() && !v.is_null())
                .and_then(|v| v.to_string().ok())
        };
        let number_prop = |name: &str| {
            object
                .get(name)
                .ok()
                .and_then(|v| v.as_number())
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as u32)
        };

        Self {
            error_type: string_prop("name").unwrap_or_else(|| "Error".into()),
            message: string_prop("message").unwrap_or_else(fallback),
            file: string_prop("sourceURL").or_else(|| string_prop("fileName")),
            line: number_prop("line").or_else(|| number_prop("lineNumber")),
            column: number_prop("column").or_else(|| number_prop("columnNumber")),
            stack: string_prop("stack"),
        }
    }

    /// (file, line, column) if any location is known
    pub fn location(&self) -> Option<(Option<&str>, Option<u32>, Option<u32>)> {
        if self.file.is_none() && self.line.is_none() {
            return None;
        }
        Some((self.file.as_deref(), self.line, self.column))
    }
}

impl fmt::Display for ExceptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)?;
        match (&self.file, self.line, self.column) {
            (Some(file), Some(l), Some(c)) => write!(f, " at {}:{}:{}", file, l, c),
            (Some(file), Some(l), None) => write!(f, " at {}:{}", file, l),
            (None, Some(l), Some(c)) => write!(f, " at line {}:{}", l, c),
            (None, Some(l), None) => write!(f, " at line {}", l),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_display() {
        let details = ExceptionDetails::new("TypeError", "undefined is not a function");
        assert_eq!(details.to_string(), "TypeError: undefined is not a function");
    }

    #[test]
    fn test_details_display_with_location() {
        let details = ExceptionDetails {
            file: Some("script.js".into()),
            line: Some(10),
            column: Some(5),
            stack: Some("foo@script.js:10:5".into()),
            ..ExceptionDetails::new("ReferenceError", "x is not defined")
        };

        assert_eq!(
            details.to_string(),
            "ReferenceError: x is not defined at script.js:10:5"
        );
        let (file, line, col) = details.location().unwrap();
        assert_eq!(file, Some("script.js"));
        assert_eq!(line, Some(10));
        assert_eq!(col, Some(5));
    }

    #[test]
    fn test_location_none() {
        let details = ExceptionDetails::new("Error", "boom");
        assert!(details.location().is_none());
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let json = JscError::JsonParse {
            message: "bad".into(),
        };
        assert_eq!(json.error_type(), "JSONParseError");
        assert!(!json.is_script_error());
        assert!(json.exception().is_none());

        assert_eq!(JscError::Disposed.error_type(), "DisposedError");
        assert_eq!(
            JscError::invalid_frame("not loaded").to_string(),
            "Invalid frame: not loaded"
        );
    }

    #[test]
    fn test_type_error() {
        let err = JscError::type_error("object", "number");
        assert!(err.to_string().contains("expected object"));
        assert!(err.to_string().contains("got number"));
    }

    #[test]
    fn test_null_pointer() {
        let err = JscError::null_pointer("JSEvaluateScript");
        assert!(err.to_string().contains("JSEvaluateScript"));
        assert!(err.to_string().contains("returned null"));
    }
}
