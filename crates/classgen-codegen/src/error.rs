//! Code generation errors

use classgen_bytecode::VerifyError;
use std::fmt;
use thiserror::Error;

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Result type returned by interceptor hooks
pub type HookResult = Result<(), HookError>;

/// A type name could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve type `{name}`: {reason}")]
pub struct TypeResolutionError {
    pub name: String,
    pub reason: String,
}

impl TypeResolutionError {
    pub(crate) fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by an interceptor hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// The three interception points, in invocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptionPoint {
    Class,
    Method,
    FieldReference,
}

impl fmt::Display for InterceptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Class => "on_class",
            Self::Method => "on_method",
            Self::FieldReference => "on_field_reference",
        })
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    TypeResolution(#[from] TypeResolutionError),

    #[error("illegal scope: {message}")]
    IllegalScope { message: String },

    #[error("malformed program in {location}: {message}")]
    MalformedProgram { location: String, message: String },

    #[error("incomplete program: open scopes [{}]", open.join(", "))]
    IncompleteProgram { open: Vec<String> },

    #[error("interceptor `{interceptor}` failed at {point} for {target}: {source}")]
    InterceptorFailure {
        point: InterceptionPoint,
        target: String,
        interceptor: String,
        source: HookError,
    },

    #[error("too many {what} (max {limit})")]
    LimitExceeded { what: &'static str, limit: usize },

    #[error("emitted code failed verification: {0}")]
    Verification(#[from] VerifyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub(crate) fn illegal_scope(message: impl Into<String>) -> Self {
        Self::IllegalScope {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedProgram {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Whether this error poisons the session that raised it
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::TypeResolution(_)
                | Self::IllegalScope { .. }
                | Self::MalformedProgram { .. }
                | Self::IncompleteProgram { .. }
                | Self::InterceptorFailure { .. }
        )
    }
}
