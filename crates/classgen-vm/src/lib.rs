//! classgen host runtime
//!
//! This crate loads class files produced by the binary emitter (or by the
//! source compiler) and executes them:
//! - Class loader with verification and static initialisation
//! - Bytecode interpreter with exception-table unwinding
//! - Built-in `java.lang` classes (`Object`, `Throwable` and its subclasses)
//! - Host-native classes implemented in Rust

#![warn(rust_2018_idioms)]

pub mod builtin;
pub mod class;
pub mod interpreter;
pub mod loader;
pub mod native;
pub mod stack;
pub mod value;

pub use class::{ClassHandle, ClassRegistry, RuntimeClass};
pub use interpreter::Vm;
pub use loader::ClassLoader;
pub use native::{Completion, NativeClass};
pub use stack::CallFrame;
pub use value::{Object, ObjectRef, Value};

use classgen_bytecode::{ClassFileError, DecodeError, VerifyError};

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Call depth limit reached
    #[error("Stack overflow")]
    StackOverflow,

    /// Operand stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Class file could not be decoded
    #[error("Malformed class file: {0}")]
    ClassFormat(#[from] ClassFileError),

    /// Class file rejected by the verifier
    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    /// Loaded bytes describe a different class than requested
    #[error("Class name mismatch: expected {expected}, found {found}")]
    NameMismatch { expected: String, found: String },

    /// Class already defined
    #[error("Duplicate class: {0}")]
    DuplicateClass(String),

    /// Referenced class is not loaded
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// No method with this name and arity along the superclass chain
    #[error("No such method: {class}.{name} with {argc} argument(s)")]
    NoSuchMethod {
        class: String,
        name: String,
        argc: usize,
    },

    /// No field with this name
    #[error("No such field: {class}.{name}")]
    NoSuchField { class: String, name: String },

    /// `new` on an abstract class
    #[error("Cannot instantiate abstract class {0}")]
    Instantiation(String),

    /// A managed exception reached the host boundary
    #[error("Uncaught exception {class}: {message}")]
    UncaughtException { class: String, message: String },
}

impl From<DecodeError> for VmError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InvalidOpcode(byte, _) => VmError::InvalidOpcode(byte),
            other => VmError::RuntimeError(other.to_string()),
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
