//! Control-flow conformance harness
//!
//! Each case names a method of the generated `flow.Flow` class, the trace
//! points that method must record and how it must finish. The harness
//! builds the suite classes through one or both backends, runs every case
//! against a host `ControlBase` that follows the case's script, and
//! compares what was recorded.

#![warn(rust_2018_idioms)]

pub mod cases;
pub mod control;
pub mod dsl;
pub mod program;
pub mod runner;

pub use cases::{select, suite};
pub use control::ControlBase;
pub use dsl::{Action, FlowCase, Outcome, TracePoint};
pub use runner::{
    emit_class, render_class, run_suite, Artifacts, Backend, CaseReport, FlowRunner, Observation,
    SuiteReport,
};

use classgen_codegen::CodegenError;
use classgen_compiler::CompileError;
use classgen_vm::VmError;
use thiserror::Error;

/// Harness errors
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("case {case}: {message}")]
    Dsl { case: String, message: String },

    #[error("no flow class named {0}")]
    UnknownClass(String),

    #[error("Flow has no method {0}")]
    UnknownMethod(String),

    #[error("no case or method named {0}")]
    UnknownCase(String),

    #[error("{case} on the {backend} backend: expected {expected}, observed {observed}")]
    Mismatch {
        case: String,
        backend: Backend,
        expected: Observation,
        observed: Observation,
    },

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FlowResult<T> = Result<T, FlowError>;
