//! Source compiler for classgen
//!
//! Compiles the subset of Java-like source that the source emitter produces
//! (one class per unit: fields, constructors, methods, the static block,
//! if/else, try/catch, blocks, locals, calls, `new`, field access and binary
//! operators) back into a class file. Parsing drives a fresh builder session,
//! so the output goes through the same validation and binary backend as
//! programmatically built classes.

#![warn(rust_2018_idioms)]

pub mod lexer;
pub mod parser;

use classgen_codegen::{Codegen, CodegenError, CodegenOptions};
use log::debug;
use std::path::Path;
use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{line}:{column}: unexpected input `{text}`")]
    Lex { line: u32, column: u32, text: String },

    #[error("{line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Output of compiling one unit
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClass {
    /// Fully-qualified class name
    pub name: String,
    /// Encoded class file
    pub bytes: Vec<u8>,
}

/// Compiler front end with the emission options applied to its output
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CodegenOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CodegenOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Compile one unit of source text
    pub fn compile_str(&self, source: &str) -> CompileResult<CompiledClass> {
        self.compile_with(source, self.options.clone())
    }

    /// Compile a source file; its file name is recorded in the metadata
    /// unless the options already name a source file
    pub fn compile_file(&self, path: &Path) -> CompileResult<CompiledClass> {
        let source = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut options = self.options.clone();
        if options.source_file.is_none() {
            options.source_file = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        }
        self.compile_with(&source, options)
    }

    fn compile_with(&self, source: &str, options: CodegenOptions) -> CompileResult<CompiledClass> {
        let tokens = lexer::tokenize(source)?;
        let mut cg = Codegen::with_options(options);
        let mut session = cg.session();
        let name = parser::Parser::new(tokens, &mut session).compilation_unit()?;
        let bytes = session.emit_binary()?;
        debug!("compiled {} ({} bytes)", name, bytes.len());
        Ok(CompiledClass { name, bytes })
    }
}

/// Compile source text with default options
pub fn compile(source: &str) -> CompileResult<CompiledClass> {
    Compiler::new().compile_str(source)
}
