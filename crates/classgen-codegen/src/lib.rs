//! Programmatic class construction
//!
//! A [`Codegen`] context owns the type registry, the registered interceptors
//! and the emission options. Classes are assembled through a [`Session`],
//! pass once through the interceptor pipeline, and can then be rendered as
//! source text or encoded as a class file.
//!
//! ```ignore
//! let mut cg = Codegen::new();
//! let mut s = cg.session();
//! s.package("demo")?;
//! s.class(Modifiers::PUBLIC, "Flow", None)?;
//! s.method(Modifiers::PUBLIC, &TypeRef::int(), "answer")?;
//! s.body()?;
//! s.ret(Some(Expr::int(42)))?;
//! s.end()?;
//! s.end()?;
//! let bytes = s.emit_binary()?;
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod intercept;
pub mod ir;
pub mod session;
pub mod types;
pub mod validate;

pub use config::{CodegenOptions, ConfigError};
pub use context::Codegen;
pub use emit::{Artifact, Target};
pub use error::{
    CodegenError, CodegenResult, HookError, HookResult, InterceptionPoint, TypeResolutionError,
};
pub use intercept::{
    ClassInterceptor, ClassView, FieldRefView, FieldReferenceInterceptor, Interceptor,
    MethodInterceptor, MethodView,
};
pub use ir::{
    BinaryOp, CallTarget, CatchClause, ClassDecl, Expr, FieldDecl, Literal, Member, MethodDecl,
    Modifiers, Param, Stmt,
};
pub use session::Session;
pub use types::{ImportScope, RefKind, TypeKind, TypeRef, TypeRegistry};
