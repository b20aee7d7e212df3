//! IR Node Model
//!
//! A declarative tree: a [`ClassDecl`] owns its members in declaration order,
//! method bodies are ordered statement sequences, and expressions are plain
//! values built with the constructors on [`Expr`].

mod class;
mod expr;
mod stmt;
pub mod visit;

pub use class::{ClassDecl, FieldDecl, Member, MethodDecl, Modifiers, Param};
pub use expr::{BinaryOp, CallTarget, Expr, Literal};
pub use stmt::{can_complete, CatchClause, Stmt};
