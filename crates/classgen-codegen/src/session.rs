//! Construction session
//!
//! A [`Session`] drives the scope stack of one class:
//!
//! ```text
//! package -> class -> field
//!                  -> method/constructor -> body -> if/else, try/catch, block
//!                  -> static initializer
//! ```
//!
//! Open operations push a frame and `end()` pops it, appending the finished
//! node to its parent. Closing the class validates it and runs the
//! interceptor pipeline; afterwards the class can be emitted any number of
//! times through either backend.
//!
//! A structural error poisons the session: every later call fails with
//! `IllegalScope` naming the first failure.

use crate::context::Codegen;
use crate::emit::{self, Artifact, Target};
use crate::error::{CodegenError, CodegenResult};
use crate::intercept::{field_reference, run_pipeline};
use crate::ir::{CatchClause, ClassDecl, Expr, FieldDecl, Member, MethodDecl, Modifiers, Param, Stmt};
use crate::types::{RefKind, TypeKind, TypeRef, TypeRegistry};
use crate::validate::{check_new_field, validate_class, validate_method};
use classgen_bytecode::ClassFile;
use log::{debug, trace};
use std::cell::RefCell;
use std::io::Write;

enum Frame {
    Class,
    Method(MethodDecl),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
        in_else: bool,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
    },
    Block(Vec<Stmt>),
    StaticInit(Vec<Stmt>),
}

impl Frame {
    fn describe(&self, class: Option<&ClassDecl>) -> String {
        match self {
            Frame::Class => match class {
                Some(class) => format!("class {}", class.name()),
                None => "class".to_string(),
            },
            Frame::Method(decl) if decl.body.is_some() => {
                format!("body of {}", decl.display_name())
            }
            Frame::Method(decl) => format!("header of {}", decl.display_name()),
            Frame::If { in_else: false, .. } => "if".to_string(),
            Frame::If { in_else: true, .. } => "else".to_string(),
            Frame::Try { catches, .. } if catches.is_empty() => "try".to_string(),
            Frame::Try { .. } => "catch".to_string(),
            Frame::Block(_) => "block".to_string(),
            Frame::StaticInit(_) => "static initializer".to_string(),
        }
    }

    /// Statement list new statements are appended to, if this frame accepts statements
    fn statements(&mut self) -> Option<&mut Vec<Stmt>> {
        match self {
            Frame::Method(decl) => decl.body.as_mut(),
            Frame::If {
                then_branch,
                else_branch,
                in_else,
                ..
            } => Some(if *in_else { else_branch } else { then_branch }),
            Frame::Try { body, catches } => Some(match catches.last_mut() {
                Some(clause) => &mut clause.body,
                None => body,
            }),
            Frame::Block(stmts) | Frame::StaticInit(stmts) => Some(stmts),
            Frame::Class => None,
        }
    }
}

/// Builder for one class; see the module documentation
pub struct Session<'a> {
    cg: &'a mut Codegen,
    frames: Vec<Frame>,
    class: Option<ClassDecl>,
    finished: Option<ClassDecl>,
    poisoned: RefCell<Option<String>>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(cg: &'a mut Codegen) -> Self {
        debug!("session started");
        Self {
            cg,
            frames: Vec::new(),
            class: None,
            finished: None,
            poisoned: RefCell::new(None),
        }
    }

    fn guard<T>(&mut self, op: impl FnOnce(&mut Self) -> CodegenResult<T>) -> CodegenResult<T> {
        self.check_poisoned()?;
        let result = op(self);
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    fn poison(&self, err: &CodegenError) {
        if err.is_structural() {
            debug!("session poisoned: {}", err);
            *self.poisoned.borrow_mut() = Some(err.to_string());
        }
    }

    fn check_poisoned(&self) -> CodegenResult<()> {
        match self.poisoned.borrow().as_ref() {
            Some(cause) => Err(CodegenError::illegal_scope(format!(
                "session aborted by an earlier error: {}",
                cause
            ))),
            None => Ok(()),
        }
    }

    fn top_description(&self) -> String {
        match self.frames.last() {
            Some(frame) => frame.describe(self.class.as_ref()),
            None if self.finished.is_some() => "finished class".to_string(),
            None => "package".to_string(),
        }
    }

    fn misplaced(&self, op: &str, expected: &str) -> CodegenError {
        CodegenError::illegal_scope(format!(
            "`{}` requires {}, found {}",
            op,
            expected,
            self.top_description()
        ))
    }

    fn expect_class_scope(&self, op: &str) -> CodegenResult<()> {
        match self.frames.last() {
            Some(Frame::Class) => Ok(()),
            _ => Err(self.misplaced(op, "an open class scope")),
        }
    }

    fn class_mut(&mut self) -> CodegenResult<&mut ClassDecl> {
        self.class
            .as_mut()
            .ok_or_else(|| CodegenError::illegal_scope("no class is open"))
    }

    fn push_stmt(&mut self, op: &str, stmt: Stmt) -> CodegenResult<()> {
        self.expect_statement_scope(op)?;
        trace!("{} in {}", op, self.top_description());
        self.append_to_parent(stmt)
    }

    // ===== Types =====

    /// Type registry of the owning context
    pub fn registry(&mut self) -> &mut TypeRegistry {
        &mut self.cg.registry
    }

    /// Resolve a type written in source form, such as `int`, `demo.Flow` or `long[]`
    pub fn ty(&mut self, name: &str) -> CodegenResult<TypeRef> {
        self.guard(|s| Ok(s.cg.registry.type_named(name)?))
    }

    pub fn array_of(&mut self, element: &TypeRef) -> CodegenResult<TypeRef> {
        self.guard(|s| Ok(s.cg.registry.array_of(element)?))
    }

    // ===== Declarations =====

    /// Set the package of the class; must precede `class`
    pub fn package(&mut self, name: &str) -> CodegenResult<()> {
        self.guard(|s| {
            if s.class.is_some() || s.finished.is_some() {
                return Err(CodegenError::illegal_scope(
                    "package must be declared before the class",
                ));
            }
            s.cg.registry.set_package(Some(name))?;
            Ok(())
        })
    }

    /// Import a type into the unit being built
    pub fn import(&mut self, name: &str) -> CodegenResult<TypeRef> {
        self.guard(|s| {
            if s.finished.is_some() {
                return Err(CodegenError::illegal_scope("class is already finished"));
            }
            let ty = s.cg.registry.import(name)?;
            let scope = s.cg.registry.scope().clone();
            if let Some(class) = s.class.as_mut() {
                class.scope = scope;
            }
            Ok(ty)
        })
    }

    /// Open the class scope; a simple name is qualified with the package
    pub fn class(
        &mut self,
        modifiers: Modifiers,
        name: &str,
        superclass: Option<&TypeRef>,
    ) -> CodegenResult<TypeRef> {
        self.guard(|s| {
            if !s.frames.is_empty() || s.class.is_some() || s.finished.is_some() {
                return Err(CodegenError::illegal_scope(
                    "a session builds exactly one class",
                ));
            }
            let qualified = match (&s.cg.registry.scope().package, name.contains('.')) {
                (Some(package), false) => format!("{}.{}", package, name),
                _ => name.to_string(),
            };
            let ty = s.cg.registry.resolve(&qualified, RefKind::Named)?;
            let superclass = match superclass {
                Some(sup) if !matches!(sup.kind(), TypeKind::Named) => {
                    return Err(CodegenError::malformed(
                        qualified,
                        format!("cannot extend `{}`", sup),
                    ));
                }
                Some(sup) => s.cg.registry.canonical(sup),
                None => s.cg.registry.object(),
            };
            debug!("class {} opened", ty);
            s.class = Some(ClassDecl::new(
                modifiers,
                ty.clone(),
                superclass,
                s.cg.registry.scope().clone(),
            ));
            s.frames.push(Frame::Class);
            Ok(ty)
        })
    }

    /// Declare a field and return an expression referring to it
    pub fn field(&mut self, modifiers: Modifiers, ty: &TypeRef, name: &str) -> CodegenResult<Expr> {
        self.guard(|s| s.add_field(FieldDecl::new(modifiers, ty.clone(), name)))
    }

    /// Declare a field with an initializer
    pub fn field_init(
        &mut self,
        modifiers: Modifiers,
        ty: &TypeRef,
        name: &str,
        init: Expr,
    ) -> CodegenResult<Expr> {
        self.guard(|s| s.add_field(FieldDecl::new(modifiers, ty.clone(), name).with_init(init)))
    }

    fn add_field(&mut self, field: FieldDecl) -> CodegenResult<Expr> {
        self.expect_class_scope("field")?;
        let class = self.class_mut()?;
        check_new_field(class, &field.name)?;
        if field.ty.is_void() {
            return Err(CodegenError::malformed(
                format!("{}.{}", class.name(), field.name),
                "field of type void",
            ));
        }
        trace!("field {}.{}", class.name(), field.name);
        let reference = field_reference(&class.ty, &field);
        class.members.push(Member::Field(field));
        Ok(reference)
    }

    /// Open a method header; pass `void` as `return_type` for void methods
    pub fn method(
        &mut self,
        modifiers: Modifiers,
        return_type: &TypeRef,
        name: &str,
    ) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_class_scope("method")?;
            let decl = MethodDecl::method(modifiers, Some(return_type.clone()), name);
            trace!("method {} opened", decl.display_name());
            s.frames.push(Frame::Method(decl));
            Ok(())
        })
    }

    /// Open a constructor header
    pub fn constructor(&mut self, modifiers: Modifiers) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_class_scope("constructor")?;
            s.frames
                .push(Frame::Method(MethodDecl::constructor(modifiers)));
            Ok(())
        })
    }

    /// Declare a parameter of the open method header
    pub fn arg(&mut self, ty: &TypeRef, name: &str) -> CodegenResult<Expr> {
        self.guard(|s| match s.frames.last_mut() {
            Some(Frame::Method(decl)) if decl.body.is_none() => {
                decl.params.push(Param {
                    name: name.to_string(),
                    ty: ty.clone(),
                });
                Ok(Expr::var(name))
            }
            _ => Err(s.misplaced("arg", "an open method header")),
        })
    }

    /// Start the body of the open method header
    pub fn body(&mut self) -> CodegenResult<()> {
        self.guard(|s| match s.frames.last_mut() {
            Some(Frame::Method(decl)) if decl.body.is_none() => {
                if decl.is_abstract() {
                    return Err(CodegenError::illegal_scope(format!(
                        "abstract {} cannot have a body",
                        decl.display_name()
                    )));
                }
                decl.body = Some(Vec::new());
                Ok(())
            }
            _ => Err(s.misplaced("body", "an open method header")),
        })
    }

    /// Open the static initializer of the class
    pub fn static_init(&mut self) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_class_scope("static_init")?;
            s.frames.push(Frame::StaticInit(Vec::new()));
            Ok(())
        })
    }

    // ===== Control flow =====

    /// Open an `if` with its then branch
    pub fn if_(&mut self, cond: Expr) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_statement_scope("if_")?;
            s.frames.push(Frame::If {
                cond,
                then_branch: Vec::new(),
                else_branch: Vec::new(),
                in_else: false,
            });
            Ok(())
        })
    }

    /// Switch the open `if` to its else branch
    pub fn else_(&mut self) -> CodegenResult<()> {
        self.guard(|s| match s.frames.last_mut() {
            Some(Frame::If { in_else, .. }) if !*in_else => {
                *in_else = true;
                Ok(())
            }
            Some(Frame::If { .. }) => Err(CodegenError::illegal_scope(
                "`else_` called twice for the same if",
            )),
            _ => Err(s.misplaced("else_", "an open if")),
        })
    }

    /// Open a `try` block
    pub fn try_(&mut self) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_statement_scope("try_")?;
            s.frames.push(Frame::Try {
                body: Vec::new(),
                catches: Vec::new(),
            });
            Ok(())
        })
    }

    /// Open a catch branch of the open `try`, returning the exception variable
    pub fn catch_(&mut self, ty: &TypeRef, name: &str) -> CodegenResult<Expr> {
        self.guard(|s| match s.frames.last_mut() {
            Some(Frame::Try { catches, .. }) => {
                catches.push(CatchClause {
                    ty: ty.clone(),
                    var: name.to_string(),
                    body: Vec::new(),
                });
                Ok(Expr::var(name))
            }
            _ => Err(s.misplaced("catch_", "an open try")),
        })
    }

    /// Open a nested statement block
    pub fn block(&mut self) -> CodegenResult<()> {
        self.guard(|s| {
            s.expect_statement_scope("block")?;
            s.frames.push(Frame::Block(Vec::new()));
            Ok(())
        })
    }

    fn expect_statement_scope(&self, op: &str) -> CodegenResult<()> {
        match self.frames.last() {
            Some(Frame::Class) | Some(Frame::Method(MethodDecl { body: None, .. })) | None => {
                Err(self.misplaced(op, "an open method body or statement block"))
            }
            Some(_) => Ok(()),
        }
    }

    /// Close the innermost open scope
    pub fn end(&mut self) -> CodegenResult<()> {
        self.guard(|s| {
            let frame = s
                .frames
                .pop()
                .ok_or_else(|| CodegenError::illegal_scope("`end` with no open scope"))?;
            match frame {
                Frame::Class => s.finish_class(),
                Frame::Method(decl) => {
                    if decl.body.is_none() && !decl.is_abstract() {
                        return Err(CodegenError::illegal_scope(format!(
                            "{} has no body and is not abstract",
                            decl.display_name()
                        )));
                    }
                    let class = s.class_mut()?;
                    validate_method(class, &decl)?;
                    trace!("method {} closed", decl.display_name());
                    class.members.push(Member::Method(decl));
                    Ok(())
                }
                Frame::If {
                    cond,
                    then_branch,
                    else_branch,
                    ..
                } => s.append_to_parent(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                }),
                Frame::Try { body, catches } => {
                    if catches.is_empty() {
                        return Err(CodegenError::illegal_scope("try without catch clauses"));
                    }
                    s.append_to_parent(Stmt::TryCatch { body, catches })
                }
                Frame::Block(stmts) => s.append_to_parent(Stmt::Block(stmts)),
                Frame::StaticInit(stmts) => {
                    s.class_mut()?.static_init.extend(stmts);
                    Ok(())
                }
            }
        })
    }

    fn append_to_parent(&mut self, stmt: Stmt) -> CodegenResult<()> {
        match self.frames.last_mut().and_then(Frame::statements) {
            Some(stmts) => {
                stmts.push(stmt);
                Ok(())
            }
            None => Err(CodegenError::illegal_scope("statement scope has no parent body")),
        }
    }

    fn finish_class(&mut self) -> CodegenResult<()> {
        let mut class = self
            .class
            .take()
            .ok_or_else(|| CodegenError::illegal_scope("no class is open"))?;
        validate_class(&class)?;
        run_pipeline(&mut class, &mut self.cg.registry, &mut self.cg.interceptors)?;
        validate_class(&class)?;
        debug!(
            "class {} finished with {} member(s)",
            class.name(),
            class.members.len()
        );
        self.finished = Some(class);
        Ok(())
    }

    // ===== Statements =====

    /// Expression statement; only calls and allocations are accepted
    pub fn expr(&mut self, expr: Expr) -> CodegenResult<()> {
        self.guard(|s| s.push_stmt("expr", Stmt::Expr(expr)))
    }

    pub fn assign(&mut self, target: Expr, value: Expr) -> CodegenResult<()> {
        self.guard(|s| s.push_stmt("assign", Stmt::Assign { target, value }))
    }

    /// Declare a local variable and return a reference to it
    pub fn define(&mut self, ty: &TypeRef, name: &str, value: Expr) -> CodegenResult<Expr> {
        self.guard(|s| {
            s.push_stmt(
                "define",
                Stmt::Define {
                    ty: ty.clone(),
                    name: name.to_string(),
                    value,
                },
            )?;
            Ok(Expr::var(name))
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> CodegenResult<()> {
        self.guard(|s| s.push_stmt("ret", Stmt::Return(value)))
    }

    pub fn throw(&mut self, value: Expr) -> CodegenResult<()> {
        self.guard(|s| s.push_stmt("throw", Stmt::Throw(value)))
    }

    // ===== Emission =====

    /// Scopes still open, innermost last
    pub fn open_scopes(&self) -> Vec<String> {
        if self.frames.is_empty() && self.class.is_none() && self.finished.is_none() {
            return vec!["package".to_string()];
        }
        self.frames
            .iter()
            .map(|frame| frame.describe(self.class.as_ref()))
            .collect()
    }

    /// The finished class, after interception
    pub fn class_decl(&self) -> Option<&ClassDecl> {
        self.finished.as_ref()
    }

    fn ready(&self) -> CodegenResult<&ClassDecl> {
        self.check_poisoned()?;
        self.finished.as_ref().ok_or_else(|| {
            let err = CodegenError::IncompleteProgram {
                open: self.open_scopes(),
            };
            self.poison(&err);
            err
        })
    }

    /// Render the class through the selected backend
    pub fn emit(&self, target: Target) -> CodegenResult<Artifact> {
        match target {
            Target::Source => {
                let mut out = Vec::new();
                self.render_source(&mut out)?;
                Ok(Artifact::Source(String::from_utf8_lossy(&out).into_owned()))
            }
            Target::Binary => Ok(Artifact::Binary(self.emit_binary()?)),
        }
    }

    /// Write the class as source text
    pub fn render_source(&self, dest: &mut dyn Write) -> CodegenResult<()> {
        let class = self.ready()?;
        emit::render_source(class, &self.cg.options, dest)
    }

    /// Encoded class file bytes
    pub fn emit_binary(&self) -> CodegenResult<Vec<u8>> {
        Ok(self.class_file()?.encode())
    }

    /// Class file before encoding
    pub fn class_file(&self) -> CodegenResult<ClassFile> {
        let class = self.ready()?;
        emit::emit_class_file(class, &self.cg.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_illegal_scope(result: CodegenResult<impl std::fmt::Debug>) -> bool {
        matches!(result, Err(CodegenError::IllegalScope { .. }))
    }

    #[test]
    fn test_method_without_class() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        assert!(is_illegal_scope(s.method(Modifiers::PUBLIC, &TypeRef::void(), "run")));
    }

    #[test]
    fn test_poisoned_session() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        assert!(is_illegal_scope(s.expr(Expr::call(Expr::This, "f", vec![]))));
        match s.end() {
            Err(CodegenError::IllegalScope { message }) => {
                assert!(message.contains("earlier error"));
                assert!(message.contains("`expr`"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_open_scopes_listed() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        assert_eq!(s.open_scopes(), vec!["package"]);
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "run").unwrap();
        s.body().unwrap();
        s.if_(Expr::bool(true)).unwrap();
        assert_eq!(
            s.open_scopes(),
            vec!["class demo.Flow", "body of run()void", "if"]
        );
        assert!(matches!(
            s.emit_binary(),
            Err(CodegenError::IncompleteProgram { .. })
        ));
        // emitting too early abandons the session
        assert!(is_illegal_scope(s.end()));
        assert!(is_illegal_scope(s.emit_binary()));
    }

    #[test]
    fn test_else_twice() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "run").unwrap();
        s.body().unwrap();
        s.if_(Expr::bool(true)).unwrap();
        s.else_().unwrap();
        assert!(is_illegal_scope(s.else_()));
    }

    #[test]
    fn test_try_without_catch() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "run").unwrap();
        s.body().unwrap();
        s.try_().unwrap();
        assert!(is_illegal_scope(s.end()));
    }

    #[test]
    fn test_package_qualifies_class() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.package("demo").unwrap();
        let ty = s.class(Modifiers::PUBLIC, "Flow", None).unwrap();
        assert_eq!(ty.name(), "demo.Flow");
        assert!(is_illegal_scope(s.package("other")));
    }

    #[test]
    fn test_arg_outside_header() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "run").unwrap();
        s.body().unwrap();
        assert!(is_illegal_scope(s.arg(&TypeRef::int(), "late")));
    }

    #[test]
    fn test_abstract_method_header_only() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC | Modifiers::ABSTRACT, "demo.Shape", None)
            .unwrap();
        s.method(
            Modifiers::PUBLIC | Modifiers::ABSTRACT,
            &TypeRef::double(),
            "area",
        )
        .unwrap();
        s.end().unwrap();
        s.end().unwrap();
        let class = s.class_decl().unwrap();
        assert!(class.methods().next().unwrap().body.is_none());
    }

    #[test]
    fn test_missing_body_rejected() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "run").unwrap();
        assert!(is_illegal_scope(s.end()));
    }
}
