//! Structural validation of the IR
//!
//! Runs when a method body closes and again over the whole class after the
//! interceptor pipeline. Emission never proceeds on a class that fails here.

use crate::error::{CodegenError, CodegenResult, TypeResolutionError};
use crate::ir::{can_complete, CallTarget, ClassDecl, Expr, Literal, Member, MethodDecl, Stmt};
use crate::types::{is_identifier, TypeKind, TypeRef};
use rustc_hash::FxHashSet;

/// Validate one method or constructor of `class`
pub fn validate_method(class: &ClassDecl, method: &MethodDecl) -> CodegenResult<()> {
    let location = format!("{}.{}", class.name(), method.display_name());
    let malformed = |message: String| CodegenError::malformed(location.clone(), message);

    if let Some(name) = &method.name {
        if !is_identifier(name) {
            return Err(malformed(format!("`{}` is not a valid method name", name)));
        }
    }
    if method.is_constructor() && method.is_static() {
        return Err(malformed("constructor cannot be static".to_string()));
    }
    if method.is_constructor() && method.is_abstract() {
        return Err(malformed("constructor cannot be abstract".to_string()));
    }
    if method.is_abstract() && !class.modifiers.is_abstract() {
        return Err(malformed(
            "abstract method in a class that is not abstract".to_string(),
        ));
    }

    let body = match (&method.body, method.is_abstract()) {
        (Some(_), true) => return Err(malformed("abstract method has a body".to_string())),
        (None, false) => return Err(malformed("missing method body".to_string())),
        (None, true) => None,
        (Some(body), false) => Some(body),
    };

    let package = class.scope.package.as_deref();
    let mut checker = Checker::new(
        &location,
        package,
        method.is_static(),
        method.return_type.is_some(),
    );
    for param in &method.params {
        check_reachable_type(package, &param.ty)?;
        checker.declare(&param.name, "parameter")?;
    }
    if let Some(ty) = &method.return_type {
        check_reachable_type(package, ty)?;
    }
    if let Some(body) = body {
        checker.check_block(body)?;
        if method.return_type.is_some() && can_complete(body) {
            return Err(malformed("missing return statement".to_string()));
        }
    }
    Ok(())
}

/// Validate the whole class: members, initializers and duplicates
pub fn validate_class(class: &ClassDecl) -> CodegenResult<()> {
    let package = class.scope.package.as_deref();
    check_reachable_type(package, &class.superclass)?;
    let mut fields = FxHashSet::default();
    let mut signatures = FxHashSet::default();

    for member in &class.members {
        match member {
            Member::Field(field) => {
                let location = format!("{}.{}", class.name(), field.name);
                if !is_identifier(&field.name) {
                    return Err(CodegenError::malformed(location, "invalid field name"));
                }
                if !fields.insert(field.name.as_str()) {
                    return Err(CodegenError::malformed(location, "duplicate field"));
                }
                if field.ty.is_void() {
                    return Err(CodegenError::malformed(location, "field of type void"));
                }
                check_reachable_type(package, &field.ty)?;
                if let Some(init) = &field.init {
                    Checker::new(&location, package, field.is_static(), false).check_expr(init)?;
                }
            }
            Member::Method(method) => {
                if !signatures.insert((method.table_name().to_string(), method.params.len())) {
                    return Err(CodegenError::malformed(
                        format!("{}.{}", class.name(), method.display_name()),
                        "duplicate method: same name and parameter count",
                    ));
                }
                validate_method(class, method)?;
            }
        }
    }

    let location = format!("{}.<clinit>", class.name());
    Checker::new(&location, package, true, false).check_block(&class.static_init)?;
    Ok(())
}

/// Check that adding a field named `name` keeps field names unique
pub fn check_new_field(class: &ClassDecl, name: &str) -> CodegenResult<()> {
    let location = format!("{}.{}", class.name(), name);
    if !is_identifier(name) {
        return Err(CodegenError::malformed(location, "invalid field name"));
    }
    if class.field(name).is_some() {
        return Err(CodegenError::malformed(location, "duplicate field"));
    }
    Ok(())
}

/// Types outside any package cannot be named from a unit that has one
fn check_reachable_type(package: Option<&str>, ty: &TypeRef) -> CodegenResult<()> {
    let mut base = ty;
    while let Some(element) = base.element() {
        base = element;
    }
    match package {
        Some(package) if *base.kind() == TypeKind::Named && base.package().is_none() => {
            Err(TypeResolutionError::new(
                base.name(),
                format!("type without a package referenced from package `{}`", package),
            )
            .into())
        }
        _ => Ok(()),
    }
}

struct Checker<'a> {
    location: &'a str,
    package: Option<&'a str>,
    is_static: bool,
    returns_value: bool,
    scopes: Vec<Vec<String>>,
}

impl<'a> Checker<'a> {
    fn new(
        location: &'a str,
        package: Option<&'a str>,
        is_static: bool,
        returns_value: bool,
    ) -> Self {
        Self {
            location,
            package,
            is_static,
            returns_value,
            scopes: vec![Vec::new()],
        }
    }

    fn error(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::malformed(self.location, message)
    }

    fn is_visible(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.iter().any(|n| n == name))
    }

    fn declare(&mut self, name: &str, what: &str) -> CodegenResult<()> {
        if !is_identifier(name) {
            return Err(self.error(format!("invalid {} name `{}`", what, name)));
        }
        if self.is_visible(name) {
            return Err(self.error(format!("duplicate {} `{}`", what, name)));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
        Ok(())
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> CodegenResult<T>) -> CodegenResult<T> {
        self.scopes.push(Vec::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn check_block(&mut self, stmts: &[Stmt]) -> CodegenResult<()> {
        self.scoped(|this| stmts.iter().try_for_each(|stmt| this.check_stmt(stmt)))
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::Expr(e) => {
                if !e.is_statement_expression() {
                    return Err(self.error("expression statement must be a call or an allocation"));
                }
                self.check_expr(e)
            }
            Stmt::Assign { target, value } => {
                if !target.is_assignable() {
                    return Err(self.error("assignment target is not a variable or field"));
                }
                self.check_expr(target)?;
                self.check_expr(value)
            }
            Stmt::Define { ty, name, value } => {
                if ty.is_void() {
                    return Err(self.error(format!("local `{}` of type void", name)));
                }
                check_reachable_type(self.package, ty)?;
                self.check_expr(value)?;
                self.declare(name, "local variable")
            }
            Stmt::Return(value) => match (value, self.returns_value) {
                (Some(_), false) => Err(self.error("cannot return a value from a void method")),
                (None, true) => Err(self.error("missing return value")),
                (Some(e), true) => self.check_expr(e),
                (None, false) => Ok(()),
            },
            Stmt::Throw(e) => self.check_expr(e),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond)?;
                self.check_block(then_branch)?;
                self.check_block(else_branch)
            }
            Stmt::TryCatch { body, catches } => {
                if catches.is_empty() {
                    return Err(self.error("try without catch clauses"));
                }
                self.check_block(body)?;
                for clause in catches {
                    if clause.ty.is_primitive() || clause.ty.is_void() || clause.ty.is_array() {
                        return Err(self.error(format!("cannot catch `{}`", clause.ty)));
                    }
                    check_reachable_type(self.package, &clause.ty)?;
                    self.scoped(|this| {
                        this.declare(&clause.var, "exception variable")?;
                        clause.body.iter().try_for_each(|stmt| this.check_stmt(stmt))
                    })?;
                }
                Ok(())
            }
            Stmt::Block(stmts) => self.check_block(stmts),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> CodegenResult<()> {
        match expr {
            Expr::Constant { value, .. } => match value {
                Literal::Double(d) if !d.is_finite() => {
                    Err(self.error(format!("non-finite double constant {}", d)))
                }
                _ => Ok(()),
            },
            Expr::Var(name) => {
                if self.is_visible(name) {
                    Ok(())
                } else {
                    Err(self.error(format!("undefined variable `{}`", name)))
                }
            }
            Expr::This => {
                if self.is_static {
                    Err(self.error("`this` used in a static context"))
                } else {
                    Ok(())
                }
            }
            Expr::Field { target, name } => {
                self.check_member_name(name)?;
                self.check_expr(target)
            }
            Expr::StaticField { owner, name } => {
                check_reachable_type(self.package, owner)?;
                self.check_member_name(name)
            }
            Expr::Call { target, name, args } => {
                self.check_member_name(name)?;
                match target {
                    CallTarget::Instance(receiver) => self.check_expr(receiver)?,
                    CallTarget::Static(owner) => check_reachable_type(self.package, owner)?,
                }
                args.iter().try_for_each(|arg| self.check_expr(arg))
            }
            Expr::New { ty, args } => {
                if ty.is_primitive() || ty.is_void() || ty.is_array() {
                    return Err(self.error(format!("cannot instantiate `{}`", ty)));
                }
                check_reachable_type(self.package, ty)?;
                args.iter().try_for_each(|arg| self.check_expr(arg))
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
            Expr::Not(operand) => self.check_expr(operand),
        }
    }

    fn check_member_name(&self, name: &str) -> CodegenResult<()> {
        if is_identifier(name) {
            Ok(())
        } else {
            Err(self.error(format!("`{}` is not a valid member name", name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CatchClause, FieldDecl, Modifiers};
    use crate::types::{ImportScope, TypeRef};

    fn class() -> ClassDecl {
        ClassDecl::new(
            Modifiers::PUBLIC,
            TypeRef::named_unchecked("demo.Flow"),
            TypeRef::object(),
            ImportScope::default(),
        )
    }

    fn malformed_message(result: CodegenResult<()>) -> String {
        match result {
            Err(CodegenError::MalformedProgram { message, .. }) => message,
            other => panic!("expected malformed program, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_method() {
        let method = MethodDecl::method(Modifiers::PUBLIC, Some(TypeRef::int()), "pick")
            .param(TypeRef::boolean(), "flag")
            .body(vec![
                Stmt::Define {
                    ty: TypeRef::int(),
                    name: "x".to_string(),
                    value: Expr::int(1),
                },
                Stmt::If {
                    cond: Expr::var("flag"),
                    then_branch: vec![Stmt::Return(Some(Expr::var("x")))],
                    else_branch: vec![Stmt::Return(Some(Expr::int(2)))],
                },
            ]);
        validate_method(&class(), &method).unwrap();
    }

    #[test]
    fn test_dangling_variable() {
        let method = MethodDecl::method(Modifiers::PUBLIC, None, "run").body(vec![
            Stmt::Block(vec![Stmt::Define {
                ty: TypeRef::int(),
                name: "inner".to_string(),
                value: Expr::int(1),
            }]),
            Stmt::Assign {
                target: Expr::var("inner"),
                value: Expr::int(2),
            },
        ]);
        let message = malformed_message(validate_method(&class(), &method));
        assert!(message.contains("undefined variable `inner`"));
    }

    #[test]
    fn test_missing_return() {
        let method = MethodDecl::method(Modifiers::PUBLIC, Some(TypeRef::int()), "f").body(vec![
            Stmt::If {
                cond: Expr::bool(true),
                then_branch: vec![Stmt::Return(Some(Expr::int(1)))],
                else_branch: vec![],
            },
        ]);
        assert_eq!(
            malformed_message(validate_method(&class(), &method)),
            "missing return statement"
        );
    }

    #[test]
    fn test_this_in_static() {
        let method = MethodDecl::method(Modifiers::PUBLIC | Modifiers::STATIC, None, "s")
            .body(vec![Stmt::Expr(Expr::call(Expr::This, "run", vec![]))]);
        assert!(malformed_message(validate_method(&class(), &method)).contains("static"));
    }

    #[test]
    fn test_catch_variable_scope() {
        let ex = TypeRef::named_unchecked("java.lang.RuntimeException");
        let method = MethodDecl::method(Modifiers::PUBLIC, None, "run").body(vec![
            Stmt::TryCatch {
                body: vec![],
                catches: vec![CatchClause {
                    ty: ex,
                    var: "e".to_string(),
                    body: vec![Stmt::Throw(Expr::var("e"))],
                }],
            },
            Stmt::Throw(Expr::var("e")),
        ]);
        assert!(malformed_message(validate_method(&class(), &method)).contains("`e`"));
    }

    #[test]
    fn test_duplicate_names() {
        let method = MethodDecl::method(Modifiers::PUBLIC, None, "run")
            .param(TypeRef::int(), "a")
            .param(TypeRef::int(), "a")
            .body(vec![]);
        assert!(malformed_message(validate_method(&class(), &method)).contains("duplicate"));

        let mut c = class();
        c.members.push(Member::Field(FieldDecl::new(Modifiers::PRIVATE, TypeRef::int(), "n")));
        c.members.push(Member::Field(FieldDecl::new(Modifiers::PRIVATE, TypeRef::long(), "n")));
        assert_eq!(malformed_message(validate_class(&c)), "duplicate field");
        assert!(check_new_field(&c, "n").is_err());
        assert!(check_new_field(&c, "m").is_ok());
    }

    #[test]
    fn test_void_return_rules() {
        let method = MethodDecl::method(Modifiers::PUBLIC, None, "run")
            .body(vec![Stmt::Return(Some(Expr::int(1)))]);
        assert!(validate_method(&class(), &method).is_err());

        let ctor = MethodDecl::constructor(Modifiers::PUBLIC).body(vec![Stmt::Return(None)]);
        validate_method(&class(), &ctor).unwrap();
    }

    #[test]
    fn test_expression_statement_must_have_effect() {
        let method =
            MethodDecl::method(Modifiers::PUBLIC, None, "run").body(vec![Stmt::Expr(Expr::int(3))]);
        assert!(validate_method(&class(), &method).is_err());
    }

    #[test]
    fn test_abstract_rules() {
        let method = MethodDecl::method(Modifiers::PUBLIC | Modifiers::ABSTRACT, None, "run");
        assert!(validate_method(&class(), &method).is_err());

        let mut abstract_class = class();
        abstract_class.modifiers |= Modifiers::ABSTRACT;
        validate_method(&abstract_class, &method).unwrap();

        let no_body = MethodDecl::method(Modifiers::PUBLIC, None, "run");
        assert_eq!(
            malformed_message(validate_method(&class(), &no_body)),
            "missing method body"
        );
    }

    #[test]
    fn test_static_field_initializer_context() {
        let mut c = class();
        c.members.push(Member::Field(
            FieldDecl::new(Modifiers::STATIC, TypeRef::object(), "self_ref").with_init(Expr::This),
        ));
        assert!(validate_class(&c).is_err());
    }

    #[test]
    fn test_type_without_package_from_package() {
        let helper = TypeRef::named_unchecked("Helper");
        let method = MethodDecl::method(Modifiers::PUBLIC, None, "run").body(vec![Stmt::Define {
            ty: helper.clone(),
            name: "h".to_string(),
            value: Expr::new_instance(helper, vec![]),
        }]);
        validate_method(&class(), &method).unwrap();

        let mut packaged = class();
        packaged.scope.package = Some("demo".to_string());
        match validate_method(&packaged, &method) {
            Err(CodegenError::TypeResolution(err)) => assert_eq!(err.name, "Helper"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
