//! Source emitter
//!
//! Renders a finished [`ClassDecl`] as Java-like source text. Members appear
//! in declaration order, the static initializer block last. Binary
//! expressions are fully parenthesized.

use crate::config::CodegenOptions;
use crate::error::CodegenResult;
use crate::ir::{CallTarget, ClassDecl, Expr, Literal, Member, MethodDecl, Stmt};
use crate::types::{ImportScope, TypeRef};
use classgen_bytecode::AccessFlags;
use std::fmt::Write as _;
use std::io::Write;

/// Write `class` as source text to `dest`
pub fn render_source(
    class: &ClassDecl,
    options: &CodegenOptions,
    dest: &mut dyn Write,
) -> CodegenResult<()> {
    let text = render_to_string(class, options);
    dest.write_all(text.as_bytes())?;
    dest.flush()?;
    Ok(())
}

/// Render `class` as source text
pub fn render_to_string(class: &ClassDecl, options: &CodegenOptions) -> String {
    let mut printer = SourcePrinter {
        scope: &class.scope,
        out: String::new(),
        indent: " ".repeat(options.indent),
        level: 0,
    };
    printer.class(class);
    printer.out
}

struct SourcePrinter<'a> {
    scope: &'a ImportScope,
    out: String,
    indent: String,
    level: usize,
}

impl<'a> SourcePrinter<'a> {
    fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.level {
            self.out.push_str(&self.indent);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn alias(&self, ty: &TypeRef) -> String {
        self.scope.alias(ty)
    }

    fn class(&mut self, class: &ClassDecl) {
        if let Some(package) = &self.scope.package {
            self.line(&format!("package {};", package));
            self.line("");
        }
        if !self.scope.imports.is_empty() {
            for import in &self.scope.imports {
                self.line(&format!("import {};", import.name()));
            }
            self.line("");
        }

        let mut header = with_modifiers(class.modifiers, &format!("class {}", class.ty.simple_name()));
        if class.superclass.name() != "java.lang.Object" {
            let _ = write!(header, " extends {}", self.alias(&class.superclass));
        }
        header.push_str(" {");
        self.line(&header);
        self.level += 1;

        let mut previous_was_field = None;
        for member in &class.members {
            let is_field = matches!(member, Member::Field(_));
            match previous_was_field {
                Some(true) if is_field => {}
                Some(_) => self.line(""),
                None => {}
            }
            previous_was_field = Some(is_field);
            match member {
                Member::Field(field) => {
                    let mut text = with_modifiers(
                        field.modifiers,
                        &format!("{} {}", self.alias(&field.ty), field.name),
                    );
                    if let Some(init) = &field.init {
                        let _ = write!(text, " = {}", self.expr(init));
                    }
                    text.push(';');
                    self.line(&text);
                }
                Member::Method(method) => self.method(class, method),
            }
        }

        if !class.static_init.is_empty() {
            if previous_was_field.is_some() {
                self.line("");
            }
            self.line("static {");
            self.body(&class.static_init);
            self.line("}");
        }

        self.level -= 1;
        self.line("}");
    }

    fn method(&mut self, class: &ClassDecl, method: &MethodDecl) {
        let params = method
            .params
            .iter()
            .map(|p| format!("{} {}", self.alias(&p.ty), p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let signature = match &method.name {
            None => format!("{}({})", class.ty.simple_name(), params),
            Some(name) => {
                let ret = method
                    .return_type
                    .as_ref()
                    .map_or_else(|| "void".to_string(), |ty| self.alias(ty));
                format!("{} {}({})", ret, name, params)
            }
        };
        let header = with_modifiers(method.modifiers, &signature);

        match &method.body {
            None => self.line(&format!("{};", header)),
            Some(body) => {
                self.line(&format!("{} {{", header));
                if method.is_constructor() {
                    self.level += 1;
                    self.line("super();");
                    self.level -= 1;
                }
                self.body(body);
                self.line("}");
            }
        }
    }

    fn body(&mut self, stmts: &[Stmt]) {
        self.level += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.level -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                let text = format!("{};", self.expr(e));
                self.line(&text);
            }
            Stmt::Assign { target, value } => {
                let text = format!("{} = {};", self.expr(target), self.expr(value));
                self.line(&text);
            }
            Stmt::Define { ty, name, value } => {
                let text = format!("{} {} = {};", self.alias(ty), name, self.expr(value));
                self.line(&text);
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(value)) => {
                let text = format!("return {};", self.expr(value));
                self.line(&text);
            }
            Stmt::Throw(value) => {
                let text = format!("throw {};", self.expr(value));
                self.line(&text);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let text = format!("if ({}) {{", self.condition(cond));
                self.line(&text);
                self.body(then_branch);
                if !else_branch.is_empty() {
                    self.line("} else {");
                    self.body(else_branch);
                }
                self.line("}");
            }
            Stmt::TryCatch { body, catches } => {
                self.line("try {");
                self.body(body);
                for clause in catches {
                    let text = format!("}} catch ({} {}) {{", self.alias(&clause.ty), clause.var);
                    self.line(&text);
                    self.body(&clause.body);
                }
                self.line("}");
            }
            Stmt::Block(stmts) => {
                self.line("{");
                self.body(stmts);
                self.line("}");
            }
        }
    }

    /// Condition of an `if`, without the redundant outer parentheses
    fn condition(&self, cond: &Expr) -> String {
        match cond {
            Expr::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.expr(lhs), op, self.expr(rhs))
            }
            other => self.expr(other),
        }
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Constant { value, .. } => literal(value),
            Expr::Var(name) => name.clone(),
            Expr::This => "this".to_string(),
            Expr::Field { target, name } => format!("{}.{}", self.expr(target), name),
            Expr::StaticField { owner, name } => format!("{}.{}", self.alias(owner), name),
            Expr::Call { target, name, args } => {
                let receiver = match target {
                    CallTarget::Instance(receiver) => self.expr(receiver),
                    CallTarget::Static(owner) => self.alias(owner),
                };
                format!("{}.{}({})", receiver, name, self.args(args))
            }
            Expr::New { ty, args } => format!("new {}({})", self.alias(ty), self.args(args)),
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs), op, self.expr(rhs))
            }
            Expr::Not(operand) => format!("!{}", self.expr(operand)),
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|arg| self.expr(arg))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn with_modifiers(modifiers: AccessFlags, rest: &str) -> String {
    if modifiers.keywords().is_empty() {
        rest.to_string()
    } else {
        format!("{} {}", modifiers, rest)
    }
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Long(l) => format!("{}L", l),
        Literal::Double(d) => format!("{:?}", d),
        Literal::Str(s) => escape_string(s),
    }
}

/// Quote and escape a string literal
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, CatchClause, FieldDecl, Modifiers};
    use crate::types::TypeRegistry;

    fn render(class: &ClassDecl) -> String {
        render_to_string(class, &CodegenOptions::default())
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_string("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(escape_string("\u{1}é"), "\"\\u0001é\"");
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Literal::Long(-3)), "-3L");
        assert_eq!(literal(&Literal::Double(2.0)), "2.0");
        assert_eq!(literal(&Literal::Double(0.25)), "0.25");
        assert_eq!(literal(&Literal::Null), "null");
    }

    #[test]
    fn test_render_class() {
        let mut registry = TypeRegistry::new();
        registry.set_package(Some("demo")).unwrap();
        let base = registry.import("demo.support.ControlBase").unwrap();
        let ex = registry
            .resolve("demo.FirstException", crate::types::RefKind::Named)
            .unwrap();
        let ty = registry
            .resolve("demo.Flow", crate::types::RefKind::Named)
            .unwrap();

        let mut class = ClassDecl::new(Modifiers::PUBLIC, ty, base, registry.scope().clone());
        class.members.push(Member::Field(
            FieldDecl::new(Modifiers::PRIVATE, TypeRef::int(), "count").with_init(Expr::int(0)),
        ));
        class.members.push(Member::Field(FieldDecl::new(
            Modifiers::PRIVATE,
            TypeRef::string(),
            "label",
        )));
        class.members.push(Member::Method(
            MethodDecl::method(Modifiers::PUBLIC, None, "run")
                .param(TypeRef::boolean(), "x")
                .body(vec![
                    Stmt::If {
                        cond: Expr::and(Expr::var("x"), Expr::not(Expr::var("x"))),
                        then_branch: vec![Stmt::Expr(Expr::call(
                            Expr::This,
                            "trace",
                            vec![Expr::int(1)],
                        ))],
                        else_branch: vec![],
                    },
                    Stmt::TryCatch {
                        body: vec![Stmt::Throw(Expr::new_instance(ex.clone(), vec![]))],
                        catches: vec![CatchClause {
                            ty: ex,
                            var: "e".to_string(),
                            body: vec![Stmt::Assign {
                                target: Expr::field(Expr::This, "count"),
                                value: Expr::binary(
                                    BinaryOp::Add,
                                    Expr::field(Expr::This, "count"),
                                    Expr::int(1),
                                ),
                            }],
                        }],
                    },
                ]),
        ));

        let expected = "\
package demo;

import demo.support.ControlBase;

public class Flow extends ControlBase {
    private int count = 0;
    private String label;

    public void run(boolean x) {
        if (x && !x) {
            this.trace(1);
        }
        try {
            throw new FirstException();
        } catch (FirstException e) {
            this.count = (this.count + 1);
        }
    }
}
";
        assert_eq!(render(&class), expected);
    }

    #[test]
    fn test_constructor_and_static_block() {
        let mut class = ClassDecl::new(
            Modifiers::PUBLIC | Modifiers::ABSTRACT,
            TypeRef::named_unchecked("demo.Shape"),
            TypeRef::object(),
            ImportScope::default(),
        );
        class.members.push(Member::Method(
            MethodDecl::constructor(Modifiers::PROTECTED).body(vec![]),
        ));
        class.members.push(Member::Method(MethodDecl::method(
            Modifiers::PUBLIC | Modifiers::ABSTRACT,
            Some(TypeRef::double()),
            "area",
        )));
        class.static_init.push(Stmt::Expr(Expr::call_static(
            TypeRef::named_unchecked("demo.Registry"),
            "touch",
            vec![Expr::long(7)],
        )));

        let options = CodegenOptions {
            indent: 2,
            ..CodegenOptions::default()
        };
        let expected = "\
public abstract class Shape {
  protected Shape() {
    super();
  }

  public abstract double area();

  static {
    demo.Registry.touch(7L);
  }
}
";
        assert_eq!(render_to_string(&class, &options), expected);
    }
}
