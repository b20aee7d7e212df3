//! The generated classes of the flow suite
//!
//! `flow.Flow` extends the host class `flow.ControlBase` and consists of void
//! methods whose only side effects are `trace(n)` calls. `FirstException`
//! and `SecondException` are empty subclasses of
//! `java.lang.RuntimeException`.

use crate::{FlowError, FlowResult};
use classgen_codegen::{CodegenResult, Expr, Modifiers, Session, TypeRef};

pub const PACKAGE: &str = "flow";
pub const CONTROL_BASE: &str = "flow.ControlBase";
pub const FLOW_CLASS: &str = "flow.Flow";
pub const FIRST_EXCEPTION: &str = "flow.FirstException";
pub const SECOND_EXCEPTION: &str = "flow.SecondException";

/// Generated classes in load order
pub const CLASSES: [&str; 3] = [FIRST_EXCEPTION, SECOND_EXCEPTION, FLOW_CLASS];

const FLOW_EXCEPTIONS: [&str; 2] = ["FirstException", "SecondException"];

/// Qualify an exception name written in a case
pub fn qualify_exception(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else if FLOW_EXCEPTIONS.contains(&name) {
        format!("{}.{}", PACKAGE, name)
    } else {
        format!("java.lang.{}", name)
    }
}

pub fn simple_name(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

struct Exceptions {
    first: TypeRef,
    second: TypeRef,
}

type MethodBuilder = fn(&mut Session<'_>, &Exceptions) -> CodegenResult<()>;

/// Methods of `flow.Flow` in declaration order
const FLOW_METHODS: [(&str, MethodBuilder); 7] = [
    ("simpleIf", simple_if),
    ("complexIf", complex_if),
    ("simpleTryCatch", simple_try_catch),
    ("nestedTryCatch", nested_try_catch),
    ("ifInCatch", if_in_catch),
    ("branch", branch),
    ("tryThrow", try_throw),
];

pub fn flow_methods() -> impl Iterator<Item = &'static str> {
    FLOW_METHODS.iter().map(|(name, _)| *name)
}

/// Build one suite class into a fresh session. `only` restricts `Flow` to
/// a single method.
pub fn build_class(s: &mut Session<'_>, class: &str, only: Option<&str>) -> FlowResult<()> {
    if let Some(method) = only {
        if class != FLOW_CLASS || !flow_methods().any(|name| name == method) {
            return Err(FlowError::UnknownMethod(method.to_string()));
        }
    }
    match class {
        FIRST_EXCEPTION | SECOND_EXCEPTION => Ok(exception_class(s, class)?),
        FLOW_CLASS => Ok(flow_class(s, only)?),
        other => Err(FlowError::UnknownClass(other.to_string())),
    }
}

fn exception_class(s: &mut Session<'_>, class: &str) -> CodegenResult<()> {
    s.package(PACKAGE)?;
    let base = s.ty("java.lang.RuntimeException")?;
    s.class(Modifiers::PUBLIC, simple_name(class), Some(&base))?;
    s.end()
}

fn flow_class(s: &mut Session<'_>, only: Option<&str>) -> CodegenResult<()> {
    s.package(PACKAGE)?;
    let base = s.ty(CONTROL_BASE)?;
    let exceptions = Exceptions {
        first: s.ty(FIRST_EXCEPTION)?,
        second: s.ty(SECOND_EXCEPTION)?,
    };
    s.class(Modifiers::PUBLIC, simple_name(FLOW_CLASS), Some(&base))?;
    for (name, build) in FLOW_METHODS {
        if only.map_or(true, |method| method == name) {
            build(s, &exceptions)?;
        }
    }
    s.end()
}

// ===== Flow methods =====

fn trace(id: i32) -> Expr {
    Expr::call(Expr::This, "trace", vec![Expr::int(id)])
}

fn step(s: &mut Session<'_>, id: i32) -> CodegenResult<()> {
    s.expr(trace(id))
}

fn open(s: &mut Session<'_>, name: &str) -> CodegenResult<()> {
    s.method(Modifiers::PUBLIC, &TypeRef::void(), name)?;
    s.body()
}

/// `if (trace(1)) { trace(2); } else { trace(3); } trace(4);`
fn simple_if(s: &mut Session<'_>, _: &Exceptions) -> CodegenResult<()> {
    open(s, "simpleIf")?;
    s.if_(trace(1))?;
    step(s, 2)?;
    s.else_()?;
    step(s, 3)?;
    s.end()?;
    step(s, 4)?;
    s.end()
}

/// Two levels of nested conditionals on both branches of `trace(1)`
fn complex_if(s: &mut Session<'_>, _: &Exceptions) -> CodegenResult<()> {
    open(s, "complexIf")?;
    s.if_(trace(1))?;
    {
        s.if_(trace(2))?;
        step(s, 3)?;
        s.else_()?;
        step(s, 4)?;
        s.end()?;
        step(s, 5)?;
        s.if_(trace(6))?;
        step(s, 7)?;
        s.if_(trace(8))?;
        step(s, 9)?;
        s.else_()?;
        step(s, 10)?;
        s.end()?;
        s.else_()?;
        step(s, 11)?;
        s.end()?;
    }
    s.else_()?;
    {
        s.if_(trace(12))?;
        step(s, 13)?;
        s.else_()?;
        step(s, 14)?;
        s.if_(trace(15))?;
        step(s, 16)?;
        s.else_()?;
        step(s, 17)?;
        s.end()?;
        s.end()?;
    }
    s.end()?;
    step(s, 18)?;
    s.end()
}

/// `trace(1)` outside the try, `FirstException` handled
fn simple_try_catch(s: &mut Session<'_>, ex: &Exceptions) -> CodegenResult<()> {
    open(s, "simpleTryCatch")?;
    step(s, 1)?;
    s.try_()?;
    step(s, 2)?;
    step(s, 3)?;
    s.catch_(&ex.first, "e")?;
    step(s, 4)?;
    step(s, 5)?;
    s.end()?;
    step(s, 6)?;
    s.end()
}

/// Inner try handles `SecondException`, outer try handles `FirstException`
fn nested_try_catch(s: &mut Session<'_>, ex: &Exceptions) -> CodegenResult<()> {
    open(s, "nestedTryCatch")?;
    s.try_()?;
    step(s, 1)?;
    s.try_()?;
    step(s, 2)?;
    s.catch_(&ex.second, "second")?;
    step(s, 3)?;
    s.end()?;
    step(s, 4)?;
    s.catch_(&ex.first, "first")?;
    step(s, 5)?;
    s.end()?;
    step(s, 6)?;
    s.end()
}

fn if_in_catch(s: &mut Session<'_>, ex: &Exceptions) -> CodegenResult<()> {
    open(s, "ifInCatch")?;
    s.try_()?;
    step(s, 1)?;
    s.catch_(&ex.first, "e")?;
    s.if_(trace(2))?;
    step(s, 3)?;
    s.else_()?;
    step(s, 4)?;
    s.end()?;
    s.end()?;
    step(s, 5)?;
    s.end()
}

/// `if (flag) { trace(1); } else { trace(2); }`
fn branch(s: &mut Session<'_>, _: &Exceptions) -> CodegenResult<()> {
    s.method(Modifiers::PUBLIC, &TypeRef::void(), "branch")?;
    let flag = s.arg(&TypeRef::boolean(), "flag")?;
    s.body()?;
    s.if_(flag)?;
    step(s, 1)?;
    s.else_()?;
    step(s, 2)?;
    s.end()?;
    s.end()
}

/// `try { trace(1); throw new FirstException(); } catch (FirstException e) { trace(2); }`
fn try_throw(s: &mut Session<'_>, ex: &Exceptions) -> CodegenResult<()> {
    open(s, "tryThrow")?;
    s.try_()?;
    step(s, 1)?;
    s.throw(Expr::new_instance(ex.first.clone(), Vec::new()))?;
    s.catch_(&ex.first, "e")?;
    step(s, 2)?;
    s.end()?;
    s.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use classgen_codegen::{Codegen, Target};

    fn render(class: &str, only: Option<&str>) -> String {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        build_class(&mut s, class, only).unwrap();
        s.emit(Target::Source)
            .unwrap()
            .as_source()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_qualify_exception() {
        assert_eq!(qualify_exception("FirstException"), FIRST_EXCEPTION);
        assert_eq!(
            qualify_exception("IllegalStateException"),
            "java.lang.IllegalStateException"
        );
        assert_eq!(qualify_exception("demo.Oops"), "demo.Oops");
    }

    #[test]
    fn test_exception_class_source() {
        assert_eq!(
            render(SECOND_EXCEPTION, None),
            "package flow;\n\npublic class SecondException extends RuntimeException {\n}\n"
        );
    }

    #[test]
    fn test_single_method_render() {
        let text = render(FLOW_CLASS, Some("branch"));
        assert!(text.contains("public class Flow extends ControlBase {"), "{}", text);
        assert!(text.contains("public void branch(boolean flag) {"), "{}", text);
        assert!(text.contains("this.trace(1);"), "{}", text);
        assert!(!text.contains("simpleIf"), "{}", text);
    }

    #[test]
    fn test_unknown_names() {
        let mut cg = Codegen::new();
        let mut s = cg.session();
        assert!(matches!(
            build_class(&mut s, FLOW_CLASS, Some("missing")),
            Err(FlowError::UnknownMethod(_))
        ));
        assert!(matches!(
            build_class(&mut s, "flow.Other", None),
            Err(FlowError::UnknownClass(_))
        ));
    }
}
