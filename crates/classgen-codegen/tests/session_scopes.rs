//! Builder scope rules and emission readiness

use classgen_codegen::{Codegen, CodegenError, Expr, Modifiers, Target, TypeRef};

fn void() -> TypeRef {
    TypeRef::void()
}

#[test]
fn test_method_without_class_is_illegal() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    let err = s.method(Modifiers::PUBLIC, &void(), "run").unwrap_err();
    assert!(matches!(err, CodegenError::IllegalScope { .. }), "{}", err);

    // the session stays poisoned
    let err = s
        .class(Modifiers::PUBLIC, "demo.Flow", None)
        .unwrap_err();
    match err {
        CodegenError::IllegalScope { message } => assert!(message.contains("earlier error")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_emit_with_open_body_is_incomplete() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    s.method(Modifiers::PUBLIC, &void(), "run").unwrap();
    s.body().unwrap();

    match s.emit_binary() {
        Err(CodegenError::IncompleteProgram { open }) => {
            assert_eq!(open, vec!["class demo.Flow", "body of run()void"]);
        }
        other => panic!("unexpected {:?}", other),
    }

    // construction cannot resume after an incomplete emission
    s.end().unwrap_err();
    match s.emit(Target::Source) {
        Err(CodegenError::IllegalScope { message }) => {
            assert!(message.contains("incomplete program"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_emit_before_anything_lists_package() {
    let mut cg = Codegen::new();
    let s = cg.session();
    match s.emit_binary() {
        Err(CodegenError::IncompleteProgram { open }) => assert_eq!(open, vec!["package"]),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_statement_outside_body() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    s.method(Modifiers::PUBLIC, &void(), "run").unwrap();
    let err = s.ret(None).unwrap_err();
    assert!(err.to_string().contains("`ret`"), "{}", err);
}

#[test]
fn test_dangling_reference_reports_method() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    s.method(Modifiers::PUBLIC, &void(), "run").unwrap();
    s.body().unwrap();
    s.expr(Expr::call(Expr::This, "trace", vec![Expr::var("ghost")]))
        .unwrap();
    match s.end() {
        Err(CodegenError::MalformedProgram { location, message }) => {
            assert_eq!(location, "demo.Flow.run()void");
            assert!(message.contains("ghost"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_declaration_order_is_preserved() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Order", None).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        s.method(Modifiers::PUBLIC, &void(), name).unwrap();
        s.body().unwrap();
        s.end().unwrap();
    }
    s.field(Modifiers::PRIVATE, &TypeRef::int(), "last").unwrap();
    s.end().unwrap();

    let source = s.emit(Target::Source).unwrap();
    let source = source.as_source().unwrap();
    let zeta = source.find("zeta").unwrap();
    let alpha = source.find("alpha").unwrap();
    let mid = source.find("mid").unwrap();
    let last = source.find("last").unwrap();
    assert!(zeta < alpha && alpha < mid && mid < last);

    let file = s.class_file().unwrap();
    let names: Vec<&str> = file.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["<init>", "zeta", "alpha", "mid"]);
}

#[test]
fn test_repeated_emission_is_stable() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    s.method(Modifiers::PUBLIC, &TypeRef::int(), "answer").unwrap();
    s.body().unwrap();
    s.ret(Some(Expr::int(42))).unwrap();
    s.end().unwrap();
    s.end().unwrap();

    assert_eq!(s.emit_binary().unwrap(), s.emit_binary().unwrap());
    assert_eq!(s.emit(Target::Source).unwrap(), s.emit(Target::Source).unwrap());
}

#[test]
fn test_registry_survives_sessions() {
    let mut cg = Codegen::new();
    let first = {
        let mut s = cg.session();
        s.package("demo").unwrap();
        s.class(Modifiers::PUBLIC, "Flow", None).unwrap()
    };
    let mut s = cg.session();
    // package and imports do not leak into the next unit
    let second = s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    assert_eq!(first, second);
    drop(s);
    assert!(cg.registry().scope().package.is_none());
}

#[test]
fn test_define_and_catch_variables() {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    s.class(Modifiers::PUBLIC, "demo.Flow", None).unwrap();
    let ex = s.ty("java.lang.RuntimeException").unwrap();
    s.method(Modifiers::PUBLIC, &TypeRef::int(), "guarded").unwrap();
    s.body().unwrap();
    let n = s.define(&TypeRef::int(), "n", Expr::int(1)).unwrap();
    s.try_().unwrap();
    s.throw(Expr::new_instance(ex.clone(), vec![])).unwrap();
    let e = s.catch_(&ex, "e").unwrap();
    s.expr(Expr::call(e, "getMessage", vec![])).unwrap();
    s.assign(n.clone(), Expr::int(2)).unwrap();
    s.end().unwrap();
    s.ret(Some(n)).unwrap();
    s.end().unwrap();
    s.end().unwrap();

    let file = s.class_file().unwrap();
    let method = file.method("guarded", "()int").unwrap();
    assert_eq!(method.exception_table.len(), 1);
    assert_eq!(
        method.exception_table[0].catch_type.as_deref(),
        Some("java.lang.RuntimeException")
    );
}
