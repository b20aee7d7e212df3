//! Loading and running generated classes

use classgen_bytecode::{AccessFlags, BytecodeWriter, ClassFile, ExceptionEntry, MethodInfo};
use classgen_codegen::{BinaryOp, Codegen, CodegenResult, Expr, Modifiers, Session, TypeRef};
use classgen_vm::{ClassLoader, Completion, NativeClass, ObjectRef, Value, Vm, VmError, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

fn compile(build: impl FnOnce(&mut Session<'_>) -> CodegenResult<()>) -> Vec<u8> {
    let mut cg = Codegen::new();
    let mut s = cg.session();
    build(&mut s).unwrap();
    s.emit_binary().unwrap()
}

/// `demo.Counter { private int count; int next() { count = count + 1; return count; } }`
fn counter(s: &mut Session<'_>) -> CodegenResult<()> {
    s.class(Modifiers::PUBLIC, "demo.Counter", None)?;
    let count = s.field(Modifiers::PRIVATE, &TypeRef::int(), "count")?;
    s.method(Modifiers::PUBLIC, &TypeRef::int(), "next")?;
    s.body()?;
    s.assign(
        count.clone(),
        Expr::binary(BinaryOp::Add, count.clone(), Expr::int(1)),
    )?;
    s.ret(Some(count))?;
    s.end()?;
    s.end()
}

#[test]
fn test_fields_and_virtual_calls() {
    let mut vm = Vm::new();
    let handle = vm.load(&compile(counter), "demo.Counter").unwrap();
    assert_eq!(handle.superclass_name(), Some("java.lang.Object"));
    let names: Vec<&str> = handle.methods().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["<init>", "next"]);

    let counter = vm.new_instance("demo.Counter", Vec::new()).unwrap();
    assert_eq!(vm.invoke(&counter, "next", Vec::new()).unwrap(), Value::Int(1));
    assert_eq!(vm.invoke(&counter, "next", Vec::new()).unwrap(), Value::Int(2));
    assert_eq!(
        counter.as_object().unwrap().get_field("count"),
        Some(Value::Int(2))
    );
}

#[test]
fn test_caught_exception_continues() {
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Guard", None)?;
        let runtime = s.ty("java.lang.RuntimeException")?;
        let illegal = s.ty("java.lang.IllegalStateException")?;
        s.method(Modifiers::PUBLIC, &TypeRef::int(), "guarded")?;
        s.body()?;
        let n = s.define(&TypeRef::int(), "n", Expr::int(1))?;
        s.try_()?;
        s.throw(Expr::new_instance(illegal, vec![Expr::str("boom")]))?;
        s.catch_(&runtime, "e")?;
        s.assign(n.clone(), Expr::int(2))?;
        s.end()?;
        s.ret(Some(n))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    vm.load(&bytes, "demo.Guard").unwrap();
    let guard = vm.new_instance("demo.Guard", Vec::new()).unwrap();
    assert_eq!(vm.invoke(&guard, "guarded", Vec::new()).unwrap(), Value::Int(2));
}

#[test]
fn test_handler_selection_by_type() {
    // the inner catch does not match, the outer one does
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Nested", None)?;
        let runtime = s.ty("java.lang.RuntimeException")?;
        let illegal_state = s.ty("java.lang.IllegalStateException")?;
        let illegal_arg = s.ty("java.lang.IllegalArgumentException")?;
        s.method(Modifiers::PUBLIC, &TypeRef::int(), "pick")?;
        s.body()?;
        s.try_()?;
        s.try_()?;
        s.throw(Expr::new_instance(illegal_arg, Vec::new()))?;
        s.catch_(&illegal_state, "inner")?;
        s.ret(Some(Expr::int(1)))?;
        s.end()?;
        s.catch_(&runtime, "outer")?;
        s.ret(Some(Expr::int(2)))?;
        s.end()?;
        s.ret(Some(Expr::int(3)))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    vm.load(&bytes, "demo.Nested").unwrap();
    let nested = vm.new_instance("demo.Nested", Vec::new()).unwrap();
    assert_eq!(vm.invoke(&nested, "pick", Vec::new()).unwrap(), Value::Int(2));
}

#[test]
fn test_uncaught_exception_surfaces() {
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Thrower", None)?;
        let illegal = s.ty("java.lang.IllegalArgumentException")?;
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "fail")?;
        s.body()?;
        s.throw(Expr::new_instance(illegal, vec![Expr::str("bad input")]))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    vm.load(&bytes, "demo.Thrower").unwrap();
    let thrower = vm.new_instance("demo.Thrower", Vec::new()).unwrap();
    match vm.invoke(&thrower, "fail", Vec::new()) {
        Err(VmError::UncaughtException { class, message }) => {
            assert_eq!(class, "java.lang.IllegalArgumentException");
            assert_eq!(message, "bad input");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_static_initializer_and_static_calls() {
    let bytes = compile(|s| {
        let owner = s.class(Modifiers::PUBLIC, "demo.Seeds", None)?;
        let seed = s.field_init(
            Modifiers::PRIVATE | Modifiers::STATIC,
            &TypeRef::int(),
            "seed",
            Expr::int(7),
        )?;
        s.static_init()?;
        s.assign(
            seed.clone(),
            Expr::binary(BinaryOp::Mul, seed.clone(), Expr::int(6)),
        )?;
        s.end()?;
        s.method(Modifiers::PUBLIC | Modifiers::STATIC, &TypeRef::int(), "seed")?;
        s.body()?;
        s.ret(Some(seed))?;
        s.end()?;
        s.method(Modifiers::PUBLIC | Modifiers::STATIC, &TypeRef::int(), "twice")?;
        s.body()?;
        let once = Expr::call_static(owner, "seed", Vec::new());
        s.ret(Some(Expr::binary(BinaryOp::Add, once.clone(), once)))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    let handle = vm.load(&bytes, "demo.Seeds").unwrap();
    assert_eq!(handle.static_value("seed"), Some(Value::Int(42)));
    assert_eq!(
        vm.invoke_static("demo.Seeds", "twice", Vec::new()).unwrap(),
        Value::Int(84)
    );
    assert_eq!(vm.static_field("demo.Seeds", "seed").unwrap(), Value::Int(42));
}

#[test]
fn test_failing_static_initializer_unloads() {
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Broken", None)?;
        let illegal = s.ty("java.lang.IllegalStateException")?;
        s.static_init()?;
        s.throw(Expr::new_instance(illegal, vec![Expr::str("no")]))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    assert!(matches!(
        vm.load(&bytes, "demo.Broken"),
        Err(VmError::UncaughtException { .. })
    ));
    assert!(vm.class("demo.Broken").is_none());
}

#[test]
fn test_load_rejections() {
    let bytes = compile(counter);
    let mut vm = Vm::new();
    assert!(matches!(
        vm.load(&bytes, "demo.Other"),
        Err(VmError::NameMismatch { .. })
    ));
    vm.load(&bytes, "demo.Counter").unwrap();
    assert!(matches!(
        vm.load(&bytes, "demo.Counter"),
        Err(VmError::DuplicateClass(_))
    ));

    let mut corrupt = bytes.clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    assert!(matches!(
        Vm::new().load(&corrupt, "demo.Counter"),
        Err(VmError::ClassFormat(_))
    ));

    let orphan = compile(|s| {
        let base = s.ty("demo.Missing")?;
        s.class(Modifiers::PUBLIC, "demo.Orphan", Some(&base))?;
        s.end()
    });
    assert!(matches!(
        Vm::new().load(&orphan, "demo.Orphan"),
        Err(VmError::UnknownClass(name)) if name == "demo.Missing"
    ));
}

#[test]
fn test_loaded_exception_subclass() {
    let exception = compile(|s| {
        let base = s.ty("java.lang.RuntimeException")?;
        s.class(Modifiers::PUBLIC, "demo.Oops", Some(&base))?;
        s.end()
    });
    let mut vm = Vm::new();
    vm.load(&exception, "demo.Oops").unwrap();

    let oops = vm.new_instance("demo.Oops", Vec::new()).unwrap();
    assert!(vm.invoke(&oops, "getMessage", Vec::new()).unwrap().is_null());
    assert!(oops
        .as_object()
        .unwrap()
        .class()
        .is_subclass_of("java.lang.Throwable"));
}

#[test]
fn test_short_circuit_and_comparisons() {
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Logic", None)?;
        s.method(Modifiers::PUBLIC | Modifiers::STATIC, &TypeRef::boolean(), "inRange")?;
        let x = s.arg(&TypeRef::int(), "x")?;
        s.body()?;
        s.ret(Some(Expr::and(
            Expr::binary(BinaryOp::Ge, x.clone(), Expr::int(0)),
            Expr::not(Expr::binary(BinaryOp::Gt, x, Expr::int(10))),
        )))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new();
    vm.load(&bytes, "demo.Logic").unwrap();
    for (x, expected) in [(-1, false), (0, true), (10, true), (11, false)] {
        assert_eq!(
            vm.invoke_static("demo.Logic", "inRange", vec![Value::Int(x)])
                .unwrap(),
            Value::Bool(expected),
            "x = {}",
            x
        );
    }
}

#[test]
fn test_call_depth_is_bounded() {
    let bytes = compile(|s| {
        s.class(Modifiers::PUBLIC, "demo.Forever", None)?;
        s.method(Modifiers::PUBLIC, &TypeRef::void(), "spin")?;
        s.body()?;
        s.expr(Expr::call(Expr::This, "spin", Vec::new()))?;
        s.end()?;
        s.end()
    });

    let mut vm = Vm::new().with_max_depth(16);
    vm.load(&bytes, "demo.Forever").unwrap();
    let forever = vm.new_instance("demo.Forever", Vec::new()).unwrap();
    assert!(matches!(
        vm.invoke(&forever, "spin", Vec::new()),
        Err(VmError::StackOverflow)
    ));
}

#[test]
fn test_catch_all_entry_resets_operands() {
    // two dead operands are on the stack when the exception is thrown
    let mut file = ClassFile::new("demo.Raw", "java.lang.Object");
    let exception = file
        .constants
        .intern("java.lang.IllegalStateException")
        .unwrap();
    let mut code = BytecodeWriter::new();
    code.emit_const_i32(1);
    code.emit_const_i32(2);
    code.emit_new(exception, 0);
    code.emit_throw();
    let handler = code.offset() as u32;
    code.emit_pop();
    code.emit_const_i32(9);
    code.emit_return();
    file.methods.push(MethodInfo {
        name: "recover".to_string(),
        descriptor: "()int".to_string(),
        access: AccessFlags::PUBLIC | AccessFlags::STATIC,
        param_count: 0,
        max_locals: 0,
        code: code.into_bytes(),
        exception_table: vec![ExceptionEntry {
            start: 0,
            end: handler,
            handler,
            catch_type: None,
        }],
        local_names: Vec::new(),
    });

    let mut vm = Vm::new();
    vm.load(&file.encode(), "demo.Raw").unwrap();
    assert_eq!(
        vm.invoke_static("demo.Raw", "recover", Vec::new()).unwrap(),
        Value::Int(9)
    );
}

/// Host class recording every `record(int)` call; `fail()` throws `demo.Oops`
struct Recorder {
    seen: Rc<RefCell<Vec<i32>>>,
}

impl NativeClass for Recorder {
    fn name(&self) -> &str {
        "demo.Recorder"
    }

    fn has_method(&self, name: &str, argc: usize) -> bool {
        matches!((name, argc), ("<init>", 0) | ("record", 1) | ("fail", 0))
    }

    fn invoke(
        &self,
        vm: &mut Vm,
        _this: Option<&ObjectRef>,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        match name {
            "<init>" => Ok(Completion::Return(Value::Null)),
            "record" => {
                let id = args[0].as_i32().unwrap_or(-1);
                self.seen.borrow_mut().push(id);
                Ok(Completion::Return(Value::Bool(id % 2 == 0)))
            }
            _ => vm.throw_new("demo.Oops", Vec::new()),
        }
    }
}

#[test]
fn test_native_superclass() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new();
    vm.define_native(Rc::new(Recorder { seen: seen.clone() }))
        .unwrap();

    let oops = compile(|s| {
        let base = s.ty("java.lang.RuntimeException")?;
        s.class(Modifiers::PUBLIC, "demo.Oops", Some(&base))?;
        s.end()
    });
    vm.load(&oops, "demo.Oops").unwrap();

    let bytes = compile(|s| {
        let base = s.ty("demo.Recorder")?;
        let oops = s.ty("demo.Oops")?;
        s.class(Modifiers::PUBLIC, "demo.Probe", Some(&base))?;
        s.method(Modifiers::PUBLIC, &TypeRef::int(), "probe")?;
        s.body()?;
        s.if_(Expr::call(Expr::This, "record", vec![Expr::int(2)]))?;
        s.expr(Expr::call(Expr::This, "record", vec![Expr::int(3)]))?;
        s.end()?;
        s.try_()?;
        s.expr(Expr::call(Expr::This, "fail", Vec::new()))?;
        s.catch_(&oops, "e")?;
        s.ret(Some(Expr::int(1)))?;
        s.end()?;
        s.ret(Some(Expr::int(0)))?;
        s.end()?;
        s.end()
    });
    vm.load(&bytes, "demo.Probe").unwrap();

    let probe = vm.new_instance("demo.Probe", Vec::new()).unwrap();
    assert_eq!(vm.invoke(&probe, "probe", Vec::new()).unwrap(), Value::Int(1));
    assert_eq!(*seen.borrow(), vec![2, 3]);
}
