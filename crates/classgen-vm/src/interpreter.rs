//! Bytecode interpreter
//!
//! Every method invocation runs in its own [`CallFrame`]. Calls recurse on the
//! host stack, bounded by the VM's maximum call depth. A managed exception
//! travels as [`Completion::Throw`]: inside a method it is matched against the
//! exception table (first covering entry whose catch type matches, in table
//! order), otherwise it is handed back to the caller.

use crate::builtin::{self, NULL_POINTER_EXCEPTION, THROWABLE};
use crate::class::{ClassHandle, ClassRegistry, MethodRef, RuntimeClass};
use crate::native::{Completion, NativeClass};
use crate::stack::CallFrame;
use crate::value::{Object, ObjectRef, Value};
use crate::{VmError, VmResult};
use classgen_bytecode::{
    BytecodeReader, ClassFile, Instruction, MethodInfo, Opcode, Operands, CONSTRUCTOR_NAME,
    STATIC_INIT_NAME,
};
use log::{debug, trace};
use std::cmp::Ordering;
use std::rc::Rc;

/// Default maximum call depth
const DEFAULT_MAX_DEPTH: usize = 512;

/// Effect of one instruction on control flow
enum Step {
    Next,
    Jump(usize),
    Return(Value),
    Throw(ObjectRef),
}

/// The virtual machine: class registry plus interpreter state
pub struct Vm {
    classes: ClassRegistry,
    depth: usize,
    max_depth: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM with the built-in `java.lang` classes defined
    pub fn new() -> Self {
        let mut vm = Self {
            classes: ClassRegistry::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        };
        for native in builtin::classes() {
            let superclass = native
                .superclass()
                .and_then(|name| vm.classes.get(name).cloned());
            vm.classes
                .insert(Rc::new(RuntimeClass::native(native, superclass)));
        }
        vm
    }

    /// Limit the call depth (default 512)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn class(&self, name: &str) -> Option<ClassHandle> {
        self.classes.get(name).cloned().map(ClassHandle::new)
    }

    fn lookup(&self, name: &str) -> VmResult<Rc<RuntimeClass>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownClass(name.to_string()))
    }

    // ===== Class Definition =====

    /// Define a host-native class; its superclass must already be defined
    pub fn define_native(&mut self, native: Rc<dyn NativeClass>) -> VmResult<ClassHandle> {
        let name = native.name().to_string();
        if self.classes.contains(&name) {
            return Err(VmError::DuplicateClass(name));
        }
        let superclass = match native.superclass() {
            Some(superclass) => Some(self.lookup(superclass)?),
            None => None,
        };
        let class = Rc::new(RuntimeClass::native(native, superclass));
        self.classes.insert(Rc::clone(&class));
        debug!("defined native class {}", name);
        Ok(ClassHandle::new(class))
    }

    /// Define a decoded class and run its static initializer
    ///
    /// If the initializer throws, the class is removed again and the
    /// exception is reported as [`VmError::UncaughtException`].
    pub fn define_class(&mut self, file: ClassFile) -> VmResult<ClassHandle> {
        let name = file.this_class.clone();
        if self.classes.contains(&name) {
            return Err(VmError::DuplicateClass(name));
        }
        let superclass = self.lookup(&file.super_class)?;
        let class = Rc::new(RuntimeClass::loaded(file, superclass));
        self.classes.insert(Rc::clone(&class));
        debug!(
            "loaded class {} ({} fields, {} methods)",
            name,
            class.file().map_or(0, |f| f.fields.len()),
            class.file().map_or(0, |f| f.methods.len())
        );

        if let Err(err) = self.initialize(&class) {
            self.classes.remove(&name);
            return Err(err);
        }
        Ok(ClassHandle::new(class))
    }

    fn initialize(&mut self, class: &Rc<RuntimeClass>) -> VmResult<()> {
        let Some(clinit) = class.declared_method(STATIC_INIT_NAME, 0, true) else {
            return Ok(());
        };
        trace!("initializing {}", class.name());
        match self.invoke_ref(&clinit, STATIC_INIT_NAME, None, Vec::new())? {
            Completion::Return(_) => Ok(()),
            Completion::Throw(exception) => Err(Self::uncaught(&exception)),
        }
    }

    // ===== Host Entry Points =====

    /// Construct an instance; an escaping exception becomes an error
    pub fn new_instance(&mut self, class: &str, args: Vec<Value>) -> VmResult<Value> {
        let completion = self.instantiate(class, args)?;
        Self::complete(completion)
    }

    /// Call an instance method by name and arity
    pub fn invoke(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let completion = self.call_virtual(receiver.clone(), name, args)?;
        Self::complete(completion)
    }

    /// Call a static method by name and arity
    pub fn invoke_static(&mut self, class: &str, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let completion = self.call_static(class, name, args)?;
        Self::complete(completion)
    }

    /// Read a static field, searching the superclass chain
    pub fn static_field(&self, class: &str, name: &str) -> VmResult<Value> {
        let class = self.lookup(class)?;
        class
            .static_owner(name)
            .and_then(|owner| owner.get_static(name))
            .ok_or_else(|| VmError::NoSuchField {
                class: class.name().to_string(),
                name: name.to_string(),
            })
    }

    fn complete(completion: Completion) -> VmResult<Value> {
        match completion {
            Completion::Return(value) => Ok(value),
            Completion::Throw(exception) => Err(Self::uncaught(&exception)),
        }
    }

    /// Error describing an exception that escaped to the host
    pub fn uncaught(exception: &ObjectRef) -> VmError {
        VmError::UncaughtException {
            class: exception.class_name().to_string(),
            message: builtin::message_of(exception),
        }
    }

    // ===== Calls =====

    /// Allocate `class` and run the constructor matching `args`
    pub fn instantiate(&mut self, class: &str, args: Vec<Value>) -> VmResult<Completion> {
        let class = self.lookup(class)?;
        if class.is_abstract() {
            return Err(VmError::Instantiation(class.name().to_string()));
        }
        let ctor = class
            .declared_method(CONSTRUCTOR_NAME, args.len(), false)
            .ok_or_else(|| no_such_method(class.name(), CONSTRUCTOR_NAME, args.len()))?;
        let object = Rc::new(Object::new(Rc::clone(&class), class.instance_fields()));
        match self.invoke_ref(&ctor, CONSTRUCTOR_NAME, Some(&object), args)? {
            Completion::Return(_) => Ok(Completion::Return(Value::Object(object))),
            thrown => Ok(thrown),
        }
    }

    /// Construct an exception and put it in flight
    pub fn throw_new(&mut self, class: &str, args: Vec<Value>) -> VmResult<Completion> {
        match self.instantiate(class, args)? {
            Completion::Return(Value::Object(exception)) => Ok(Completion::Throw(exception)),
            Completion::Return(other) => Err(VmError::TypeError(format!(
                "constructing {} produced {}",
                class,
                other.type_name()
            ))),
            thrown => Ok(thrown),
        }
    }

    /// Virtual dispatch on the receiver's runtime class
    pub fn call_virtual(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        match receiver {
            Value::Object(object) => {
                let class = Rc::clone(object.class());
                let method = class
                    .resolve_method(name, args.len(), false)
                    .ok_or_else(|| no_such_method(class.name(), name, args.len()))?;
                self.invoke_ref(&method, name, Some(&object), args)
            }
            Value::Str(s) => builtin::string_method(&s, name, &args)
                .map(Completion::Return)
                .ok_or_else(|| no_such_method("java.lang.String", name, args.len())),
            Value::Null => self.throw_null(&format!("cannot invoke {}() on null", name)),
            other => Err(VmError::TypeError(format!(
                "cannot invoke {}() on {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Non-virtual call starting at `class` (superclass constructors)
    pub fn call_special(
        &mut self,
        class: &str,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        let class = self.lookup(class)?;
        let object = match receiver {
            Value::Object(object) => object,
            Value::Null => return self.throw_null(&format!("cannot invoke {}() on null", name)),
            other => {
                return Err(VmError::TypeError(format!(
                    "cannot invoke {}.{}() on {}",
                    class.name(),
                    name,
                    other.type_name()
                )))
            }
        };
        let method = if name == CONSTRUCTOR_NAME {
            class.declared_method(name, args.len(), false)
        } else {
            class.resolve_method(name, args.len(), false)
        };
        let method = method.ok_or_else(|| no_such_method(class.name(), name, args.len()))?;
        self.invoke_ref(&method, name, Some(&object), args)
    }

    pub fn call_static(&mut self, class: &str, name: &str, args: Vec<Value>) -> VmResult<Completion> {
        let class = self.lookup(class)?;
        let method = class
            .resolve_method(name, args.len(), true)
            .ok_or_else(|| no_such_method(class.name(), name, args.len()))?;
        self.invoke_ref(&method, name, None, args)
    }

    fn throw_null(&mut self, message: &str) -> VmResult<Completion> {
        self.throw_new(NULL_POINTER_EXCEPTION, vec![Value::str(message)])
    }

    fn invoke_ref(
        &mut self,
        method: &MethodRef,
        name: &str,
        this: Option<&ObjectRef>,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        if self.depth >= self.max_depth {
            return Err(VmError::StackOverflow);
        }
        self.depth += 1;
        let result = match method {
            MethodRef::Bytecode { class, index } => {
                let mut slots = Vec::with_capacity(args.len() + 1);
                if let Some(this) = this {
                    slots.push(Value::Object(Rc::clone(this)));
                }
                slots.extend(args);
                self.execute(class, *index, slots)
            }
            MethodRef::Native(native) => {
                let native = Rc::clone(native);
                native.invoke(self, this, name, args)
            }
        };
        self.depth -= 1;
        result
    }

    // ===== Interpreter Loop =====

    fn execute(
        &mut self,
        class: &Rc<RuntimeClass>,
        index: usize,
        slots: Vec<Value>,
    ) -> VmResult<Completion> {
        let file = class
            .file()
            .ok_or_else(|| VmError::RuntimeError(format!("{} has no bytecode", class.name())))?;
        let method = file.methods.get(index).ok_or_else(|| {
            VmError::RuntimeError(format!("{} has no method #{}", class.name(), index))
        })?;
        trace!("invoke {}.{}{}", file.this_class, method.name, method.descriptor);

        let mut frame = CallFrame::new(method.max_locals as usize, slots)?;
        let mut reader = BytecodeReader::new(&method.code);

        loop {
            if !reader.has_more() {
                return Err(VmError::RuntimeError(format!(
                    "execution fell off the end of {}.{}",
                    file.this_class, method.name
                )));
            }

            let instruction = reader.read_instruction()?;
            let offset = instruction.offset;

            match self.step(file, &mut frame, instruction)? {
                Step::Next => {}
                Step::Jump(target) => reader.seek(target),
                Step::Return(value) => return Ok(Completion::Return(value)),
                Step::Throw(exception) => match handler_for(method, offset, &exception) {
                    Some(handler) => {
                        trace!(
                            "{} caught at {} in {}.{}, handler {}",
                            exception.class_name(),
                            offset,
                            file.this_class,
                            method.name,
                            handler
                        );
                        frame.clear_operands();
                        frame.push(Value::Object(exception))?;
                        reader.seek(handler);
                    }
                    None => return Ok(Completion::Throw(exception)),
                },
            }
        }
    }

    fn step(
        &mut self,
        file: &ClassFile,
        frame: &mut CallFrame,
        instruction: Instruction,
    ) -> VmResult<Step> {
        let pool = &file.constants;
        let constant = |index: u32| {
            pool.get_string(index).ok_or_else(|| {
                VmError::RuntimeError(format!("invalid constant pool index {}", index))
            })
        };

        match (instruction.opcode, instruction.operands) {
            // Stack manipulation
            (Opcode::Nop, _) => {}
            (Opcode::Pop, _) => {
                frame.pop()?;
            }
            (Opcode::Dup, _) => {
                let top = frame.peek()?.clone();
                frame.push(top)?;
            }

            // Constants
            (Opcode::ConstNull, _) => frame.push(Value::Null)?,
            (Opcode::ConstTrue, _) => frame.push(Value::Bool(true))?,
            (Opcode::ConstFalse, _) => frame.push(Value::Bool(false))?,
            (Opcode::ConstI32, Operands::I32(value)) => frame.push(Value::Int(value))?,
            (Opcode::ConstI64, Operands::I64(value)) => frame.push(Value::Long(value))?,
            (Opcode::ConstF64, Operands::F64(value)) => frame.push(Value::Double(value))?,
            (Opcode::ConstStr, Operands::Pool(index)) => frame.push(Value::str(constant(index)?))?,

            // Local variables
            (Opcode::LoadLocal, Operands::Local(slot)) => {
                let value = frame.load(slot as usize)?;
                frame.push(value)?;
            }
            (Opcode::StoreLocal, Operands::Local(slot)) => {
                let value = frame.pop()?;
                frame.store(slot as usize, value)?;
            }

            // Arithmetic and comparison
            (op @ (Opcode::Nadd | Opcode::Nsub | Opcode::Nmul), _) => op_arith(frame, op)?,
            (Opcode::Eq, _) => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::Bool(a == b))?;
            }
            (Opcode::Ne, _) => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::Bool(a != b))?;
            }
            (op @ (Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge), _) => {
                op_compare(frame, op)?
            }
            (Opcode::Not, _) => {
                let value = pop_bool(frame)?;
                frame.push(Value::Bool(!value))?;
            }

            // Control flow
            (Opcode::Jmp, Operands::Jump(target)) => return Ok(Step::Jump(target)),
            (Opcode::JmpIfFalse, Operands::Jump(target)) => {
                if !pop_bool(frame)? {
                    return Ok(Step::Jump(target));
                }
            }
            (Opcode::JmpIfTrue, Operands::Jump(target)) => {
                if pop_bool(frame)? {
                    return Ok(Step::Jump(target));
                }
            }

            // Calls
            (Opcode::CallVirtual, Operands::Virtual { name, argc }) => {
                let args = frame.pop_n(argc as usize)?;
                let receiver = frame.pop()?;
                let completion = self.call_virtual(receiver, constant(name)?, args)?;
                return resume(frame, completion);
            }
            (Opcode::CallSpecial, Operands::Qualified { class, name, argc }) => {
                let args = frame.pop_n(argc as usize)?;
                let receiver = frame.pop()?;
                let completion =
                    self.call_special(constant(class)?, receiver, constant(name)?, args)?;
                return resume(frame, completion);
            }
            (Opcode::CallStatic, Operands::Qualified { class, name, argc }) => {
                let args = frame.pop_n(argc as usize)?;
                let completion = self.call_static(constant(class)?, constant(name)?, args)?;
                return resume(frame, completion);
            }
            (Opcode::Return, _) => return Ok(Step::Return(frame.pop()?)),
            (Opcode::ReturnVoid, _) => return Ok(Step::Return(Value::Null)),

            // Objects
            (Opcode::New, Operands::New { class, argc }) => {
                let args = frame.pop_n(argc as usize)?;
                let completion = self.instantiate(constant(class)?, args)?;
                return resume(frame, completion);
            }
            (Opcode::LoadField, Operands::Pool(name)) => {
                let name = constant(name)?;
                match frame.pop()? {
                    Value::Object(object) => {
                        let value = object
                            .get_field(name)
                            .ok_or_else(|| no_such_field(object.class_name(), name))?;
                        frame.push(value)?;
                    }
                    Value::Null => {
                        let completion = self.throw_null(&format!("cannot read field {}", name))?;
                        return resume(frame, completion);
                    }
                    other => return Err(not_an_object(name, &other)),
                }
            }
            (Opcode::StoreField, Operands::Pool(name)) => {
                let name = constant(name)?;
                let value = frame.pop()?;
                match frame.pop()? {
                    Value::Object(object) => {
                        if !object.set_field(name, value) {
                            return Err(no_such_field(object.class_name(), name));
                        }
                    }
                    Value::Null => {
                        let completion =
                            self.throw_null(&format!("cannot assign field {}", name))?;
                        return resume(frame, completion);
                    }
                    other => return Err(not_an_object(name, &other)),
                }
            }
            (Opcode::LoadStatic, Operands::Static { class, name }) => {
                let value = self.static_field(constant(class)?, constant(name)?)?;
                frame.push(value)?;
            }
            (Opcode::StoreStatic, Operands::Static { class, name }) => {
                let (class, name) = (constant(class)?, constant(name)?);
                let value = frame.pop()?;
                let owner = self
                    .lookup(class)?
                    .static_owner(name)
                    .ok_or_else(|| no_such_field(class, name))?;
                owner.set_static(name, value);
            }

            // Exceptions
            (Opcode::Throw, _) => match frame.pop()? {
                Value::Object(exception) if exception.class().is_subclass_of(THROWABLE) => {
                    return Ok(Step::Throw(exception));
                }
                Value::Null => {
                    let completion = self.throw_null("cannot throw null")?;
                    return resume(frame, completion);
                }
                other => {
                    return Err(VmError::TypeError(format!(
                        "cannot throw {}",
                        other.type_name()
                    )))
                }
            },

            (opcode, operands) => {
                return Err(VmError::RuntimeError(format!(
                    "malformed operands {:?} for {}",
                    operands,
                    opcode.name()
                )))
            }
        }
        Ok(Step::Next)
    }
}

/// Push a call's result, or propagate its exception into the current method
fn resume(frame: &mut CallFrame, completion: Completion) -> VmResult<Step> {
    match completion {
        Completion::Return(value) => {
            frame.push(value)?;
            Ok(Step::Next)
        }
        Completion::Throw(exception) => Ok(Step::Throw(exception)),
    }
}

/// First exception table entry covering `pc` whose catch type matches
fn handler_for(method: &MethodInfo, pc: usize, exception: &ObjectRef) -> Option<usize> {
    method
        .exception_table
        .iter()
        .find(|entry| {
            entry.covers(pc)
                && entry
                    .catch_type
                    .as_deref()
                    .map_or(true, |ty| exception.class().is_subclass_of(ty))
        })
        .map(|entry| entry.handler as usize)
}

fn pop_bool(frame: &mut CallFrame) -> VmResult<bool> {
    let value = frame.pop()?;
    value
        .as_bool()
        .ok_or_else(|| VmError::TypeError(format!("expected boolean, got {}", value.type_name())))
}

/// NADD/NSUB/NMUL: int arithmetic wraps, long when either side is long,
/// double when either side is floating; NADD concatenates when either
/// side is a string
fn op_arith(frame: &mut CallFrame, opcode: Opcode) -> VmResult<()> {
    let b = frame.pop()?;
    let a = frame.pop()?;

    if opcode == Opcode::Nadd && (a.as_str().is_some() || b.as_str().is_some()) {
        return frame.push(Value::str(&format!("{}{}", a, b)));
    }

    let result = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(match opcode {
            Opcode::Nadd => x.wrapping_add(*y),
            Opcode::Nsub => x.wrapping_sub(*y),
            _ => x.wrapping_mul(*y),
        }),
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Value::Long(match opcode {
                Opcode::Nadd => x.wrapping_add(y),
                Opcode::Nsub => x.wrapping_sub(y),
                _ => x.wrapping_mul(y),
            }),
            _ => {
                let (x, y) = a.as_f64().zip(b.as_f64()).ok_or_else(|| {
                    VmError::TypeError(format!(
                        "{} on {} and {}",
                        opcode.name(),
                        a.type_name(),
                        b.type_name()
                    ))
                })?;
                Value::Double(match opcode {
                    Opcode::Nadd => x + y,
                    Opcode::Nsub => x - y,
                    _ => x * y,
                })
            }
        },
    };
    frame.push(result)
}

fn op_compare(frame: &mut CallFrame, opcode: Opcode) -> VmResult<()> {
    let b = frame.pop()?;
    let a = frame.pop()?;

    let ordering = match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(VmError::TypeError(format!(
                    "{} on {} and {}",
                    opcode.name(),
                    a.type_name(),
                    b.type_name()
                )))
            }
        },
    };
    // NaN compares false both ways
    let result = ordering.map_or(false, |ordering| match opcode {
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Le => ordering != Ordering::Greater,
        Opcode::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    });
    frame.push(Value::Bool(result))
}

fn no_such_method(class: &str, name: &str, argc: usize) -> VmError {
    VmError::NoSuchMethod {
        class: class.to_string(),
        name: name.to_string(),
        argc,
    }
}

fn no_such_field(class: &str, name: &str) -> VmError {
    VmError::NoSuchField {
        class: class.to_string(),
        name: name.to_string(),
    }
}

fn not_an_object(field: &str, value: &Value) -> VmError {
    VmError::TypeError(format!(
        "field {} accessed on {}",
        field,
        value.type_name()
    ))
}
