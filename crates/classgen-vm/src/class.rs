//! Runtime classes and the class registry

use crate::native::NativeClass;
use crate::value::Value;
use classgen_bytecode::{ClassFile, FieldInfo, MethodInfo};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Where a class's behaviour comes from
pub(crate) enum ClassBody {
    Loaded(ClassFile),
    Native(Rc<dyn NativeClass>),
}

/// A class known to the VM
pub struct RuntimeClass {
    name: String,
    superclass: Option<Rc<RuntimeClass>>,
    body: ClassBody,
    statics: RefCell<FxHashMap<String, Value>>,
}

/// A resolved method
#[derive(Clone)]
pub(crate) enum MethodRef {
    /// Index into the declaring class's method table
    Bytecode { class: Rc<RuntimeClass>, index: usize },
    Native(Rc<dyn NativeClass>),
}

impl RuntimeClass {
    pub(crate) fn loaded(file: ClassFile, superclass: Rc<RuntimeClass>) -> Self {
        let statics = file
            .fields
            .iter()
            .filter(|f| f.access.is_static())
            .map(|f| (f.name.clone(), Value::default_for(&f.type_name)))
            .collect();
        Self {
            name: file.this_class.clone(),
            superclass: Some(superclass),
            body: ClassBody::Loaded(file),
            statics: RefCell::new(statics),
        }
    }

    pub(crate) fn native(native: Rc<dyn NativeClass>, superclass: Option<Rc<RuntimeClass>>) -> Self {
        Self {
            name: native.name().to_string(),
            superclass,
            body: ClassBody::Native(native),
            statics: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Rc<RuntimeClass>> {
        self.superclass.as_ref()
    }

    /// Class file of a loaded class
    pub fn file(&self) -> Option<&ClassFile> {
        match &self.body {
            ClassBody::Loaded(file) => Some(file),
            ClassBody::Native(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, ClassBody::Native(_))
    }

    pub fn is_abstract(&self) -> bool {
        match &self.body {
            ClassBody::Loaded(file) => file.access.is_abstract(),
            ClassBody::Native(native) => native.is_abstract(),
        }
    }

    /// Whether this class is `name` or inherits from it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == name {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    /// Default-initialised instance fields along the superclass chain
    pub(crate) fn instance_fields(&self) -> FxHashMap<String, Value> {
        let mut fields = FxHashMap::default();
        let mut current = Some(self);
        while let Some(class) = current {
            if let ClassBody::Loaded(file) = &class.body {
                for field in file.fields.iter().filter(|f| !f.access.is_static()) {
                    fields
                        .entry(field.name.clone())
                        .or_insert_with(|| Value::default_for(&field.type_name));
                }
            }
            current = class.superclass.as_deref();
        }
        fields
    }

    /// Method declared by this class itself
    pub(crate) fn declared_method(
        self: &Rc<Self>,
        name: &str,
        argc: usize,
        is_static: bool,
    ) -> Option<MethodRef> {
        match &self.body {
            ClassBody::Loaded(file) => file
                .methods
                .iter()
                .position(|m| {
                    m.name == name
                        && m.param_count as usize == argc
                        && m.access.is_static() == is_static
                        && !m.code.is_empty()
                })
                .map(|index| MethodRef::Bytecode {
                    class: Rc::clone(self),
                    index,
                }),
            ClassBody::Native(native) => native
                .has_method(name, argc)
                .then(|| MethodRef::Native(Rc::clone(native))),
        }
    }

    /// Resolve by name and arity, walking up from this class
    pub(crate) fn resolve_method(
        self: &Rc<Self>,
        name: &str,
        argc: usize,
        is_static: bool,
    ) -> Option<MethodRef> {
        let mut current = Some(Rc::clone(self));
        while let Some(class) = current {
            if let Some(found) = class.declared_method(name, argc, is_static) {
                return Some(found);
            }
            current = class.superclass.clone();
        }
        None
    }

    /// Class along the chain that declares static field `name`
    pub(crate) fn static_owner(self: &Rc<Self>, name: &str) -> Option<Rc<RuntimeClass>> {
        let mut current = Some(Rc::clone(self));
        while let Some(class) = current {
            if class.statics.borrow().contains_key(name) {
                return Some(class);
            }
            current = class.superclass.clone();
        }
        None
    }

    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.statics.borrow().get(name).cloned()
    }

    pub(crate) fn set_static(&self, name: &str, value: Value) {
        self.statics.borrow_mut().insert(name.to_string(), value);
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field("native", &self.is_native())
            .finish()
    }
}

/// Handle to a class defined in a [`Vm`](crate::Vm)
///
/// For loaded classes the declared members are exactly the class file's, in
/// table order.
#[derive(Clone, Debug)]
pub struct ClassHandle(Rc<RuntimeClass>);

impl ClassHandle {
    pub(crate) fn new(class: Rc<RuntimeClass>) -> Self {
        Self(class)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn superclass_name(&self) -> Option<&str> {
        self.0.superclass().map(|s| s.name())
    }

    pub fn is_native(&self) -> bool {
        self.0.is_native()
    }

    pub fn fields(&self) -> &[FieldInfo] {
        self.0.file().map(|f| f.fields.as_slice()).unwrap_or(&[])
    }

    pub fn methods(&self) -> &[MethodInfo] {
        self.0.file().map(|f| f.methods.as_slice()).unwrap_or(&[])
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.0.file().and_then(|f| f.method(name, descriptor))
    }

    /// Current value of a static field declared by this class
    pub fn static_value(&self, name: &str) -> Option<Value> {
        self.0.get_static(name)
    }

    pub fn runtime_class(&self) -> &Rc<RuntimeClass> {
        &self.0
    }
}

/// Classes by name, in definition order
#[derive(Default)]
pub struct ClassRegistry {
    classes: FxHashMap<String, Rc<RuntimeClass>>,
    order: Vec<String>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Rc<RuntimeClass>> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub(crate) fn insert(&mut self, class: Rc<RuntimeClass>) {
        let name = class.name().to_string();
        if self.classes.insert(name.clone(), class).is_none() {
            self.order.push(name);
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Rc<RuntimeClass>> {
        self.order.retain(|n| n != name);
        self.classes.remove(name)
    }

    /// Class names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
