//! Host-native classes
//!
//! A native class is implemented in Rust and participates in the class
//! hierarchy like a loaded one: loaded classes may extend it, and its methods
//! are found by the same name and arity lookup.

use crate::interpreter::Vm;
use crate::value::{ObjectRef, Value};
use crate::VmResult;

/// Result of running a method: a value or a managed exception in flight
#[derive(Debug, Clone)]
pub enum Completion {
    Return(Value),
    Throw(ObjectRef),
}

impl Completion {
    pub fn is_throw(&self) -> bool {
        matches!(self, Completion::Throw(_))
    }
}

/// A class implemented by the host
pub trait NativeClass {
    /// Fully-qualified class name
    fn name(&self) -> &str;

    /// Superclass name; `None` only for the root class
    fn superclass(&self) -> Option<&str> {
        Some("java.lang.Object")
    }

    fn is_abstract(&self) -> bool {
        false
    }

    /// Whether the class declares `name` taking `argc` arguments
    /// (constructors are `<init>`)
    fn has_method(&self, name: &str, argc: usize) -> bool;

    /// Run a method declared by this class. `this` is `None` for static calls.
    fn invoke(
        &self,
        vm: &mut Vm,
        this: Option<&ObjectRef>,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion>;
}
