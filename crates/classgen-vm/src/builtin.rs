//! Built-in `java.lang` classes
//!
//! `java.lang.Object` is the root of every hierarchy. The throwable classes
//! keep their message in a `message` field so that loaded subclasses inherit
//! `getMessage()`.

use crate::interpreter::Vm;
use crate::native::{Completion, NativeClass};
use crate::value::{ObjectRef, Value};
use crate::{VmError, VmResult};
use std::rc::Rc;

pub const OBJECT: &str = "java.lang.Object";
pub const THROWABLE: &str = "java.lang.Throwable";
pub const NULL_POINTER_EXCEPTION: &str = "java.lang.NullPointerException";

/// Field holding a throwable's message
pub const MESSAGE_FIELD: &str = "message";

/// Throwable hierarchy as (class, superclass), parents first
const THROWABLES: &[(&str, &str)] = &[
    (THROWABLE, OBJECT),
    ("java.lang.Exception", THROWABLE),
    ("java.lang.Error", THROWABLE),
    ("java.lang.RuntimeException", "java.lang.Exception"),
    ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
    ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ("java.lang.UnsupportedOperationException", "java.lang.RuntimeException"),
    ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
    (NULL_POINTER_EXCEPTION, "java.lang.RuntimeException"),
];

/// Every built-in class, parents before children
pub fn classes() -> Vec<Rc<dyn NativeClass>> {
    let mut classes: Vec<Rc<dyn NativeClass>> = vec![Rc::new(JavaObject)];
    for &(name, superclass) in THROWABLES {
        classes.push(Rc::new(ThrowableClass { name, superclass }));
    }
    classes
}

fn receiver<'a>(this: Option<&'a ObjectRef>, class: &str, name: &str) -> VmResult<&'a ObjectRef> {
    this.ok_or_else(|| VmError::TypeError(format!("{}.{} needs a receiver", class, name)))
}

/// `java.lang.Object`
struct JavaObject;

impl NativeClass for JavaObject {
    fn name(&self) -> &str {
        OBJECT
    }

    fn superclass(&self) -> Option<&str> {
        None
    }

    fn has_method(&self, name: &str, argc: usize) -> bool {
        matches!(
            (name, argc),
            ("<init>", 0) | ("toString", 0) | ("hashCode", 0) | ("equals", 1)
        )
    }

    fn invoke(
        &self,
        _vm: &mut Vm,
        this: Option<&ObjectRef>,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        let this = receiver(this, OBJECT, name)?;
        let value = match name {
            "<init>" => Value::Null,
            "toString" => Value::str(&Value::Object(Rc::clone(this)).to_string()),
            "hashCode" => Value::Int(Rc::as_ptr(this) as usize as i32),
            "equals" => {
                let other = args.into_iter().next().unwrap_or(Value::Null);
                Value::Bool(Value::Object(Rc::clone(this)) == other)
            }
            other => {
                return Err(VmError::NoSuchMethod {
                    class: OBJECT.to_string(),
                    name: other.to_string(),
                    argc: args.len(),
                })
            }
        };
        Ok(Completion::Return(value))
    }
}

/// `java.lang.Throwable` and its built-in subclasses
struct ThrowableClass {
    name: &'static str,
    superclass: &'static str,
}

impl NativeClass for ThrowableClass {
    fn name(&self) -> &str {
        self.name
    }

    fn superclass(&self) -> Option<&str> {
        Some(self.superclass)
    }

    fn has_method(&self, name: &str, argc: usize) -> bool {
        matches!((name, argc), ("<init>", 0) | ("<init>", 1) | ("getMessage", 0))
    }

    fn invoke(
        &self,
        _vm: &mut Vm,
        this: Option<&ObjectRef>,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        let this = receiver(this, self.name, name)?;
        match name {
            "<init>" => {
                let message = args.into_iter().next().unwrap_or(Value::Null);
                match message {
                    Value::Null | Value::Str(_) => this.define_field(MESSAGE_FIELD, message),
                    other => {
                        return Err(VmError::TypeError(format!(
                            "{} message must be a string, got {}",
                            self.name,
                            other.type_name()
                        )))
                    }
                }
                Ok(Completion::Return(Value::Null))
            }
            "getMessage" => Ok(Completion::Return(
                this.get_field(MESSAGE_FIELD).unwrap_or(Value::Null),
            )),
            other => Err(VmError::NoSuchMethod {
                class: self.name.to_string(),
                name: other.to_string(),
                argc: args.len(),
            }),
        }
    }
}

/// Message of a thrown object, empty when unset
pub fn message_of(exception: &ObjectRef) -> String {
    match exception.get_field(MESSAGE_FIELD) {
        Some(Value::Str(s)) => s.to_string(),
        _ => String::new(),
    }
}

/// Virtual methods on string values
pub(crate) fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Value> {
    let value = match (name, args) {
        ("length", []) => Value::Int(s.chars().count() as i32),
        ("isEmpty", []) => Value::Bool(s.is_empty()),
        ("toString", []) => Value::str(s),
        ("equals", [other]) => Value::Bool(other.as_str() == Some(s)),
        ("concat", [Value::Str(other)]) => Value::str(&format!("{}{}", s, other)),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_is_ordered() {
        let classes = classes();
        let mut seen = Vec::new();
        for class in &classes {
            if let Some(parent) = class.superclass() {
                assert!(seen.contains(&parent.to_string()), "{}", class.name());
            }
            seen.push(class.name().to_string());
        }
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(string_method("abc", "length", &[]), Some(Value::Int(3)));
        assert_eq!(
            string_method("abc", "equals", &[Value::str("abc")]),
            Some(Value::Bool(true))
        );
        assert_eq!(
            string_method("ab", "concat", &[Value::str("c")]),
            Some(Value::str("abc"))
        );
        assert_eq!(string_method("abc", "charAt", &[Value::Int(0)]), None);
    }
}
