//! `flow.ControlBase`, the host superclass of the generated flow programs
//!
//! `trace(int)` records its argument and then consults the armed script:
//! the recorded position selects the scripted point, whose action decides
//! between returning true, returning false and throwing. A call that does
//! not match the script throws `java.lang.IllegalStateException`, so a
//! diverging program stops at the first wrong step.

use crate::dsl::{Action, TracePoint};
use crate::program::CONTROL_BASE;
use classgen_vm::{Completion, NativeClass, ObjectRef, Value, Vm, VmResult};
use log::trace;
use std::cell::RefCell;

const ILLEGAL_STATE: &str = "java.lang.IllegalStateException";

#[derive(Debug, Default)]
struct Script {
    points: Vec<TracePoint>,
    recorded: Vec<i32>,
}

#[derive(Debug, Default)]
pub struct ControlBase {
    script: RefCell<Script>,
}

impl ControlBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the script and clear the recorded trace
    pub fn arm(&self, points: Vec<TracePoint>) {
        *self.script.borrow_mut() = Script {
            points,
            recorded: Vec::new(),
        };
    }

    pub fn recorded(&self) -> Vec<i32> {
        self.script.borrow().recorded.clone()
    }

    /// Record `id` and return the action the script assigns to it
    fn step(&self, id: i32) -> Result<Action, String> {
        let mut script = self.script.borrow_mut();
        let position = script.recorded.len();
        script.recorded.push(id);
        match script.points.get(position) {
            Some(point) if point.id == id => Ok(point.action.clone()),
            Some(point) => Err(format!(
                "trace({}) at step {}, expected trace({})",
                id,
                position + 1,
                point.id
            )),
            None => Err(format!(
                "trace({}) after the {} scripted step(s)",
                id, position
            )),
        }
    }
}

impl NativeClass for ControlBase {
    fn name(&self) -> &str {
        CONTROL_BASE
    }

    fn has_method(&self, name: &str, argc: usize) -> bool {
        matches!((name, argc), ("<init>", 0) | ("trace", 1))
    }

    fn invoke(
        &self,
        vm: &mut Vm,
        _this: Option<&ObjectRef>,
        name: &str,
        args: Vec<Value>,
    ) -> VmResult<Completion> {
        if name == "<init>" {
            return Ok(Completion::Return(Value::Null));
        }

        let id = match args.first().and_then(Value::as_i32) {
            Some(id) => id,
            None => return vm.throw_new(ILLEGAL_STATE, vec![Value::str("trace needs an int")]),
        };
        match self.step(id) {
            Ok(Action::Pass) => Ok(Completion::Return(Value::Bool(true))),
            Ok(Action::Fail) => Ok(Completion::Return(Value::Bool(false))),
            Ok(Action::Throw(class)) => {
                trace!("trace({}) throws {}", id, class);
                vm.throw_new(&class, Vec::new())
            }
            Err(message) => {
                trace!("{}", message);
                vm.throw_new(ILLEGAL_STATE, vec![Value::str(&message)])
            }
        }
    }
}
