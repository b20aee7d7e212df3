//! Call frames
//!
//! Each method activation owns its local slots and its operand stack. The
//! receiver (for instance methods) and the arguments occupy the first slots.

use crate::{value::Value, VmError, VmResult};

/// Maximum operand stack depth per frame
const MAX_OPERANDS: usize = 1024;

/// Activation record of one method invocation
#[derive(Debug)]
pub struct CallFrame {
    locals: Vec<Value>,
    operands: Vec<Value>,
}

impl CallFrame {
    /// Create a frame with `local_count` slots, the first ones holding `args`
    pub fn new(local_count: usize, args: Vec<Value>) -> VmResult<Self> {
        if args.len() > local_count {
            return Err(VmError::RuntimeError(format!(
                "{} argument slot(s) do not fit in {} local(s)",
                args.len(),
                local_count
            )));
        }
        let mut locals = args;
        locals.resize(local_count, Value::Null);
        Ok(Self {
            locals,
            operands: Vec::with_capacity(16),
        })
    }

    // ===== Operand Stack =====

    /// Push a value onto the operand stack
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.operands.len() >= MAX_OPERANDS {
            return Err(VmError::StackOverflow);
        }
        self.operands.push(value);
        Ok(())
    }

    /// Pop the top operand
    pub fn pop(&mut self) -> VmResult<Value> {
        self.operands.pop().ok_or(VmError::StackUnderflow)
    }

    /// Peek at the top operand
    pub fn peek(&self) -> VmResult<&Value> {
        self.operands.last().ok_or(VmError::StackUnderflow)
    }

    /// Pop `count` operands, returned in push order
    pub fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        let len = self.operands.len();
        if count > len {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.operands.split_off(len - count))
    }

    /// Discard all operands (handler entry)
    pub fn clear_operands(&mut self) {
        self.operands.clear();
    }

    pub fn depth(&self) -> usize {
        self.operands.len()
    }

    // ===== Locals =====

    pub fn load(&self, index: usize) -> VmResult<Value> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::RuntimeError(format!("local slot {} out of range", index)))
    }

    pub fn store(&mut self, index: usize, value: Value) -> VmResult<()> {
        match self.locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::RuntimeError(format!(
                "local slot {} out of range",
                index
            ))),
        }
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}
