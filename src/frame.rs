use std::rc::Rc;

use ahash::AHashMap;

use crate::heap::HeapId;
use crate::value::Value;

/// Register file size of frames created by calls to legacy-defined
/// functions and by top-level runs.
pub const LEGACY_REGISTER_COUNT: usize = 4;

/// Operand stack of a frame.
///
/// Scripted code can legitimately pop from an empty stack (truncated or
/// hand-built bytecode does this in the wild), so `pop` clamps to the
/// `undefined` value instead of failing. Pushes are unbounded.
#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Pops the top value, clamping underflow to `undefined`.
    #[inline]
    pub fn pop(&mut self) -> Value {
        match self.values.pop() {
            Some(value) => value,
            None => {
                log::trace!("stack underflow clamped to undefined");
                Value::Undefined
            }
        }
    }

    /// Reads the top value without removing it.
    pub fn peek(&self) -> Value {
        self.values.last().cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pops `count` values pushed in argument order, yielding them
    /// first-argument-first. Counts past the stack depth clamp to it.
    pub fn pop_args(&mut self, count: usize) -> Vec<Value> {
        let count = count.min(self.values.len());
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(self.pop());
        }
        args
    }
}

/// One entry of a frame's `with` stack: member lookups inside the scoped
/// region consult `object` before frame variables. `end` is the byte offset
/// at which the scope expires.
#[derive(Debug, Clone, Copy)]
pub struct WithScope {
    pub object: HeapId,
    pub end: usize,
}

/// Execution frame of one activation: operand stack, numbered registers,
/// named local variables, the bound `this`, and the active `with` scopes.
///
/// Register files are sized at activation time (four for legacy frames, the
/// declared count for register-based functions) and index out-of-range
/// accesses degrade to `undefined` rather than failing.
#[derive(Debug)]
pub struct Frame {
    pub stack: ValueStack,
    registers: Vec<Value>,
    pub locals: AHashMap<Rc<str>, Value>,
    pub this: Value,
    pub with_stack: Vec<WithScope>,
}

impl Frame {
    pub fn new(register_count: usize, this: Value) -> Self {
        Self {
            stack: ValueStack::new(),
            registers: vec![Value::Undefined; register_count],
            locals: AHashMap::new(),
            this,
            with_stack: Vec::new(),
        }
    }

    pub fn register(&self, index: u8) -> Value {
        match self.registers.get(index as usize) {
            Some(value) => value.clone(),
            None => {
                log::trace!("read of unallocated register {index} yields undefined");
                Value::Undefined
            }
        }
    }

    pub fn set_register(&mut self, index: u8, value: Value) {
        match self.registers.get_mut(index as usize) {
            Some(slot) => *slot = value,
            None => log::trace!("write to unallocated register {index} dropped"),
        }
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn set_local(&mut self, name: impl Into<Rc<str>>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Drops `with` scopes whose region has been left. Called before every
    /// instruction with the current byte offset.
    pub fn expire_with_scopes(&mut self, pc: usize) {
        while let Some(scope) = self.with_stack.last() {
            if pc >= scope.end {
                self.with_stack.pop();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_clamps_underflow_to_undefined() {
        let mut stack = ValueStack::new();
        stack.push(Value::Number(1.0));
        assert_eq!(stack.pop(), Value::Number(1.0));
        assert_eq!(stack.pop(), Value::Undefined);
        assert_eq!(stack.pop(), Value::Undefined);
    }

    #[test]
    fn pop_args_restores_argument_order() {
        let mut stack = ValueStack::new();
        // Callers push count last; arguments sit with the last one on top
        stack.push(Value::Number(2.0));
        stack.push(Value::Number(1.0));
        let args = stack.pop_args(2);
        assert_eq!(args, vec![Value::Number(1.0), Value::Number(2.0)]);
    }

    #[test]
    fn out_of_range_registers_degrade() {
        let mut frame = Frame::new(LEGACY_REGISTER_COUNT, Value::Undefined);
        frame.set_register(1, Value::Bool(true));
        assert_eq!(frame.register(1), Value::Bool(true));
        assert_eq!(frame.register(200), Value::Undefined);
        frame.set_register(200, Value::Bool(true));
        assert_eq!(frame.register(200), Value::Undefined);
    }

    #[test]
    fn with_scopes_expire_by_offset() {
        let mut frame = Frame::new(0, Value::Undefined);
        frame.with_stack.push(WithScope {
            object: HeapId::from_raw(0),
            end: 10,
        });
        frame.with_stack.push(WithScope {
            object: HeapId::from_raw(1),
            end: 6,
        });
        frame.expire_with_scopes(5);
        assert_eq!(frame.with_stack.len(), 2);
        frame.expire_with_scopes(6);
        assert_eq!(frame.with_stack.len(), 1);
        frame.expire_with_scopes(12);
        assert!(frame.with_stack.is_empty());
    }
}
