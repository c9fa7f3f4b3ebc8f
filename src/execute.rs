//! The execution pass: an exhaustive dispatch over prepared instructions.
//!
//! Every handler follows the soft-error policy: operations on missing
//! members or mismatched operand kinds degrade to `undefined` (or `false`,
//! or the empty string) instead of failing. The only loud failures are
//! host/VM contract violations, which assert.

use std::rc::Rc;

use crate::bytecode::{FunctionDecl, Image, Instr, PushItem};
use crate::context::Context;
use crate::frame::{Frame, WithScope, LEGACY_REGISTER_COUNT};
use crate::function::{CapturedEnv, DefinedFunction, Function, FunctionBody, FunctionFlags};
use crate::heap::{HeapData, HeapId, SuperObject};
use crate::object::{Object, CONSTRUCTOR_MEMBER, MAX_PROTO_DEPTH, PROTOTYPE_MEMBER};
use crate::value::{f64_to_int32, f64_to_uint32, Value};

/// Runs a prepared image as top-level code against a fresh legacy frame.
/// `this` binds to the host-bound object when one is installed.
pub(crate) fn run_top_level(ctx: &mut Context, image: &Rc<Image>) -> Value {
    let this = ctx.bound_value();
    let frame = Frame::new(LEGACY_REGISTER_COUNT, this);
    ExecutionState {
        ctx,
        image: Rc::clone(image),
        frame,
        depth: 0,
        in_function: false,
    }
    .run()
}

/// Invokes a callable value. Non-callables yield `undefined`; exceeding the
/// context's call-depth clamp abandons the call with `undefined`.
pub(crate) fn call_value(
    ctx: &mut Context,
    callee: &Value,
    this: Value,
    args: &[Value],
    depth: usize,
) -> Value {
    if depth >= ctx.max_call_depth() {
        log::warn!("call depth clamp ({}) reached, call abandoned", ctx.max_call_depth());
        return Value::Undefined;
    }
    let Some(id) = callee.object_id() else {
        return Value::Undefined;
    };
    let Some(function) = ctx.heap.function(id) else {
        return Value::Undefined;
    };
    match &function.body {
        FunctionBody::Native(native) => {
            let func = Rc::clone(&native.func);
            func(ctx, this, args)
        }
        FunctionBody::Defined(def) => {
            let def = def.clone();
            call_defined(ctx, &def, this, args, depth)
        }
    }
}

/// Runs a defined function body in a fresh frame per the call protocol:
/// captured variables merge in before parameter binding (parameters shadow
/// captures), excess declared parameters bind `undefined`, excess actual
/// arguments are discarded.
fn call_defined(
    ctx: &mut Context,
    def: &DefinedFunction,
    this: Value,
    args: &[Value],
    depth: usize,
) -> Value {
    let register_count = match &def.env {
        CapturedEnv::Registers { register_count, .. } => (*register_count).max(1) as usize,
        CapturedEnv::Variables(_) => LEGACY_REGISTER_COUNT,
    };
    let mut frame = Frame::new(register_count, this.clone());

    match &def.env {
        CapturedEnv::Variables(captured) => {
            for (name, value) in captured {
                frame.set_local(Rc::clone(name), value.clone());
            }
            frame.set_local("this", this.clone());
            let arguments = arguments_object(ctx, args);
            frame.set_local("arguments", arguments);
        }
        CapturedEnv::Registers { flags, .. } => {
            preload_frame(ctx, &mut frame, *flags, &this, args);
        }
    }

    for (index, param) in def.params.iter().enumerate() {
        let value = args.get(index).cloned().unwrap_or_default();
        if param.register != 0 {
            frame.set_register(param.register, value);
        } else {
            frame.set_local(Rc::clone(&param.name), value);
        }
    }

    ExecutionState {
        ctx,
        image: Rc::clone(&def.image),
        frame,
        depth: depth + 1,
        in_function: true,
    }
    .run()
}

/// Applies the register-based definition's preload/suppress flag word.
/// Preloads fill registers from r1 upward in fixed order: `this`,
/// `arguments`, `super`, `_root`, `_parent`, `_global`; each implicit that
/// is neither preloaded nor suppressed lands in the local-variable map.
fn preload_frame(ctx: &mut Context, frame: &mut Frame, flags: FunctionFlags, this: &Value, args: &[Value]) {
    let mut next_register: u8 = 1;
    let mut preload = |frame: &mut Frame, value: Value| {
        frame.set_register(next_register, value);
        next_register += 1;
    };

    if flags.contains(FunctionFlags::PRELOAD_THIS) {
        preload(frame, this.clone());
    } else if !flags.contains(FunctionFlags::SUPPRESS_THIS) {
        frame.set_local("this", this.clone());
    }

    if flags.contains(FunctionFlags::PRELOAD_ARGUMENTS) {
        let arguments = arguments_object(ctx, args);
        preload(frame, arguments);
    } else if !flags.contains(FunctionFlags::SUPPRESS_ARGUMENTS) {
        let arguments = arguments_object(ctx, args);
        frame.set_local("arguments", arguments);
    }

    if flags.contains(FunctionFlags::PRELOAD_SUPER) {
        let sup = super_value(ctx, this);
        preload(frame, sup);
    } else if !flags.contains(FunctionFlags::SUPPRESS_SUPER) {
        let sup = super_value(ctx, this);
        frame.set_local("super", sup);
    }

    if flags.contains(FunctionFlags::PRELOAD_ROOT) {
        preload(frame, ctx.bound_value());
    }
    if flags.contains(FunctionFlags::PRELOAD_PARENT) {
        preload(frame, ctx.bound_value());
    }
    if flags.contains(FunctionFlags::PRELOAD_GLOBAL) {
        preload(frame, Value::Object(ctx.globals()));
    }
}

/// Builds the `arguments` object: indexed members plus `length`.
fn arguments_object(ctx: &mut Context, args: &[Value]) -> Value {
    let mut obj = Object::new();
    for (index, value) in args.iter().enumerate() {
        obj.set_member(&index.to_string(), value.clone());
    }
    obj.set_member("length", Value::Number(args.len() as f64));
    Value::Object(ctx.heap.alloc_object(obj))
}

/// The `super` binding for a method invocation: a wrapper that dispatches
/// one prototype level above the instance. `undefined` when `this` has no
/// prototype to go above.
fn super_value(ctx: &mut Context, this: &Value) -> Value {
    let Some(id) = this.object_id() else {
        return Value::Undefined;
    };
    if ctx.heap.object(id).and_then(Object::proto).is_none() {
        return Value::Undefined;
    }
    Value::Object(ctx.heap.allocate(HeapData::Super(SuperObject { this: id, base: id })))
}

/// Transient cursor over one activation.
struct ExecutionState<'a> {
    ctx: &'a mut Context,
    image: Rc<Image>,
    frame: Frame,
    depth: usize,
    in_function: bool,
}

impl ExecutionState<'_> {
    /// Steps the byte program counter over the prepared region until a
    /// return instruction, the end action, or the region end.
    fn run(mut self) -> Value {
        let image = Rc::clone(&self.image);
        let range = image.range();
        let mut npc = range.start;

        while let Some(index) = image.index_at(npc) {
            self.frame.expire_with_scopes(npc);
            let end = image.end(index);
            npc = end;

            match image.instr(index) {
                Instr::End => break,
                Instr::Raw(tag) => log::trace!("no-op action {tag:#04x}"),
                Instr::ConstantPool => {}

                Instr::Push(items) => {
                    for item in items {
                        let value = match item {
                            PushItem::Const(id) => match image.dictionary().const_at(*id) {
                                Some(c) => c.to_value(),
                                None => {
                                    debug_assert!(false, "push references a missing constant");
                                    Value::Undefined
                                }
                            },
                            PushItem::Register(r) => self.frame.register(*r),
                        };
                        self.frame.stack.push(value);
                    }
                }
                Instr::Pop => {
                    self.frame.stack.pop();
                }
                Instr::PushDuplicate => {
                    let top = self.frame.stack.peek();
                    self.frame.stack.push(top);
                }
                Instr::StackSwap => {
                    let a = self.frame.stack.pop();
                    let b = self.frame.stack.pop();
                    self.frame.stack.push(a);
                    self.frame.stack.push(b);
                }
                Instr::StoreRegister(r) => {
                    let top = self.frame.stack.peek();
                    self.frame.set_register(*r, top);
                }

                Instr::Add => self.binary_number(|a, b| a + b),
                Instr::Subtract => self.binary_number(|a, b| a - b),
                Instr::Multiply => self.binary_number(|a, b| a * b),
                Instr::Divide => self.binary_number(|a, b| a / b),
                Instr::Modulo => {
                    let b = self.pop_number();
                    let a = self.pop_number();
                    if a.is_nan() || b.is_nan() {
                        self.frame.stack.push(Value::Undefined);
                    } else {
                        self.frame.stack.push(Value::Number(a % b));
                    }
                }
                Instr::Add2 => {
                    let b = self.frame.stack.pop();
                    let a = self.frame.stack.pop();
                    let a = self.to_primitive(&a);
                    let b = self.to_primitive(&b);
                    let result = if a.is_string() || b.is_string() {
                        let mut text = String::from(&*self.coerce_str(&a));
                        text.push_str(&self.coerce_str(&b));
                        Value::Str(Rc::from(text.as_str()))
                    } else {
                        Value::Number(a.to_number() + b.to_number())
                    };
                    self.frame.stack.push(result);
                }
                Instr::Increment => {
                    let n = self.pop_number();
                    self.frame.stack.push(Value::Number(n + 1.0));
                }
                Instr::Decrement => {
                    let n = self.pop_number();
                    self.frame.stack.push(Value::Number(n - 1.0));
                }

                Instr::Equals => {
                    let b = self.pop_number();
                    let a = self.pop_number();
                    self.frame.stack.push(Value::Bool(a == b));
                }
                Instr::Less => {
                    let b = self.pop_number();
                    let a = self.pop_number();
                    self.frame.stack.push(Value::Bool(a < b));
                }
                Instr::Equals2 => {
                    let b = self.frame.stack.pop();
                    let a = self.frame.stack.pop();
                    self.frame.stack.push(Value::Bool(a.abstract_equals(&b)));
                }
                Instr::Less2 => {
                    let b = self.frame.stack.pop();
                    let a = self.frame.stack.pop();
                    let (a, b) = (self.to_primitive(&a), self.to_primitive(&b));
                    self.frame.stack.push(a.compare_less(&b).into_value());
                }
                Instr::Greater => {
                    let b = self.frame.stack.pop();
                    let a = self.frame.stack.pop();
                    let (a, b) = (self.to_primitive(&a), self.to_primitive(&b));
                    self.frame.stack.push(b.compare_less(&a).into_value());
                }
                Instr::StrictEquals => {
                    let b = self.frame.stack.pop();
                    let a = self.frame.stack.pop();
                    self.frame.stack.push(Value::Bool(a.strict_equals(&b)));
                }

                Instr::And => {
                    let b = self.pop_number();
                    let a = self.pop_number();
                    self.frame.stack.push(Value::Bool(a != 0.0 && b != 0.0));
                }
                Instr::Or => {
                    let b = self.pop_number();
                    let a = self.pop_number();
                    self.frame.stack.push(Value::Bool(a != 0.0 || b != 0.0));
                }
                Instr::Not => {
                    let v = self.frame.stack.pop();
                    self.frame.stack.push(Value::Bool(!v.to_bool()));
                }
                Instr::BitAnd => self.binary_int(|a, b| a & b),
                Instr::BitOr => self.binary_int(|a, b| a | b),
                Instr::BitXor => self.binary_int(|a, b| a ^ b),
                Instr::BitLShift => {
                    let shift = self.pop_int() & 31;
                    let value = self.pop_int();
                    self.frame.stack.push(Value::Number((value << shift) as f64));
                }
                Instr::BitRShift => {
                    let shift = self.pop_int() & 31;
                    let value = self.pop_int();
                    self.frame.stack.push(Value::Number((value >> shift) as f64));
                }
                Instr::BitURShift => {
                    let shift = self.pop_int() & 31;
                    let value = f64_to_uint32(self.pop_number());
                    self.frame.stack.push(Value::Number((value >> shift) as f64));
                }

                Instr::StringAdd => {
                    let b = self.pop_string();
                    let a = self.pop_string();
                    let mut text = String::from(&*a);
                    text.push_str(&b);
                    self.frame.stack.push(Value::Str(Rc::from(text.as_str())));
                }
                Instr::StringEquals => {
                    let b = self.pop_string();
                    let a = self.pop_string();
                    self.frame.stack.push(Value::Bool(a == b));
                }
                Instr::StringLess => {
                    let b = self.pop_string();
                    let a = self.pop_string();
                    self.frame.stack.push(Value::Bool(a < b));
                }
                Instr::StringLength => {
                    let s = self.pop_string();
                    self.frame.stack.push(Value::Number(s.len() as f64));
                }
                Instr::MbStringLength => {
                    let s = self.pop_string();
                    self.frame.stack.push(Value::Number(s.chars().count() as f64));
                }

                Instr::ToNumber => {
                    let n = self.pop_number();
                    self.frame.stack.push(Value::Number(n));
                }
                Instr::ToString => {
                    let s = self.pop_string();
                    self.frame.stack.push(Value::Str(s));
                }
                Instr::ToInteger => {
                    let n = self.pop_number();
                    self.frame.stack.push(Value::Number(f64_to_int32(n) as f64));
                }
                Instr::TypeOf => {
                    let v = self.frame.stack.pop();
                    let name = v.type_name(&self.ctx.heap).to_string();
                    self.frame.stack.push(Value::Str(Rc::from(name.as_str())));
                }
                Instr::CharToAscii => {
                    let s = self.pop_string();
                    let code = s.chars().next().map_or(0.0, |c| c as u32 as f64);
                    self.frame.stack.push(Value::Number(code));
                }
                Instr::AsciiToChar => {
                    let n = self.pop_number();
                    let text = char::from_u32(f64_to_uint32(n))
                        .map(String::from)
                        .unwrap_or_default();
                    self.frame.stack.push(Value::Str(Rc::from(text.as_str())));
                }

                Instr::GetVariable => {
                    let name = self.pop_string();
                    let value = self.get_variable(&name);
                    self.frame.stack.push(value);
                }
                Instr::SetVariable => {
                    let value = self.frame.stack.pop();
                    let name = self.pop_string();
                    self.set_variable(&name, value);
                }
                Instr::DefineLocal => {
                    let value = self.frame.stack.pop();
                    let name = self.pop_string();
                    self.define_local(&name, value);
                }
                Instr::DefineLocal2 => {
                    let name = self.pop_string();
                    if self.in_function {
                        if !self.frame.has_local(&name) {
                            self.frame.set_local(&*name, Value::Undefined);
                        }
                    } else if self.get_variable(&name) == Value::Undefined {
                        self.define_local(&name, Value::Undefined);
                    }
                }
                Instr::Delete => {
                    let name = self.pop_string();
                    let target = self.frame.stack.pop();
                    let removed = target
                        .object_id()
                        .and_then(|id| self.ctx.heap.object_mut(id))
                        .is_some_and(|obj| obj.delete_member(&name));
                    self.frame.stack.push(Value::Bool(removed));
                }
                Instr::Delete2 => {
                    let name = self.pop_string();
                    let removed = if self.frame.has_local(&name) {
                        self.frame.locals.remove(&*name).is_some()
                    } else {
                        let target = self.ctx.bound().unwrap_or_else(|| self.ctx.globals());
                        self.ctx
                            .heap
                            .object_mut(target)
                            .is_some_and(|obj| obj.delete_member(&name))
                    };
                    self.frame.stack.push(Value::Bool(removed));
                }
                Instr::With { end } => {
                    let target = self.frame.stack.pop();
                    match target.object_id() {
                        Some(object) => self.frame.with_stack.push(WithScope { object, end: *end }),
                        // A non-object target skips the scoped block
                        None => npc = *end,
                    }
                }

                Instr::GetMember => {
                    let name = self.pop_string();
                    let receiver = self.frame.stack.pop();
                    let value = self.get_member_of(&receiver, &name);
                    self.frame.stack.push(value);
                }
                Instr::SetMember => {
                    let value = self.frame.stack.pop();
                    let name = self.pop_string();
                    let receiver = self.frame.stack.pop();
                    self.set_member_of(&receiver, &name, value);
                }
                Instr::InitObject => {
                    let count = self.pop_count();
                    let mut obj = Object::new();
                    for _ in 0..count {
                        let value = self.frame.stack.pop();
                        let name = self.pop_string();
                        obj.set_member(&name, value);
                    }
                    let id = self.ctx.heap.alloc_object(obj);
                    self.frame.stack.push(Value::Object(id));
                }
                Instr::InitArray => {
                    let count = self.pop_count();
                    let mut obj = Object::new();
                    for index in 0..count {
                        let value = self.frame.stack.pop();
                        obj.set_member(&index.to_string(), value);
                    }
                    obj.set_member("length", Value::Number(count as f64));
                    let id = self.ctx.heap.alloc_object(obj);
                    self.frame.stack.push(Value::Object(id));
                }
                Instr::NewObject => {
                    let name = self.pop_string();
                    let count = self.pop_count();
                    let args = self.frame.stack.pop_args(count);
                    let ctor = self.get_variable(&name);
                    let result = self.construct(&ctor, &args);
                    self.frame.stack.push(result);
                }
                Instr::NewMethod => {
                    let name = self.pop_string();
                    let receiver = self.frame.stack.pop();
                    let count = self.pop_count();
                    let args = self.frame.stack.pop_args(count);
                    let ctor = if name.is_empty() {
                        receiver
                    } else {
                        self.get_member_of(&receiver, &name)
                    };
                    let result = self.construct(&ctor, &args);
                    self.frame.stack.push(result);
                }
                Instr::CallMethod => {
                    let name = self.frame.stack.pop();
                    let receiver = self.frame.stack.pop();
                    let count = self.pop_count();
                    let args = self.frame.stack.pop_args(count);
                    let name = self.coerce_str(&name);
                    let method = if name.is_empty() {
                        receiver.clone()
                    } else {
                        self.get_member_of(&receiver, &name)
                    };
                    let this = self.this_of(&receiver);
                    let result = call_value(self.ctx, &method, this, &args, self.depth + 1);
                    self.frame.stack.push(result);
                }
                Instr::CallFunction => {
                    let name = self.pop_string();
                    let count = self.pop_count();
                    let args = self.frame.stack.pop_args(count);
                    let callee = self.get_variable(&name);
                    let this = self.frame.this.clone();
                    let result = call_value(self.ctx, &callee, this, &args, self.depth + 1);
                    self.frame.stack.push(result);
                }
                Instr::Return => return self.frame.stack.pop(),
                Instr::Enumerate2 => {
                    let value = self.frame.stack.pop();
                    self.frame.stack.push(Value::Null);
                    let names: Vec<Rc<str>> = value
                        .object_id()
                        .and_then(|id| self.ctx.heap.object(id))
                        .map(|obj| obj.member_names().cloned().collect())
                        .unwrap_or_default();
                    for name in names {
                        self.frame.stack.push(Value::Str(name));
                    }
                }
                Instr::InstanceOf => {
                    let ctor = self.frame.stack.pop();
                    let target = self.frame.stack.pop();
                    let result = self.instance_of(&target, &ctor);
                    self.frame.stack.push(Value::Bool(result));
                }
                Instr::Extends => {
                    let superclass = self.frame.stack.pop();
                    let subclass = self.frame.stack.pop();
                    self.extend(&subclass, &superclass);
                }
                Instr::ImplementsOp => {
                    let ctor = self.frame.stack.pop();
                    let count = self.pop_count();
                    let interfaces = self.frame.stack.pop_args(count);
                    self.implement(&ctor, &interfaces);
                }
                Instr::CastOp => {
                    let target = self.frame.stack.pop();
                    let ctor = self.frame.stack.pop();
                    let result = if self.instance_of(&target, &ctor) {
                        target
                    } else {
                        Value::Null
                    };
                    self.frame.stack.push(result);
                }

                Instr::Jump { offset } => match branch_target(end, *offset) {
                    Some(target) => npc = target,
                    None => break,
                },
                Instr::If { offset } => {
                    let condition = self.frame.stack.pop();
                    if condition.to_bool() {
                        match branch_target(end, *offset) {
                            Some(target) => npc = target,
                            None => break,
                        }
                    }
                }

                Instr::DefineFunction(decl) => {
                    npc = decl.body.end;
                    let function = self.define_function(decl, false);
                    self.bind_definition(decl, function);
                }
                Instr::DefineFunction2(decl) => {
                    npc = decl.body.end;
                    let function = self.define_function(decl, true);
                    self.bind_definition(decl, function);
                }

                Instr::Trace => {
                    let value = self.frame.stack.pop();
                    let text = self.coerce_str(&value);
                    self.ctx.trace_line(&text);
                }
                Instr::GetTime => {
                    let millis = self.ctx.elapsed_millis() as f64;
                    self.frame.stack.push(Value::Number(millis));
                }
                Instr::RandomNumber => {
                    let max = self.pop_int();
                    let n = if max > 0 { self.ctx.random_below(max as u32) as f64 } else { 0.0 };
                    self.frame.stack.push(Value::Number(n));
                }
            }
        }
        Value::Undefined
    }

    fn pop_number(&mut self) -> f64 {
        let v = self.frame.stack.pop();
        self.coerce_number(&v)
    }

    fn pop_string(&mut self) -> Rc<str> {
        let v = self.frame.stack.pop();
        self.coerce_str(&v)
    }

    fn pop_int(&mut self) -> i32 {
        f64_to_int32(self.pop_number())
    }

    /// Argument/member counts truncate toward zero; negatives clamp to 0 and
    /// counts larger than the stack clamp to its depth, since every operand
    /// past the stack would be `undefined` anyway. The count operand is
    /// script-controlled and must never size an allocation on its own.
    fn pop_count(&mut self) -> usize {
        let count = self.pop_int().max(0) as usize;
        count.min(self.frame.stack.len())
    }

    fn binary_number(&mut self, op: impl Fn(f64, f64) -> f64) {
        let b = self.pop_number();
        let a = self.pop_number();
        self.frame.stack.push(Value::Number(op(a, b)));
    }

    fn binary_int(&mut self, op: impl Fn(i32, i32) -> i32) {
        let b = self.pop_int();
        let a = self.pop_int();
        self.frame.stack.push(Value::Number(op(a, b) as f64));
    }

    /// Replaces an object by its `valueOf` result when that yields a
    /// primitive. Non-objects pass through.
    fn to_primitive(&mut self, value: &Value) -> Value {
        if let Some(id) = value.object_id() {
            if let Some(value_of) = self.ctx.heap.resolve_member(id, "valueOf") {
                let result = call_value(self.ctx, &value_of, value.clone(), &[], self.depth + 1);
                if !result.is_object() {
                    return result;
                }
            }
        }
        value.clone()
    }

    fn coerce_number(&mut self, value: &Value) -> f64 {
        self.to_primitive(value).to_number()
    }

    /// String coercion honoring a `toString` override on objects.
    fn coerce_str(&mut self, value: &Value) -> Rc<str> {
        if let Some(id) = value.object_id() {
            if let Some(to_string) = self.ctx.heap.resolve_member(id, "toString") {
                let result = call_value(self.ctx, &to_string, value.clone(), &[], self.depth + 1);
                if let Value::Str(s) = result {
                    return s;
                }
            }
        }
        value.to_str()
    }

    /// `this` binding for a method call on `receiver`: calls made through a
    /// `super` wrapper bind the original instance.
    fn this_of(&self, receiver: &Value) -> Value {
        match receiver.object_id().map(|id| self.ctx.heap.get(id)) {
            Some(HeapData::Super(s)) => Value::Object(s.this),
            _ => receiver.clone(),
        }
    }

    /// Member read honoring property getters along the prototype chain.
    /// Lookups through a `super` wrapper start one level above the instance
    /// and bind getters to the instance itself.
    fn get_member_of(&mut self, receiver: &Value, name: &str) -> Value {
        let Some(id) = receiver.object_id() else {
            return Value::Undefined;
        };
        let this = self.this_of(receiver);
        let mut current = self.ctx.heap.lookup_start(id);
        for _ in 0..MAX_PROTO_DEPTH {
            let Some(cur) = current else { break };
            enum Hit {
                Getter(Option<HeapId>),
                Member(Value),
                Proto(Option<HeapId>),
            }
            let hit = {
                let Some(obj) = self.ctx.heap.object(cur) else { break };
                if let Some(prop) = obj.property(name) {
                    Hit::Getter(prop.getter)
                } else if let Some(value) = obj.get_member(name) {
                    Hit::Member(value)
                } else {
                    Hit::Proto(obj.proto())
                }
            };
            match hit {
                Hit::Getter(Some(getter)) => {
                    return call_value(self.ctx, &Value::Object(getter), this, &[], self.depth + 1);
                }
                // Write-only property
                Hit::Getter(None) => return Value::Undefined,
                Hit::Member(value) => return value,
                Hit::Proto(next) => current = next,
            }
        }
        Value::Undefined
    }

    /// Member write honoring property setters along the prototype chain.
    /// Without a setter the write lands as a local member on the receiver
    /// (silently rejected when it is read-only).
    fn set_member_of(&mut self, receiver: &Value, name: &str, value: Value) {
        let Some(id) = receiver.object_id() else { return };
        let target = match self.ctx.heap.get(id) {
            HeapData::Super(s) => s.this,
            _ => id,
        };

        let mut current = Some(target);
        for _ in 0..MAX_PROTO_DEPTH {
            let Some(cur) = current else { break };
            let Some(obj) = self.ctx.heap.object(cur) else { break };
            if let Some(prop) = obj.property(name) {
                if let Some(setter) = prop.setter {
                    call_value(
                        self.ctx,
                        &Value::Object(setter),
                        Value::Object(target),
                        &[value],
                        self.depth + 1,
                    );
                }
                // A property with no setter swallows the write
                return;
            }
            current = obj.proto();
        }

        if let Some(obj) = self.ctx.heap.object_mut(target) {
            obj.set_member(name, value);
        }
    }

    /// Bare-name read through the scope chain: active `with` objects, then
    /// frame locals, then the bound `this`, then the host-bound object, and
    /// finally a dotted-path walk from the global object (local members
    /// only, no prototype traversal).
    fn get_variable(&mut self, name: &str) -> Value {
        // Frames without a "this" local (top-level code) still resolve it
        if name == "this" && !self.frame.has_local("this") {
            return self.frame.this.clone();
        }
        let scopes: Vec<WithScope> = self.frame.with_stack.iter().rev().copied().collect();
        for scope in scopes {
            if self.ctx.heap.chain_has_member(scope.object, name) {
                return self.get_member_of(&Value::Object(scope.object), name);
            }
        }

        if let Some(value) = self.frame.local(name) {
            return value;
        }

        let this = self.frame.this.clone();
        if let Some(id) = this.object_id() {
            if self.ctx.heap.chain_has_member(id, name) {
                return self.get_member_of(&this, name);
            }
        }

        if let Some(bound) = self.ctx.bound() {
            if Some(bound) != this.object_id() && self.ctx.heap.chain_has_member(bound, name) {
                return self.get_member_of(&Value::Object(bound), name);
            }
        }

        self.get_path(name)
    }

    /// Dotted-path resolution from the global object. Each segment is a
    /// plain local-member read; the walk stops at the first miss.
    fn get_path(&mut self, path: &str) -> Value {
        let mut current = Value::Object(self.ctx.globals());
        for segment in path.split('.') {
            let Some(id) = current.object_id() else {
                return Value::Undefined;
            };
            let Some(obj) = self.ctx.heap.object(id) else {
                return Value::Undefined;
            };
            match obj.get_member(segment) {
                Some(value) => current = value,
                None => return Value::Undefined,
            }
        }
        current
    }

    /// Bare-name write: an active `with` object that already knows the name
    /// receives it; otherwise the first writable location does (frame
    /// variable inside a function, else the host-bound/global object).
    fn set_variable(&mut self, name: &str, value: Value) {
        let scopes: Vec<WithScope> = self.frame.with_stack.iter().rev().copied().collect();
        for scope in scopes {
            if self.ctx.heap.chain_has_member(scope.object, name) {
                self.set_member_of(&Value::Object(scope.object), name, value);
                return;
            }
        }

        if self.in_function {
            self.frame.set_local(name, value);
            return;
        }
        self.define_local(name, value);
    }

    /// Writes a variable into the top-level target: the host-bound object
    /// when one is installed, else the global object.
    fn define_local(&mut self, name: &str, value: Value) {
        if self.in_function {
            self.frame.set_local(name, value);
            return;
        }
        let target = self.ctx.bound().unwrap_or_else(|| self.ctx.globals());
        self.set_member_of(&Value::Object(target), name, value);
    }

    /// `instanceof` semantics: true when the constructor's `prototype`
    /// appears on the target's prototype chain, or when any level of that
    /// chain lists the constructor as an implemented interface.
    fn instance_of(&mut self, target: &Value, ctor: &Value) -> bool {
        let (Some(target_id), Some(ctor_id)) = (target.object_id(), ctor.object_id()) else {
            return false;
        };
        let prototype = self
            .ctx
            .heap
            .object(ctor_id)
            .and_then(|obj| obj.get_member(PROTOTYPE_MEMBER))
            .and_then(|v| v.object_id());

        let chain = self.ctx.heap.proto_chain(target_id);
        if let Some(prototype) = prototype {
            if chain.contains(&prototype) {
                return true;
            }
        }
        std::iter::once(target_id)
            .chain(chain)
            .any(|level| {
                self.ctx
                    .heap
                    .object(level)
                    .is_some_and(|obj| obj.interfaces().contains(&ctor_id))
            })
    }

    /// `new`-construction: a fresh object whose `__proto__` is the
    /// constructor's `prototype`, with a `__constructor__` back-reference,
    /// yielded regardless of the constructor's own return value.
    fn construct(&mut self, ctor: &Value, args: &[Value]) -> Value {
        let Some(ctor_id) = ctor.object_id() else {
            return Value::Undefined;
        };
        if self.ctx.heap.function(ctor_id).is_none() {
            return Value::Undefined;
        }
        let prototype = self
            .ctx
            .heap
            .object(ctor_id)
            .and_then(|obj| obj.get_member(PROTOTYPE_MEMBER))
            .and_then(|v| v.object_id());

        let mut object = match prototype {
            Some(p) => Object::with_proto(p),
            None => Object::new(),
        };
        object.set_member(CONSTRUCTOR_MEMBER, ctor.clone());
        let new_id = self.ctx.heap.alloc_object(object);

        call_value(self.ctx, ctor, Value::Object(new_id), args, self.depth + 1);
        Value::Object(new_id)
    }

    /// Wires `subclass.prototype` to a fresh object inheriting from
    /// `superclass.prototype`, with the superclass as its constructor.
    fn extend(&mut self, subclass: &Value, superclass: &Value) {
        let (Some(sub_id), Some(super_id)) = (subclass.object_id(), superclass.object_id()) else {
            return;
        };
        let super_proto = self
            .ctx
            .heap
            .object(super_id)
            .and_then(|obj| obj.get_member(PROTOTYPE_MEMBER))
            .and_then(|v| v.object_id());

        let mut proto = match super_proto {
            Some(p) => Object::with_proto(p),
            None => Object::new(),
        };
        proto.set_member(CONSTRUCTOR_MEMBER, superclass.clone());
        let proto_id = self.ctx.heap.alloc_object(proto);
        if let Some(sub) = self.ctx.heap.object_mut(sub_id) {
            sub.set_member(PROTOTYPE_MEMBER, Value::Object(proto_id));
        }
    }

    /// Records implemented interfaces on the constructor's prototype.
    fn implement(&mut self, ctor: &Value, interfaces: &[Value]) {
        let Some(prototype) = ctor
            .object_id()
            .and_then(|id| self.ctx.heap.object(id))
            .and_then(|obj| obj.get_member(PROTOTYPE_MEMBER))
            .and_then(|v| v.object_id())
        else {
            return;
        };
        for interface in interfaces {
            if let Some(interface_id) = interface.object_id() {
                if let Some(obj) = self.ctx.heap.object_mut(prototype) {
                    obj.add_interface(interface_id);
                }
            }
        }
    }

    /// Builds a function object from a definition instruction, preparing
    /// its nested body against the defining image's dictionary. Legacy
    /// definitions snapshot the enclosing frame's variables.
    fn define_function(&mut self, decl: &FunctionDecl, register_based: bool) -> Value {
        let image = match self.image.prepare_nested(decl.body) {
            Ok(image) => Rc::new(image),
            Err(err) => {
                log::warn!("function body failed to prepare: {err}");
                return Value::Undefined;
            }
        };
        let env = if register_based {
            CapturedEnv::Registers {
                register_count: decl.register_count.unwrap_or(0),
                flags: decl.flags,
            }
        } else {
            CapturedEnv::Variables(
                self.frame
                    .locals
                    .iter()
                    .map(|(name, value)| (Rc::clone(name), value.clone()))
                    .collect(),
            )
        };
        let id = self.ctx.alloc_function(Function::defined(DefinedFunction {
            name: Rc::clone(&decl.name),
            image,
            body: decl.body,
            params: decl.params.clone(),
            env,
        }));
        Value::Object(id)
    }

    /// Named definitions bind as a variable; anonymous ones push the
    /// function value.
    fn bind_definition(&mut self, decl: &FunctionDecl, function: Value) {
        if decl.name.is_empty() {
            self.frame.stack.push(function);
        } else {
            let name = Rc::clone(&decl.name);
            self.set_variable(&name, function);
        }
    }
}

/// Branch arithmetic: signed byte delta relative to the end of the current
/// instruction's operand bytes. A target outside addressable range ends the
/// run.
fn branch_target(end: usize, offset: i16) -> Option<usize> {
    let target = end as i64 + i64::from(offset);
    if target < 0 {
        log::trace!("branch target {target} is before the buffer, run ends");
        return None;
    }
    Some(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_arithmetic_is_relative_to_operand_end() {
        // instruction at 100 whose body ends at 103, offset -5
        assert_eq!(branch_target(103, -5), Some(98));
        assert_eq!(branch_target(103, 4), Some(107));
        assert_eq!(branch_target(1, -5), None);
    }
}
