use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bytecode::{CodeRange, Image};
use crate::context::Context;
use crate::object::Object;
use crate::value::Value;

/// Signature of a host-native function. Installed natives are ordinary
/// function objects, indistinguishable from script-defined ones to the
/// dispatcher.
pub type NativeFn = Rc<dyn Fn(&mut Context, Value, &[Value]) -> Value>;

/// Flag word of the register-based function definition opcode, controlling
/// which implicit values are preloaded into registers (or suppressed from
/// the local-variable map) when the function is called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFlags(u16);

impl FunctionFlags {
    pub const PRELOAD_THIS: u16 = 0x0001;
    pub const SUPPRESS_THIS: u16 = 0x0002;
    pub const PRELOAD_ARGUMENTS: u16 = 0x0004;
    pub const SUPPRESS_ARGUMENTS: u16 = 0x0008;
    pub const PRELOAD_SUPER: u16 = 0x0010;
    pub const SUPPRESS_SUPER: u16 = 0x0020;
    pub const PRELOAD_ROOT: u16 = 0x0040;
    pub const PRELOAD_PARENT: u16 = 0x0080;
    pub const PRELOAD_GLOBAL: u16 = 0x0100;

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

/// One declared parameter of a defined function.
///
/// `register` 0 means the argument is bound into a named frame variable;
/// any other value binds it into that numbered register. The legacy
/// function-definition opcode always produces register 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub register: u8,
    pub name: Rc<str>,
}

impl Param {
    pub fn named(name: impl Into<Rc<str>>) -> Self {
        Self {
            register: 0,
            name: name.into(),
        }
    }
}

/// Captured environment of a defined function.
#[derive(Debug, Clone)]
pub enum CapturedEnv {
    /// Legacy closures snapshot the enclosing frame's variables at
    /// definition time. The pairs are merged into the callee frame before
    /// parameter binding, so parameters shadow captures.
    Variables(Vec<(Rc<str>, Value)>),
    /// Register-based closures carry a register count and preload flags
    /// instead of a snapshot.
    Registers { register_count: u8, flags: FunctionFlags },
}

/// Body of a script-defined function: a region of a prepared image plus the
/// dictionary that was active when the function was defined (the image owns
/// that dictionary).
#[derive(Debug, Clone)]
pub struct DefinedFunction {
    pub name: Rc<str>,
    pub image: Rc<Image>,
    pub body: CodeRange,
    pub params: Vec<Param>,
    pub env: CapturedEnv,
}

/// A host-native function body.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Defined(DefinedFunction),
    Native(NativeFunction),
}

/// A callable entity: a specialization of [`Object`].
///
/// Every function carries the full object surface (members, properties,
/// prototype link) plus a body. The `prototype` member, used to construct
/// new instances, is installed by the allocation helpers in [`Context`] and
/// the dispatch core; it always exists on functions those produce.
#[derive(Debug)]
pub struct Function {
    pub base: Object,
    pub body: FunctionBody,
}

impl Function {
    pub fn defined(def: DefinedFunction) -> Self {
        Self {
            base: Object::new(),
            body: FunctionBody::Defined(def),
        }
    }

    pub fn native(name: impl Into<Rc<str>>, func: NativeFn) -> Self {
        Self {
            base: Object::new(),
            body: FunctionBody::Native(NativeFunction {
                name: name.into(),
                func,
            }),
        }
    }

    pub fn name(&self) -> &Rc<str> {
        match &self.body {
            FunctionBody::Defined(d) => &d.name,
            FunctionBody::Native(n) => &n.name,
        }
    }

    /// Declared register-file size for the callee frame: register-based
    /// functions declare their own count, legacy ones get the four
    /// general-purpose registers every frame carries.
    pub fn register_count(&self) -> usize {
        match &self.body {
            FunctionBody::Defined(d) => match &d.env {
                CapturedEnv::Registers { register_count, .. } => (*register_count).max(1) as usize,
                CapturedEnv::Variables(_) => crate::frame::LEGACY_REGISTER_COUNT,
            },
            FunctionBody::Native(_) => 0,
        }
    }

    /// Arena ids held by the function object itself (its object surface).
    /// Captured values are traced separately by the heap.
    pub(crate) fn trace(&self, out: &mut Vec<crate::heap::HeapId>) {
        self.base.trace(out);
        if let FunctionBody::Defined(d) = &self.body {
            if let CapturedEnv::Variables(captured) = &d.env {
                for (_, value) in captured {
                    if let Value::Object(id) = value {
                        out.push(*id);
                    }
                }
            }
        }
    }
}
