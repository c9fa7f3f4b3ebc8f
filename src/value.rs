use std::rc::Rc;

use strum::Display;

use crate::heap::{Heap, HeapData, HeapId};

/// Primary value type representing ActionScript values at runtime.
///
/// Exactly one variant is active at any time. Small values (booleans, numbers)
/// are stored inline; strings are immutable shared buffers; objects and
/// functions live in the arena and are referenced via `Object(HeapId)`.
///
/// Copying a value duplicates the tag and payload: an `Object` copy is a new
/// reference to the same arena slot, never a deep copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// An immutable shared string. Strings cannot hold references, so they
    /// live outside the garbage-collected arena.
    Str(Rc<str>),
    /// Reference to an object, function, or `super` wrapper in the arena.
    Object(HeapId),
}

/// Runtime type names as reported by the `typeof` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TypeName {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Function,
}

/// Result of an ECMAScript-3 style relational comparison.
///
/// Relationals involving NaN are indeterminate: the interpreter pushes the
/// `undefined` value, distinguishable from both `true` and `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpResult {
    True,
    False,
    Undefined,
}

impl CmpResult {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::True => Value::Bool(true),
            Self::False => Value::Bool(false),
            Self::Undefined => Value::Undefined,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl Value {
    /// Numeric coercion. Total: never fails for any variant.
    ///
    /// Strings parse as numeric literals, falling back to NaN when the text
    /// is not a number. Objects, null, and undefined coerce to 0 unless the
    /// interpreter has already replaced them via a `valueOf` override (that
    /// replacement happens at the coercion call sites in the dispatch core,
    /// not here).
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Null | Self::Object(_) => 0.0,
            Self::Bool(b) => f64::from(*b),
            Self::Number(n) => *n,
            Self::Str(s) => string_to_number(s),
        }
    }

    /// String coercion. Total: never fails for any variant.
    pub fn to_str(&self) -> Rc<str> {
        match self {
            Self::Undefined | Self::Null | Self::Object(_) => Rc::from(""),
            Self::Bool(true) => Rc::from("true"),
            Self::Bool(false) => Rc::from("false"),
            Self::Number(n) => Rc::from(number_to_string(*n).as_str()),
            Self::Str(s) => Rc::clone(s),
        }
    }

    /// Boolean coercion. Total: never fails for any variant.
    ///
    /// Numbers are true when non-zero (NaN is false); strings are true when
    /// non-empty. Objects, null, and undefined coerce to false.
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Undefined | Self::Null | Self::Object(_) => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// Integer coercion used by opcodes that derive indices from float
    /// operands: truncation toward zero, NaN and infinities map to 0.
    pub fn to_int(&self) -> i32 {
        f64_to_int32(self.to_number())
    }

    /// Strict equality: equal runtime tag, then payload compared by kind
    /// (booleans/numbers/strings by value, objects by reference identity).
    pub fn strict_equals(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other) && self == other
    }

    /// Abstract equality as used by the overloaded-equals opcode: reference
    /// identity for objects, value identity otherwise. No type coercion is
    /// performed at this level; coercion happens through explicit conversion
    /// opcodes earlier in the stream.
    pub fn abstract_equals(&self, other: &Self) -> bool {
        self == other
    }

    /// Relational comparison with the string/number dispatch rule: if either
    /// side is already a string, compare as strings, otherwise numerically.
    /// NaN on either side of a numeric comparison yields `Undefined`.
    pub fn compare_less(&self, other: &Self) -> CmpResult {
        if let (Self::Str(a), Self::Str(b)) = (self, other) {
            return CmpResult::from_bool(a < b);
        }
        let (a, b) = (self.to_number(), other.to_number());
        if a.is_nan() || b.is_nan() {
            CmpResult::Undefined
        } else {
            CmpResult::from_bool(a < b)
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Str(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Returns the arena id when this value references the arena.
    pub fn object_id(&self) -> Option<HeapId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Runtime type name, distinguishing functions from plain objects by
    /// inspecting the arena slot.
    pub fn type_name(&self, heap: &Heap) -> TypeName {
        match self {
            Self::Undefined => TypeName::Undefined,
            Self::Null => TypeName::Null,
            Self::Bool(_) => TypeName::Boolean,
            Self::Number(_) => TypeName::Number,
            Self::Str(_) => TypeName::String,
            Self::Object(id) => match heap.get(*id) {
                HeapData::Function(_) => TypeName::Function,
                HeapData::Object(_) | HeapData::Super(_) => TypeName::Object,
            },
        }
    }
}

/// Formats a number the way scripts observe it: integral values print
/// without a decimal point, NaN and infinities by name.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() }
    } else if n == n.trunc() && n.abs() < 1e15 {
        // Covers -0.0 as well: prints "0"
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Parses a string as a numeric literal, yielding NaN when it is not one.
///
/// Surrounding ASCII whitespace is ignored; anything else that `f64` cannot
/// parse (including the empty string) is NaN.
pub fn string_to_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// ECMAScript ToInt32: truncate toward zero, wrap modulo 2^32.
pub fn f64_to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let t = n.trunc();
    let wrapped = t.rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

/// ECMAScript ToUint32 used by the unsigned right shift.
pub fn f64_to_uint32(n: f64) -> u32 {
    f64_to_int32(n) as u32
}
