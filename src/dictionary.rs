use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Index into the preconverted constant area of a [`Dictionary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstId(u32);

impl ConstId {
    pub(crate) fn new(index: usize) -> Self {
        ConstId(index.try_into().expect("constant area overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A literal preconverted by the preparation pass.
///
/// Push operands in raw bytecode encode literals in several wire formats
/// (NUL-terminated strings, 32-bit floats, word-swapped doubles, pool
/// indices). Preparation decodes each of them once into a `Const` so the
/// execution pass never re-parses raw encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
}

impl Const {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Undefined => Value::Undefined,
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(*n),
            Self::Str(s) => Value::Str(Rc::clone(s)),
        }
    }
}

/// Per-code-unit pool of string constants plus the preconverted literal area.
///
/// The string table is built by the `constant-pool` action during
/// preparation and is referenced by 8/16-bit indices embedded in push
/// operands. The constant area is appended by preparation as it interns
/// literal operands; both are immutable once the image is prepared.
///
/// Dictionaries are shared (`Rc`) by every frame and function created while
/// they are active and are never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dictionary {
    strings: Vec<Rc<str>>,
    consts: Vec<Const>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the string table. Called once per `constant-pool` record
    /// during preparation; a later pool in the same unit replaces the table
    /// for the records that follow it.
    pub(crate) fn set_strings(&mut self, strings: Vec<Rc<str>>) {
        self.strings = strings;
    }

    pub fn string(&self, index: usize) -> Option<&Rc<str>> {
        self.strings.get(index)
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Appends a preconverted constant, returning its index.
    pub(crate) fn add_const(&mut self, c: Const) -> ConstId {
        let id = ConstId::new(self.consts.len());
        self.consts.push(c);
        id
    }

    pub fn const_at(&self, id: ConstId) -> Option<&Const> {
        self.consts.get(id.index())
    }

    pub fn const_count(&self) -> usize {
        self.consts.len()
    }
}
