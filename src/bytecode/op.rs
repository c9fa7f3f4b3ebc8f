use std::rc::Rc;

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

use crate::dictionary::ConstId;
use crate::function::{FunctionFlags, Param};

use super::image::CodeRange;

/// Action tags as they appear on the wire. Tags at `0x80` and above carry a
/// 16-bit little-endian operand length; tags below do not.
///
/// The table is the AVM1 core set. Wire bytes with no entry here decode to
/// [`Instr::Raw`] and execute as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    End = 0x00,
    Add = 0x0A,
    Subtract = 0x0B,
    Multiply = 0x0C,
    Divide = 0x0D,
    Equals = 0x0E,
    Less = 0x0F,
    And = 0x10,
    Or = 0x11,
    Not = 0x12,
    StringEquals = 0x13,
    StringLength = 0x14,
    Pop = 0x17,
    ToInteger = 0x18,
    GetVariable = 0x1C,
    SetVariable = 0x1D,
    StringAdd = 0x21,
    Trace = 0x26,
    StringLess = 0x29,
    CastOp = 0x2B,
    ImplementsOp = 0x2C,
    RandomNumber = 0x30,
    MbStringLength = 0x31,
    CharToAscii = 0x32,
    AsciiToChar = 0x33,
    GetTime = 0x34,
    Delete = 0x3A,
    Delete2 = 0x3B,
    DefineLocal = 0x3C,
    CallFunction = 0x3D,
    Return = 0x3E,
    Modulo = 0x3F,
    NewObject = 0x40,
    DefineLocal2 = 0x41,
    InitArray = 0x42,
    InitObject = 0x43,
    TypeOf = 0x44,
    Add2 = 0x47,
    Less2 = 0x48,
    Equals2 = 0x49,
    ToNumber = 0x4A,
    ToString = 0x4B,
    PushDuplicate = 0x4C,
    StackSwap = 0x4D,
    GetMember = 0x4E,
    SetMember = 0x4F,
    Increment = 0x50,
    Decrement = 0x51,
    CallMethod = 0x52,
    NewMethod = 0x53,
    InstanceOf = 0x54,
    Enumerate2 = 0x55,
    BitAnd = 0x60,
    BitOr = 0x61,
    BitXor = 0x62,
    BitLShift = 0x63,
    BitRShift = 0x64,
    BitURShift = 0x65,
    StrictEquals = 0x66,
    Greater = 0x67,
    Extends = 0x69,
    StoreRegister = 0x87,
    ConstantPool = 0x88,
    DefineFunction2 = 0x8E,
    With = 0x94,
    Push = 0x96,
    Jump = 0x99,
    DefineFunction = 0x9B,
    If = 0x9D,
}

impl Opcode {
    /// Whether a tag value carries a 16-bit operand length on the wire.
    #[inline]
    pub fn has_length(tag: u8) -> bool {
        tag >= 0x80
    }
}

/// One entry of a push instruction's operand list, post-preparation.
///
/// Literal records (strings, floats, doubles, integers, pool indices) are
/// preconverted into the dictionary's constant area; only register reads
/// stay symbolic because their value is per-frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushItem {
    Const(ConstId),
    Register(u8),
}

/// Decoded header of a function-definition instruction. The body is kept as
/// a raw byte range of the outer buffer and prepared when the definition
/// executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: Rc<str>,
    pub params: Vec<Param>,
    /// Declared register-file size; `None` for the legacy definition form.
    pub register_count: Option<u8>,
    pub flags: FunctionFlags,
    pub body: CodeRange,
}

/// A prepared instruction: operands decoded, literals preconverted, branch
/// offsets kept as signed byte deltas relative to the end of the
/// instruction's operand bytes.
#[derive(Debug, Clone, Serialize, Deserialize, IntoStaticStr)]
pub enum Instr {
    /// Terminates the run.
    End,
    Push(Vec<PushItem>),
    Pop,
    PushDuplicate,
    StackSwap,
    /// Peeks the stack top into a register without popping.
    StoreRegister(u8),
    /// Consumed at preparation time; executes as a no-op.
    ConstantPool,

    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Add2,
    Increment,
    Decrement,

    Equals,
    Less,
    Equals2,
    Less2,
    Greater,
    StrictEquals,

    And,
    Or,
    Not,
    BitAnd,
    BitOr,
    BitXor,
    BitLShift,
    BitRShift,
    BitURShift,

    StringAdd,
    StringEquals,
    StringLess,
    StringLength,
    MbStringLength,

    ToNumber,
    ToString,
    ToInteger,
    TypeOf,
    CharToAscii,
    AsciiToChar,

    GetVariable,
    SetVariable,
    DefineLocal,
    DefineLocal2,
    Delete,
    Delete2,
    /// Scope override active until the byte offset `end`.
    With { end: usize },

    GetMember,
    SetMember,
    InitObject,
    InitArray,
    NewObject,
    NewMethod,
    CallMethod,
    CallFunction,
    Return,
    Enumerate2,
    InstanceOf,
    Extends,
    ImplementsOp,
    CastOp,

    Jump { offset: i16 },
    If { offset: i16 },

    DefineFunction(FunctionDecl),
    DefineFunction2(FunctionDecl),

    Trace,
    GetTime,
    RandomNumber,

    /// Unknown or out-of-scope tag; executes as a no-op.
    Raw(u8),
}

impl Instr {
    /// Instruction name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_repr() {
        assert_eq!(Opcode::from_repr(0x47), Some(Opcode::Add2));
        assert_eq!(Opcode::from_repr(0x96), Some(Opcode::Push));
        assert_eq!(Opcode::from_repr(0x77), None);
    }

    #[test]
    fn length_prefix_is_the_high_bit() {
        assert!(!Opcode::has_length(Opcode::Add as u8));
        assert!(Opcode::has_length(Opcode::Push as u8));
        assert!(Opcode::has_length(0xFF));
    }
}
