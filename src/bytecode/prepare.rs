use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::dictionary::{Const, Dictionary};
use crate::function::{FunctionFlags, Param};

use super::image::CodeRange;
use super::op::{FunctionDecl, Instr, Opcode, PushItem};

/// Structural failure while preparing a raw action buffer. Raised before
/// any execution happens; a prepared image is never partially valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareError {
    /// A record's operands or payload run past the end of the region.
    UnexpectedEnd { offset: usize },
    /// A push record carries a type tag the format does not define.
    UnknownPushTag { tag: u8, offset: usize },
    /// A push record references a constant-pool slot that does not exist.
    BadDictionaryIndex { index: usize, offset: usize },
    /// A function definition declares a body extending past the region.
    BodyOverrun { offset: usize },
}

impl fmt::Display for PrepareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd { offset } => {
                write!(f, "action record at byte {offset} runs past the end of the code region")
            }
            Self::UnknownPushTag { tag, offset } => {
                write!(f, "push record at byte {offset} has unknown type tag {tag}")
            }
            Self::BadDictionaryIndex { index, offset } => {
                write!(f, "push record at byte {offset} references missing constant-pool slot {index}")
            }
            Self::BodyOverrun { offset } => {
                write!(f, "function body declared at byte {offset} extends past the code region")
            }
        }
    }
}

impl Error for PrepareError {}

#[derive(Debug)]
pub(super) struct Decoded {
    pub instrs: Vec<Instr>,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
}

/// Bounds-checked reader over one instruction's operand bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], pos: usize, limit: usize) -> Self {
        Self { bytes, pos, limit }
    }

    fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PrepareError> {
        if self.remaining() < len {
            return Err(PrepareError::UnexpectedEnd { offset: self.pos });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, PrepareError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, PrepareError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_i16(&mut self) -> Result<i16, PrepareError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_i32(&mut self) -> Result<i32, PrepareError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32(&mut self) -> Result<f32, PrepareError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Doubles are stored with the high 32-bit word first, each word
    /// little-endian, unlike every other multi-byte operand.
    fn read_f64_swapped(&mut self) -> Result<f64, PrepareError> {
        let b = self.take(8)?;
        let hi = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64;
        let lo = u32::from_le_bytes([b[4], b[5], b[6], b[7]]) as u64;
        Ok(f64::from_bits(hi << 32 | lo))
    }

    /// NUL-terminated string. Non-UTF-8 bytes are replaced rather than
    /// rejected; legacy content is not reliably UTF-8.
    fn read_cstr(&mut self) -> Result<Rc<str>, PrepareError> {
        let start = self.pos;
        while self.pos < self.limit && self.bytes[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.limit {
            return Err(PrepareError::UnexpectedEnd { offset: start });
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]);
        self.pos += 1; // NUL
        Ok(Rc::from(text.as_ref()))
    }
}

/// Decodes `range` of `raw` into a typed instruction list, interning literal
/// push operands into `dictionary` and rebuilding its string table from
/// `constant-pool` records as they are encountered.
pub(super) fn decode_region(
    raw: &[u8],
    range: CodeRange,
    dictionary: &mut Dictionary,
) -> Result<Decoded, PrepareError> {
    if range.end > raw.len() {
        return Err(PrepareError::UnexpectedEnd { offset: range.start });
    }

    let mut instrs = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();

    let mut pos = range.start;
    while pos < range.end {
        let tag_offset = pos;
        let tag = raw[pos];
        pos += 1;

        let op_end = if Opcode::has_length(tag) {
            if range.end - pos < 2 {
                return Err(PrepareError::UnexpectedEnd { offset: tag_offset });
            }
            let len = u16::from_le_bytes([raw[pos], raw[pos + 1]]) as usize;
            pos += 2;
            if range.end - pos < len {
                return Err(PrepareError::UnexpectedEnd { offset: tag_offset });
            }
            pos + len
        } else {
            pos
        };

        let mut cur = Cursor::new(raw, pos, op_end);
        let instr = match Opcode::from_repr(tag) {
            Some(op) => decode_op(op, &mut cur, op_end, range, dictionary)?,
            None => {
                log::trace!("unknown action tag {tag:#04x} at byte {tag_offset}, kept as no-op");
                Instr::Raw(tag)
            }
        };

        // Function bodies live after the record; skip without decoding
        let next = match &instr {
            Instr::DefineFunction(decl) | Instr::DefineFunction2(decl) => decl.body.end,
            _ => op_end,
        };

        instrs.push(instr);
        starts.push(tag_offset);
        ends.push(op_end);
        pos = next;
    }

    Ok(Decoded { instrs, starts, ends })
}

fn decode_op(
    op: Opcode,
    cur: &mut Cursor<'_>,
    op_end: usize,
    range: CodeRange,
    dictionary: &mut Dictionary,
) -> Result<Instr, PrepareError> {
    let instr = match op {
        Opcode::End => Instr::End,
        Opcode::Push => Instr::Push(decode_push_items(cur, dictionary)?),
        Opcode::Pop => Instr::Pop,
        Opcode::PushDuplicate => Instr::PushDuplicate,
        Opcode::StackSwap => Instr::StackSwap,
        Opcode::StoreRegister => Instr::StoreRegister(cur.read_u8()?),
        Opcode::ConstantPool => {
            let count = cur.read_u16()? as usize;
            let mut strings = Vec::with_capacity(count);
            for _ in 0..count {
                strings.push(cur.read_cstr()?);
            }
            dictionary.set_strings(strings);
            Instr::ConstantPool
        }

        Opcode::Add => Instr::Add,
        Opcode::Subtract => Instr::Subtract,
        Opcode::Multiply => Instr::Multiply,
        Opcode::Divide => Instr::Divide,
        Opcode::Modulo => Instr::Modulo,
        Opcode::Add2 => Instr::Add2,
        Opcode::Increment => Instr::Increment,
        Opcode::Decrement => Instr::Decrement,

        Opcode::Equals => Instr::Equals,
        Opcode::Less => Instr::Less,
        Opcode::Equals2 => Instr::Equals2,
        Opcode::Less2 => Instr::Less2,
        Opcode::Greater => Instr::Greater,
        Opcode::StrictEquals => Instr::StrictEquals,

        Opcode::And => Instr::And,
        Opcode::Or => Instr::Or,
        Opcode::Not => Instr::Not,
        Opcode::BitAnd => Instr::BitAnd,
        Opcode::BitOr => Instr::BitOr,
        Opcode::BitXor => Instr::BitXor,
        Opcode::BitLShift => Instr::BitLShift,
        Opcode::BitRShift => Instr::BitRShift,
        Opcode::BitURShift => Instr::BitURShift,

        Opcode::StringAdd => Instr::StringAdd,
        Opcode::StringEquals => Instr::StringEquals,
        Opcode::StringLess => Instr::StringLess,
        Opcode::StringLength => Instr::StringLength,
        Opcode::MbStringLength => Instr::MbStringLength,

        Opcode::ToNumber => Instr::ToNumber,
        Opcode::ToString => Instr::ToString,
        Opcode::ToInteger => Instr::ToInteger,
        Opcode::TypeOf => Instr::TypeOf,
        Opcode::CharToAscii => Instr::CharToAscii,
        Opcode::AsciiToChar => Instr::AsciiToChar,

        Opcode::GetVariable => Instr::GetVariable,
        Opcode::SetVariable => Instr::SetVariable,
        Opcode::DefineLocal => Instr::DefineLocal,
        Opcode::DefineLocal2 => Instr::DefineLocal2,
        Opcode::Delete => Instr::Delete,
        Opcode::Delete2 => Instr::Delete2,
        Opcode::With => {
            let size = cur.read_u16()? as usize;
            // Scope extents are clamped rather than rejected
            Instr::With {
                end: (op_end + size).min(range.end),
            }
        }

        Opcode::GetMember => Instr::GetMember,
        Opcode::SetMember => Instr::SetMember,
        Opcode::InitObject => Instr::InitObject,
        Opcode::InitArray => Instr::InitArray,
        Opcode::NewObject => Instr::NewObject,
        Opcode::NewMethod => Instr::NewMethod,
        Opcode::CallMethod => Instr::CallMethod,
        Opcode::CallFunction => Instr::CallFunction,
        Opcode::Return => Instr::Return,
        Opcode::Enumerate2 => Instr::Enumerate2,
        Opcode::InstanceOf => Instr::InstanceOf,
        Opcode::Extends => Instr::Extends,
        Opcode::ImplementsOp => Instr::ImplementsOp,
        Opcode::CastOp => Instr::CastOp,

        Opcode::Jump => Instr::Jump { offset: cur.read_i16()? },
        Opcode::If => Instr::If { offset: cur.read_i16()? },

        Opcode::DefineFunction => {
            let name = cur.read_cstr()?;
            let count = cur.read_u16()? as usize;
            let mut params = Vec::with_capacity(count);
            for _ in 0..count {
                params.push(Param::named(cur.read_cstr()?));
            }
            let code_size = cur.read_u16()? as usize;
            Instr::DefineFunction(FunctionDecl {
                name,
                params,
                register_count: None,
                flags: FunctionFlags::default(),
                body: body_range(op_end, code_size, range)?,
            })
        }
        Opcode::DefineFunction2 => {
            let name = cur.read_cstr()?;
            let count = cur.read_u16()? as usize;
            let register_count = cur.read_u8()?;
            let flags = FunctionFlags::from_bits(cur.read_u16()?);
            let mut params = Vec::with_capacity(count);
            for _ in 0..count {
                let register = cur.read_u8()?;
                let name = cur.read_cstr()?;
                params.push(Param { register, name });
            }
            let code_size = cur.read_u16()? as usize;
            Instr::DefineFunction2(FunctionDecl {
                name,
                params,
                register_count: Some(register_count),
                flags,
                body: body_range(op_end, code_size, range)?,
            })
        }

        Opcode::Trace => Instr::Trace,
        Opcode::GetTime => Instr::GetTime,
        Opcode::RandomNumber => Instr::RandomNumber,
    };
    Ok(instr)
}

fn body_range(op_end: usize, code_size: usize, range: CodeRange) -> Result<CodeRange, PrepareError> {
    if range.end - op_end < code_size {
        return Err(PrepareError::BodyOverrun { offset: op_end });
    }
    Ok(CodeRange::new(op_end, op_end + code_size))
}

/// Decodes the typed literal records of one push instruction, preconverting
/// every literal into the dictionary's constant area.
fn decode_push_items(
    cur: &mut Cursor<'_>,
    dictionary: &mut Dictionary,
) -> Result<Vec<PushItem>, PrepareError> {
    let mut items = Vec::new();
    while cur.remaining() > 0 {
        let offset = cur.pos;
        let tag = cur.read_u8()?;
        let item = match tag {
            0 => PushItem::Const(dictionary.add_const(Const::Str(cur.read_cstr()?))),
            1 => PushItem::Const(dictionary.add_const(Const::Number(cur.read_f32()? as f64))),
            2 => PushItem::Const(dictionary.add_const(Const::Null)),
            3 => PushItem::Const(dictionary.add_const(Const::Undefined)),
            4 => PushItem::Register(cur.read_u8()?),
            5 => PushItem::Const(dictionary.add_const(Const::Bool(cur.read_u8()? != 0))),
            6 => PushItem::Const(dictionary.add_const(Const::Number(cur.read_f64_swapped()?))),
            7 => PushItem::Const(dictionary.add_const(Const::Number(cur.read_i32()? as f64))),
            8 | 9 => {
                let index = if tag == 8 {
                    cur.read_u8()? as usize
                } else {
                    cur.read_u16()? as usize
                };
                let text = dictionary
                    .string(index)
                    .cloned()
                    .ok_or(PrepareError::BadDictionaryIndex { index, offset })?;
                PushItem::Const(dictionary.add_const(Const::Str(text)))
            }
            _ => return Err(PrepareError::UnknownPushTag { tag, offset }),
        };
        items.push(item);
    }
    Ok(items)
}
