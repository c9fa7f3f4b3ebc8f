use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dictionary::Dictionary;

use super::op::Instr;
use super::prepare::{self, PrepareError};

/// A half-open byte range `[start, end)` of a raw action buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRange {
    pub start: usize,
    pub end: usize,
}

impl CodeRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An immutable, prepared code region.
///
/// Preparation decodes the raw record stream once into a typed instruction
/// list, interning literal operands into the dictionary's constant area, so
/// execution never re-parses wire encodings. The raw buffer is retained only
/// because function-definition instructions reference nested body ranges
/// inside it; those are prepared separately when the definition executes.
///
/// The program counter stays byte-addressed: `starts`/`ends` record each
/// instruction's tag offset and the offset just past its operand bytes, and
/// branch instructions adjust the counter by byte deltas. This keeps branch
/// arithmetic identical to the wire format while dispatch stays typed.
#[derive(Debug, Serialize, Deserialize)]
pub struct Image {
    raw: Rc<[u8]>,
    range: CodeRange,
    dictionary: Dictionary,
    instrs: Vec<Instr>,
    starts: Vec<usize>,
    ends: Vec<usize>,
}

impl Image {
    /// Prepares a whole buffer as top-level code with a fresh dictionary.
    pub fn prepare(bytes: impl Into<Rc<[u8]>>) -> Result<Self, PrepareError> {
        let raw = bytes.into();
        let range = CodeRange::new(0, raw.len());
        Self::prepare_region(raw, range, Dictionary::new())
    }

    /// Prepares a nested body range against this image's dictionary. The
    /// child starts from a copy: constants it interns do not leak back.
    pub fn prepare_nested(&self, range: CodeRange) -> Result<Self, PrepareError> {
        Self::prepare_region(Rc::clone(&self.raw), range, self.dictionary.clone())
    }

    fn prepare_region(
        raw: Rc<[u8]>,
        range: CodeRange,
        mut dictionary: Dictionary,
    ) -> Result<Self, PrepareError> {
        let decoded = prepare::decode_region(&raw, range, &mut dictionary)?;
        log::debug!(
            "prepared {} instructions over {} bytes ({} constants)",
            decoded.instrs.len(),
            range.len(),
            dictionary.const_count()
        );
        Ok(Self {
            raw,
            range,
            dictionary,
            instrs: decoded.instrs,
            starts: decoded.starts,
            ends: decoded.ends,
        })
    }

    pub fn range(&self) -> CodeRange {
        self.range
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    pub fn instr(&self, index: usize) -> &Instr {
        &self.instrs[index]
    }

    /// Byte offset of the instruction's tag.
    pub fn start(&self, index: usize) -> usize {
        self.starts[index]
    }

    /// Byte offset just past the instruction's operand bytes. Branch
    /// deltas are relative to this address.
    pub fn end(&self, index: usize) -> usize {
        self.ends[index]
    }

    /// Resolves a byte program counter to an instruction index. Only exact
    /// instruction boundaries resolve; a counter pointing elsewhere (past
    /// the region, or into skipped function-body bytes) yields `None` and
    /// the run terminates.
    pub fn index_at(&self, pc: usize) -> Option<usize> {
        self.starts.binary_search(&pc).ok()
    }
}
