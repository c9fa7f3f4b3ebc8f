//! Bytecode preparation and the prepared instruction model.
//!
//! Raw action buffers are decoded exactly once ([`Image::prepare`]) into a
//! typed instruction list with all literal operands preconverted; execution
//! (`crate::execute`) then steps a byte-addressed program counter over that
//! list.

mod image;
mod op;
mod prepare;

pub use image::{CodeRange, Image};
pub use op::{FunctionDecl, Instr, Opcode, PushItem};
pub use prepare::PrepareError;
