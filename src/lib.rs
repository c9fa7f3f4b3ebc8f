//! A stack-based interpreter for AVM1-style ActionScript bytecode.
//!
//! The pipeline has two passes. [`Image::prepare`] decodes a raw action
//! buffer exactly once into a typed instruction list, preconverting literal
//! operands into a per-unit [`Dictionary`]; [`Context::run`] then steps a
//! byte-addressed program counter over the prepared region, mutating the
//! active frame's stack, registers, and every object reachable from it.
//!
//! Objects and functions live in a mark-and-sweep arena ([`Heap`]) addressed
//! by [`HeapId`]; prototype links and closures may form cycles, reclaimed by
//! [`Context::collect_garbage`] between host ticks. Scripts that misuse the
//! dynamic type system degrade to `undefined` rather than failing; the only
//! hard error is a structural [`PrepareError`] raised before execution.
//!
//! ```
//! use actionvm::{Context, Value};
//!
//! // push "a", push "b", add2
//! let code: Vec<u8> = vec![
//!     0x96, 3, 0, 0, b'a', 0,
//!     0x96, 3, 0, 0, b'b', 0,
//!     0x47,
//!     0x3E, // return
//! ];
//! let mut ctx = Context::new();
//! assert_eq!(ctx.run_buffer(code).unwrap(), Value::from("ab"));
//! ```

pub mod bytecode;
mod context;
mod dictionary;
mod execute;
mod frame;
mod function;
mod heap;
mod io;
mod object;
mod value;

pub use bytecode::{CodeRange, Image, PrepareError};
pub use context::Context;
pub use dictionary::{Const, ConstId, Dictionary};
pub use frame::{Frame, ValueStack, LEGACY_REGISTER_COUNT};
pub use function::{
    CapturedEnv, DefinedFunction, Function, FunctionBody, FunctionFlags, NativeFn, Param,
};
pub use heap::{Heap, HeapData, HeapId, SuperObject};
pub use io::{CollectTrace, NoTrace, StdTrace, TraceWriter};
pub use object::{Object, Property, CONSTRUCTOR_MEMBER, MAX_PROTO_DEPTH, PROTO_MEMBER, PROTOTYPE_MEMBER};
pub use value::{
    f64_to_int32, f64_to_uint32, number_to_string, string_to_number, CmpResult, TypeName, Value,
};
