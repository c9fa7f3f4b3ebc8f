#![allow(dead_code)]

use actionvm::bytecode::Opcode;
use actionvm::{Context, Value};

/// Hand-assembles raw action buffers for tests: records get their length
/// prefixes and push operands their type tags, exactly as on the wire.
#[derive(Default)]
pub struct Actions {
    bytes: Vec<u8>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// A single-byte (no-operand) action.
    pub fn op(mut self, op: Opcode) -> Self {
        self.bytes.push(op as u8);
        self
    }

    /// An arbitrary single tag byte, for unknown-opcode cases.
    pub fn raw(mut self, tag: u8) -> Self {
        self.bytes.push(tag);
        self
    }

    pub fn ret(self) -> Self {
        self.op(Opcode::Return)
    }

    fn record(mut self, op: Opcode, operands: &[u8]) -> Self {
        self.bytes.push(op as u8);
        self.bytes
            .extend_from_slice(&(operands.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(operands);
        self
    }

    fn push_record(self, payload: &[u8]) -> Self {
        self.record(Opcode::Push, payload)
    }

    pub fn push_str(self, s: &str) -> Self {
        let mut payload = vec![0u8];
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
        self.push_record(&payload)
    }

    pub fn push_f32(self, n: f32) -> Self {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&n.to_le_bytes());
        self.push_record(&payload)
    }

    pub fn push_null(self) -> Self {
        self.push_record(&[2])
    }

    pub fn push_undefined(self) -> Self {
        self.push_record(&[3])
    }

    pub fn push_register(self, register: u8) -> Self {
        self.push_record(&[4, register])
    }

    pub fn push_bool(self, b: bool) -> Self {
        self.push_record(&[5, b as u8])
    }

    /// Doubles go on the wire high 32-bit word first, each word LE.
    pub fn push_f64(self, n: f64) -> Self {
        let bits = n.to_bits();
        let mut payload = vec![6u8];
        payload.extend_from_slice(&((bits >> 32) as u32).to_le_bytes());
        payload.extend_from_slice(&(bits as u32).to_le_bytes());
        self.push_record(&payload)
    }

    pub fn push_i32(self, n: i32) -> Self {
        let mut payload = vec![7u8];
        payload.extend_from_slice(&n.to_le_bytes());
        self.push_record(&payload)
    }

    pub fn push_pool(self, index: u16) -> Self {
        if index < 256 {
            self.push_record(&[8, index as u8])
        } else {
            let mut payload = vec![9u8];
            payload.extend_from_slice(&index.to_le_bytes());
            self.push_record(&payload)
        }
    }

    pub fn constant_pool(self, strings: &[&str]) -> Self {
        let mut operands = (strings.len() as u16).to_le_bytes().to_vec();
        for s in strings {
            operands.extend_from_slice(s.as_bytes());
            operands.push(0);
        }
        self.record(Opcode::ConstantPool, &operands)
    }

    pub fn store_register(self, register: u8) -> Self {
        self.record(Opcode::StoreRegister, &[register])
    }

    pub fn jump(self, offset: i16) -> Self {
        self.record(Opcode::Jump, &offset.to_le_bytes())
    }

    pub fn if_true(self, offset: i16) -> Self {
        self.record(Opcode::If, &offset.to_le_bytes())
    }

    /// A `with` record scoped over `body`.
    pub fn with_scope(self, body: Actions) -> Self {
        let body = body.build();
        let mut this = self.record(Opcode::With, &(body.len() as u16).to_le_bytes());
        this.bytes.extend_from_slice(&body);
        this
    }

    /// Legacy function definition; the body follows the record on the wire.
    pub fn define_function(self, name: &str, params: &[&str], body: Actions) -> Self {
        let body = body.build();
        let mut operands = Vec::new();
        operands.extend_from_slice(name.as_bytes());
        operands.push(0);
        operands.extend_from_slice(&(params.len() as u16).to_le_bytes());
        for p in params {
            operands.extend_from_slice(p.as_bytes());
            operands.push(0);
        }
        operands.extend_from_slice(&(body.len() as u16).to_le_bytes());
        let mut this = self.record(Opcode::DefineFunction, &operands);
        this.bytes.extend_from_slice(&body);
        this
    }

    /// Register-based function definition.
    pub fn define_function2(
        self,
        name: &str,
        register_count: u8,
        flags: u16,
        params: &[(u8, &str)],
        body: Actions,
    ) -> Self {
        let body = body.build();
        let mut operands = Vec::new();
        operands.extend_from_slice(name.as_bytes());
        operands.push(0);
        operands.extend_from_slice(&(params.len() as u16).to_le_bytes());
        operands.push(register_count);
        operands.extend_from_slice(&flags.to_le_bytes());
        for (register, name) in params {
            operands.push(*register);
            operands.extend_from_slice(name.as_bytes());
            operands.push(0);
        }
        operands.extend_from_slice(&(body.len() as u16).to_le_bytes());
        let mut this = self.record(Opcode::DefineFunction2, &operands);
        this.bytes.extend_from_slice(&body);
        this
    }
}

/// Runs an action buffer in a fresh context, returning the value its
/// `return` instruction produced.
pub fn run(actions: Actions) -> Value {
    let mut ctx = Context::new();
    run_in(&mut ctx, actions)
}

pub fn run_in(ctx: &mut Context, actions: Actions) -> Value {
    ctx.run_buffer(actions.build()).expect("buffer should prepare")
}
