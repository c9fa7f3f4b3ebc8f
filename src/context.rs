use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::bytecode::{Image, PrepareError};
use crate::execute;
use crate::function::{Function, NativeFn};
use crate::heap::{Heap, HeapData, HeapId};
use crate::io::{StdTrace, TraceWriter};
use crate::object::{Object, PROTOTYPE_MEMBER};
use crate::value::Value;

const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Per-VM-instance state: the arena, the global object, the host binding,
/// the trace sink, and the wall clock and PRNG the time/random instructions
/// read.
///
/// The host drives everything synchronously: prepare an [`Image`], [`run`]
/// it (repeatedly, if it is a frame script), and call [`collect_garbage`]
/// between ticks. Native functions installed via [`register_native`] appear
/// to scripts as ordinary functions.
///
/// [`run`]: Context::run
/// [`collect_garbage`]: Context::collect_garbage
/// [`register_native`]: Context::register_native
pub struct Context {
    pub heap: Heap,
    globals: HeapId,
    /// Host-bound object (e.g. the movie clip a script is attached to);
    /// `this` for top-level runs and a stop on the variable lookup chain.
    bound: Option<HeapId>,
    /// Extra GC roots registered by the host.
    roots: Vec<HeapId>,
    tracer: Rc<RefCell<dyn TraceWriter>>,
    started: Instant,
    rng_state: u64,
    max_call_depth: usize,
}

impl Context {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let globals = heap.alloc_object(Object::new());
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self {
            heap,
            globals,
            bound: None,
            roots: Vec::new(),
            tracer: Rc::new(RefCell::new(StdTrace)),
            started: Instant::now(),
            rng_state: seed | 1,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Replaces the trace sink. The host keeps its own clone of the handle
    /// when it wants to read collected output back.
    pub fn set_tracer(&mut self, tracer: Rc<RefCell<dyn TraceWriter>>) {
        self.tracer = tracer;
    }

    pub fn globals(&self) -> HeapId {
        self.globals
    }

    pub fn bound(&self) -> Option<HeapId> {
        self.bound
    }

    /// Installs the host-bound object.
    pub fn set_bound(&mut self, bound: Option<HeapId>) {
        self.bound = bound;
    }

    /// The value top-level code sees as `this`.
    pub fn bound_value(&self) -> Value {
        match self.bound {
            Some(id) => Value::Object(id),
            None => Value::Object(self.globals),
        }
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Allocates a function and wires the `prototype`/`constructor` pair
    /// every callable carries.
    pub fn alloc_function(&mut self, function: Function) -> HeapId {
        let id = self.heap.allocate(HeapData::Function(function));
        let mut proto = Object::new();
        proto.set_member("constructor", Value::Object(id));
        let proto_id = self.heap.alloc_object(proto);
        if let Some(obj) = self.heap.object_mut(id) {
            obj.set_member(PROTOTYPE_MEMBER, Value::Object(proto_id));
        }
        id
    }

    /// Installs a host-native function as a member of the global object,
    /// indistinguishable from a script-defined function.
    pub fn register_native(&mut self, name: &str, func: NativeFn) -> HeapId {
        let id = self.alloc_function(Function::native(name, func));
        if let Some(globals) = self.heap.object_mut(self.globals) {
            globals.set_member(name, Value::Object(id));
        }
        id
    }

    /// Calls a callable value from the host.
    pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> Value {
        execute::call_value(self, callee, this, args, 0)
    }

    /// Runs a prepared image as top-level code, returning the value of its
    /// return instruction (`undefined` when the region just ends).
    pub fn run(&mut self, image: &Rc<Image>) -> Value {
        execute::run_top_level(self, image)
    }

    /// Prepares and runs a raw action buffer in one step.
    pub fn run_buffer(&mut self, bytes: impl Into<Rc<[u8]>>) -> Result<Value, PrepareError> {
        let image = Rc::new(Image::prepare(bytes)?);
        Ok(self.run(&image))
    }

    /// Registers an extra GC root (host-held object references).
    pub fn add_root(&mut self, id: HeapId) {
        self.roots.push(id);
    }

    pub fn remove_root(&mut self, id: HeapId) {
        if let Some(index) = self.roots.iter().position(|&r| r == id) {
            self.roots.swap_remove(index);
        }
    }

    /// Mark-and-sweep over the arena. To be called between host frame
    /// ticks, when no script frame is live. Returns the number of slots
    /// reclaimed.
    pub fn collect_garbage(&mut self) -> usize {
        let roots: Vec<HeapId> = std::iter::once(self.globals)
            .chain(self.bound)
            .chain(self.roots.iter().copied())
            .collect();
        self.heap.collect(roots)
    }

    /// Milliseconds since this context was created.
    pub fn elapsed_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Uniform integer in `[0, max)`. xorshift64; not suitable for
    /// anything but script-visible randomness.
    pub fn random_below(&mut self, max: u32) -> u32 {
        debug_assert!(max > 0);
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x % u64::from(max)) as u32
    }

    pub(crate) fn trace_line(&mut self, message: &str) {
        self.tracer.borrow_mut().trace(message);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
