use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::function::Function;
use crate::object::{Object, MAX_PROTO_DEPTH};
use crate::value::Value;

/// Unique identifier for objects stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeapId(u32);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Builds an id from a raw index. Only meaningful for ids that came out
    /// of the same heap; mainly useful in tests.
    pub fn from_raw(index: u32) -> Self {
        HeapId(index)
    }
}

/// Everything that lives in the arena: objects, functions (objects with a
/// body), and the `super` wrapper produced for super-dispatch.
#[derive(Debug)]
pub enum HeapData {
    Object(Object),
    Function(Function),
    Super(SuperObject),
}

/// Scope wrapper for `super` calls: member lookups forward to the prototype
/// one level above `base`, and method invocations bind `this` to the
/// original instance rather than the wrapper.
#[derive(Debug, Clone, Copy)]
pub struct SuperObject {
    /// The instance the enclosing method was invoked on.
    pub this: HeapId,
    /// The instance's own prototype; lookups start at `base`'s prototype.
    pub base: HeapId,
}

impl HeapData {
    /// The object surface of this slot, if it has one (`super` wrappers
    /// have no members of their own).
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            Self::Function(f) => Some(&f.base),
            Self::Super(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Self::Object(o) => Some(o),
            Self::Function(f) => Some(&mut f.base),
            Self::Super(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    fn trace(&self, out: &mut Vec<HeapId>) {
        match self {
            Self::Object(o) => o.trace(out),
            Self::Function(f) => f.trace(out),
            Self::Super(s) => {
                out.push(s.this);
                out.push(s.base);
            }
        }
    }
}

/// One arena slot.
#[derive(Debug)]
struct HeapEntry {
    data: HeapData,
    marked: bool,
}

/// Arena that backs all objects and functions.
///
/// Uses a free list to reuse slots from collected objects, keeping memory
/// usage flat across long-running scripts. Objects are shared freely
/// (prototype links, closures, stack slots) and may form cycles through
/// `__proto__` or captured environments; reclamation is an explicit
/// mark-and-sweep pass the host runs between frame ticks, with roots
/// supplied by the [`Context`](crate::context::Context).
#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<Option<HeapEntry>>,
    /// Slots freed by the sweep phase, reused by `allocate`.
    free_list: Vec<HeapId>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let entry = HeapEntry { data, marked: false };
        match self.free_list.pop() {
            Some(id) => {
                debug_assert!(self.entries[id.index()].is_none(), "free list pointed at a live slot");
                self.entries[id.index()] = Some(entry);
                id
            }
            None => {
                let id = HeapId(self.entries.len().try_into().expect("heap arena overflow"));
                self.entries.push(Some(entry));
                id
            }
        }
    }

    pub fn alloc_object(&mut self, object: Object) -> HeapId {
        self.allocate(HeapData::Object(object))
    }

    /// Fetches a slot. A stale id is a host/VM contract violation, not a
    /// script error, so it fails loudly.
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .and_then(|e| e.as_ref())
            .map(|e| &e.data)
            .expect("Heap::get: dangling heap id")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .and_then(|e| e.as_mut())
            .map(|e| &mut e.data)
            .expect("Heap::get_mut: dangling heap id")
    }

    pub fn contains(&self, id: HeapId) -> bool {
        self.entries.get(id.index()).is_some_and(|e| e.is_some())
    }

    /// The object surface at `id`, following the function-as-object view.
    pub fn object(&self, id: HeapId) -> Option<&Object> {
        self.get(id).as_object()
    }

    pub fn object_mut(&mut self, id: HeapId) -> Option<&mut Object> {
        self.get_mut(id).as_object_mut()
    }

    pub fn function(&self, id: HeapId) -> Option<&Function> {
        self.get(id).as_function()
    }

    /// Number of live slots.
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Resolves `name` on the object at `id` or along its prototype chain,
    /// without invoking property getters. Returns `None` when no level of
    /// the (depth-bounded) chain defines the member.
    pub fn resolve_member(&self, id: HeapId, name: &str) -> Option<Value> {
        let mut current = self.lookup_start(id);
        for _ in 0..MAX_PROTO_DEPTH {
            let obj = self.object(current?)?;
            if let Some(value) = obj.get_member(name) {
                return Some(value);
            }
            current = obj.proto();
        }
        log::warn!("prototype chain exceeded {MAX_PROTO_DEPTH} levels resolving {name:?}");
        None
    }

    /// Whether any level of the chain defines `name` as member or property.
    pub fn chain_has_member(&self, id: HeapId, name: &str) -> bool {
        let mut current = self.lookup_start(id);
        for _ in 0..MAX_PROTO_DEPTH {
            let Some(obj) = current.and_then(|c| self.object(c)) else {
                return false;
            };
            if obj.has_member(name) || obj.property(name).is_some() {
                return true;
            }
            current = obj.proto();
        }
        false
    }

    /// Where member lookup starts: `super` wrappers forward to the
    /// prototype one level above their base.
    pub(crate) fn lookup_start(&self, id: HeapId) -> Option<HeapId> {
        match self.get(id) {
            HeapData::Super(s) => self.object(s.base).and_then(Object::proto),
            _ => Some(id),
        }
    }

    /// Mark-and-sweep collection. Everything reachable from `roots` through
    /// members, properties, prototype links, interfaces, and captured
    /// environments survives; every other slot is freed. Returns the number
    /// of slots freed.
    ///
    /// Cycles (e.g. through `__proto__` or closures) are handled naturally:
    /// the mark phase visits each slot at most once.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        for entry in self.entries.iter_mut().flatten() {
            entry.marked = false;
        }

        let mut worklist: Vec<HeapId> = roots.into_iter().collect();
        let mut children = Vec::new();
        while let Some(id) = worklist.pop() {
            let Some(entry) = self.entries.get_mut(id.index()).and_then(|e| e.as_mut()) else {
                continue;
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;
            children.clear();
            entry.data.trace(&mut children);
            worklist.extend_from_slice(&children);
        }

        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if let Some(entry) = slot {
                if !entry.marked {
                    *slot = None;
                    self.free_list.push(HeapId(index as u32));
                    freed += 1;
                }
            }
        }
        if freed > 0 {
            log::debug!("garbage collection freed {freed} of {} slots", self.entries.len());
        }
        freed
    }

    /// Collects the set of ids on a prototype chain, bounded and
    /// cycle-tolerant. Used by `instanceof`-style checks.
    pub(crate) fn proto_chain(&self, id: HeapId) -> Vec<HeapId> {
        let mut seen = AHashSet::new();
        let mut chain = Vec::new();
        let mut current = self.object(id).and_then(Object::proto);
        while let Some(next) = current {
            if !seen.insert(next) || chain.len() >= MAX_PROTO_DEPTH {
                break;
            }
            chain.push(next);
            current = self.object(next).and_then(Object::proto);
        }
        chain
    }
}
