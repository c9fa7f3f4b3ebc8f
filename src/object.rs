use std::rc::Rc;

use ahash::{AHashMap, RandomState};
use indexmap::IndexMap;

use crate::heap::HeapId;
use crate::value::Value;

/// Member name exposing the prototype link.
pub const PROTO_MEMBER: &str = "__proto__";
/// Reserved member holding the back-reference to the constructor function.
pub const CONSTRUCTOR_MEMBER: &str = "__constructor__";
/// Member of a function object used to construct new instances.
pub const PROTOTYPE_MEMBER: &str = "prototype";

/// Upper bound on prototype-chain walks. Chains can be cyclic through
/// `__proto__` assignment; the walk stops rather than looping forever.
pub const MAX_PROTO_DEPTH: usize = 256;

/// A getter/setter pair installed on an object. Either side may be absent.
/// Both reference callable function slots in the arena.
#[derive(Debug, Clone, Copy, Default)]
pub struct Property {
    pub getter: Option<HeapId>,
    pub setter: Option<HeapId>,
}

/// A dynamic, prototype-based script object.
///
/// Holds a member map (string key -> value, keys unique), a property map of
/// getter/setter pairs, an optional prototype link forming the inherited
/// lookup chain, a read-only flag that silently rejects mutation once set,
/// and a list of interface objects satisfied by `instanceof`-style checks.
///
/// These methods are the raw, side-effect-free layer: they never invoke
/// getters or setters and never walk the prototype chain. Chain walking and
/// property invocation go through the dispatch core, which owns the frame
/// and stack needed to run getter/setter closures.
#[derive(Debug, Default)]
pub struct Object {
    members: IndexMap<Rc<str>, Value, RandomState>,
    properties: AHashMap<Rc<str>, Property>,
    proto: Option<HeapId>,
    read_only: bool,
    interfaces: Vec<HeapId>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proto(proto: HeapId) -> Self {
        Self {
            proto: Some(proto),
            ..Self::default()
        }
    }

    /// Inserts or overwrites a local member. Silently rejected when the
    /// object is read-only. Writing `__proto__` rewires the prototype link.
    pub fn set_member(&mut self, name: &str, value: Value) {
        if self.read_only {
            log::trace!("set_member {name:?} ignored: object is read-only");
            return;
        }
        if name == PROTO_MEMBER {
            self.proto = value.object_id();
            return;
        }
        match self.members.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.members.insert(Rc::from(name), value);
            }
        }
    }

    /// Reads a local member without consulting properties or the prototype
    /// chain. `__proto__` is exposed as a virtual member.
    pub fn get_member(&self, name: &str) -> Option<Value> {
        if name == PROTO_MEMBER {
            return Some(match self.proto {
                Some(id) => Value::Object(id),
                None => Value::Undefined,
            });
        }
        self.members.get(name).cloned()
    }

    pub fn has_member(&self, name: &str) -> bool {
        name == PROTO_MEMBER && self.proto.is_some() || self.members.contains_key(name)
    }

    /// Removes a local member. Never traverses the prototype chain; deleting
    /// an inherited member is a no-op that reports `false`.
    pub fn delete_member(&mut self, name: &str) -> bool {
        if self.read_only {
            return false;
        }
        self.members.shift_remove(name).is_some()
    }

    /// Installs or replaces a getter/setter pair for `name`.
    pub fn add_property(&mut self, name: &str, getter: Option<HeapId>, setter: Option<HeapId>) {
        self.properties.insert(Rc::from(name), Property { getter, setter });
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.properties.get(name).copied()
    }

    /// Appends an interface object consulted by `instanceof`-style checks.
    pub fn add_interface(&mut self, interface: HeapId) {
        self.interfaces.push(interface);
    }

    pub fn interfaces(&self) -> &[HeapId] {
        &self.interfaces
    }

    pub fn proto(&self) -> Option<HeapId> {
        self.proto
    }

    pub fn set_proto(&mut self, proto: Option<HeapId>) {
        self.proto = proto;
    }

    /// Marks the object read-only. Once set, member mutation is silently
    /// rejected; there is no way to clear the flag from script.
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Iterates local member names in insertion order (used by enumeration
    /// opcodes). The virtual `__proto__` member is not included.
    pub fn member_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.members.keys()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Pushes every arena id reachable from this object: member values,
    /// getter/setter functions, the prototype link, and interfaces.
    /// Used by the mark phase of garbage collection.
    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        for value in self.members.values() {
            if let Value::Object(id) = value {
                out.push(*id);
            }
        }
        for prop in self.properties.values() {
            out.extend(prop.getter);
            out.extend(prop.setter);
        }
        out.extend(self.proto);
        out.extend(self.interfaces.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_insert_overwrite_delete() {
        let mut obj = Object::new();
        obj.set_member("x", Value::Number(1.0));
        obj.set_member("x", Value::Number(2.0));
        assert_eq!(obj.get_member("x"), Some(Value::Number(2.0)));
        assert!(obj.delete_member("x"));
        assert!(!obj.delete_member("x"));
        assert_eq!(obj.get_member("x"), None);
    }

    #[test]
    fn read_only_rejects_mutation_silently() {
        let mut obj = Object::new();
        obj.set_member("a", Value::Bool(true));
        obj.set_read_only();
        obj.set_member("a", Value::Bool(false));
        obj.set_member("b", Value::Null);
        assert_eq!(obj.get_member("a"), Some(Value::Bool(true)));
        assert_eq!(obj.get_member("b"), None);
        assert!(!obj.delete_member("a"));
        assert_eq!(obj.get_member("a"), Some(Value::Bool(true)));
    }

    #[test]
    fn proto_is_a_virtual_member() {
        let mut obj = Object::new();
        assert_eq!(obj.get_member(PROTO_MEMBER), Some(Value::Undefined));
        let proto = HeapId::from_raw(3);
        obj.set_member(PROTO_MEMBER, Value::Object(proto));
        assert_eq!(obj.proto(), Some(proto));
        assert_eq!(obj.get_member(PROTO_MEMBER), Some(Value::Object(proto)));
        // Assigning a non-object clears the link
        obj.set_member(PROTO_MEMBER, Value::Null);
        assert_eq!(obj.proto(), None);
    }

    #[test]
    fn properties_do_not_shadow_member_storage() {
        let mut obj = Object::new();
        obj.add_property("x", Some(HeapId::from_raw(1)), None);
        assert!(obj.property("x").is_some());
        assert!(obj.property("x").unwrap().setter.is_none());
        // The raw member layer is independent of the property table
        assert_eq!(obj.get_member("x"), None);
    }
}
