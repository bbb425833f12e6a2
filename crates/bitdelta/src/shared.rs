// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity-preserving shared objects.
//!
//! A shared object is a polymorphic object with four identifiers: its
//! session-unique `id`, the `origin_id` shared with every successor in its
//! lineage, and the peer's `remote_id` / `remote_origin_id` learned when it
//! arrives over a connection. Successors keep the origin, which is what
//! lets a stream transmit a mutated object as a delta against its previous
//! incarnation.
//!
//! Ownership stays with the application; the codec's per-stream maps hold
//! only `Weak` references and drop entries when the application releases
//! the object or clears it explicitly.

use crate::registry::ClassDescriptor;
use crate::value::PolyObject;
use parking_lot::{Mutex, MutexGuard};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn allocate_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared handle to a [`SharedObject`].
pub type SharedObjectPointer = Arc<SharedObject>;

/// A polymorphic object transmitted by identity.
#[derive(Debug)]
pub struct SharedObject {
    id: u32,
    origin_id: AtomicU32,
    remote_id: AtomicU32,
    remote_origin_id: AtomicU32,
    state: Mutex<PolyObject>,
}

impl SharedObject {
    /// Fresh object of `class` with default property values; its origin is
    /// itself.
    pub fn new(class: &Arc<ClassDescriptor>) -> SharedObjectPointer {
        Self::from_state(PolyObject::new(class))
    }

    /// Wrap an existing object state under a fresh identity.
    pub fn from_state(state: PolyObject) -> SharedObjectPointer {
        let id = allocate_id();
        Arc::new(Self {
            id,
            origin_id: AtomicU32::new(id),
            remote_id: AtomicU32::new(0),
            remote_origin_id: AtomicU32::new(0),
            state: Mutex::new(state),
        })
    }

    /// A successor: new identity, same origin, cloned state. Transmitting
    /// it to a peer that knows the predecessor costs only the changed
    /// properties.
    pub fn successor(self: &Arc<Self>) -> SharedObjectPointer {
        Arc::new(Self {
            id: allocate_id(),
            origin_id: AtomicU32::new(self.origin_id()),
            remote_id: AtomicU32::new(0),
            remote_origin_id: AtomicU32::new(0),
            state: Mutex::new(self.state.lock().clone()),
        })
    }

    /// Session-unique identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Identifier of the lineage root, shared with successors.
    pub fn origin_id(&self) -> u32 {
        self.origin_id.load(Ordering::Relaxed)
    }

    /// The peer's current ID for this object (0 until received).
    pub fn remote_id(&self) -> u32 {
        self.remote_id.load(Ordering::Relaxed)
    }

    /// The peer's origin ID for this object's lineage (0 until received).
    pub fn remote_origin_id(&self) -> u32 {
        self.remote_origin_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_origin_id(&self, id: u32) {
        self.origin_id.store(id, Ordering::Relaxed);
    }

    pub(crate) fn set_remote_id(&self, id: u32) {
        self.remote_id.store(id, Ordering::Relaxed);
    }

    pub(crate) fn set_remote_origin_id(&self, id: u32) {
        self.remote_origin_id.store(id, Ordering::Relaxed);
    }

    /// Lock the object state. Deltas received for an already-known remote
    /// ID mutate the state in place through this lock.
    pub fn state(&self) -> MutexGuard<'_, PolyObject> {
        self.state.lock()
    }

    pub fn class(&self) -> Arc<ClassDescriptor> {
        self.state.lock().class().clone()
    }

    pub fn property(&self, name: &str) -> Option<crate::value::Value> {
        self.state.lock().property(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: crate::value::Value) -> bool {
        self.state.lock().set_property(name, value)
    }
}

/// Identity equality: two handles are equal when they are the same session
/// object.
impl PartialEq for SharedObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SharedObject {}

/// Interning key for write-side shared-object tables, hashing by session
/// ID.
#[derive(Debug, Clone)]
pub(crate) struct SharedKey(pub SharedObjectPointer);

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for SharedKey {}

impl Hash for SharedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::value::Value;

    fn test_class() -> Arc<ClassDescriptor> {
        registry::register_class(
            "shared_test::Counter",
            vec![("count".into(), registry::i32_streamer())],
        )
    }

    #[test]
    fn test_fresh_identity() {
        let class = test_class();
        let a = SharedObject::new(&class);
        let b = SharedObject::new(&class);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.origin_id(), a.id());
        assert_eq!(a.remote_id(), 0);
    }

    #[test]
    fn test_successor_shares_origin() {
        let class = test_class();
        let original = SharedObject::new(&class);
        original.set_property("count", Value::I32(7));
        let next = original.successor();
        assert_ne!(next.id(), original.id());
        assert_eq!(next.origin_id(), original.origin_id());
        assert_eq!(next.property("count"), Some(Value::I32(7)));
    }

    #[test]
    fn test_in_place_mutation() {
        let class = test_class();
        let object = SharedObject::new(&class);
        object.state().set_property("count", Value::I32(3));
        assert_eq!(object.property("count"), Some(Value::I32(3)));
    }

    #[test]
    fn test_shared_key_identity() {
        let class = test_class();
        let object = SharedObject::new(&class);
        let key_a = SharedKey(object.clone());
        let key_b = SharedKey(object);
        assert_eq!(key_a, key_b);
    }
}
