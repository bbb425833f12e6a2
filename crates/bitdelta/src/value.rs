// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic value model.
//!
//! Every value the codec moves is a [`Value`]: primitives carry themselves,
//! compound values embed the `Arc` of their type descriptor so a value is
//! always self-describing. Equality is structural; for floats it is the
//! IEEE comparison, and for shared objects it is identity (two pointers to
//! the same session object compare equal).

use crate::registry::{self, ClassDescriptor};
use crate::script::ScriptValue;
use crate::shared::SharedObjectPointer;
use crate::streamer::{SimpleKind, StreamerKind, TypeStreamer};
use std::sync::Arc;

/// A dynamic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null variant; also what discarded unknown-type reads produce.
    Invalid,
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Record(RecordValue),
    List(SeqValue),
    Set(SetValue),
    Map(MapValue),
    VariantList(Vec<Value>),
    VariantMap(Vec<(String, Value)>),
    Script(Box<ScriptValue>),
    Object(Option<Box<PolyObject>>),
    Shared(Option<SharedObjectPointer>),
}

/// Enumeration value bound to its descriptor.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub streamer: Arc<TypeStreamer>,
    pub value: u32,
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.streamer.tag() == other.streamer.tag() && self.value == other.value
    }
}

/// Record value: one slot per field, in declaration order.
#[derive(Debug, Clone)]
pub struct RecordValue {
    pub streamer: Arc<TypeStreamer>,
    pub fields: Vec<Value>,
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.streamer.tag() == other.streamer.tag() && self.fields == other.fields
    }
}

/// Ordered homogeneous collection (lists).
#[derive(Debug, Clone)]
pub struct SeqValue {
    pub streamer: Arc<TypeStreamer>,
    pub elements: Vec<Value>,
}

impl PartialEq for SeqValue {
    fn eq(&self, other: &Self) -> bool {
        self.streamer.tag() == other.streamer.tag() && self.elements == other.elements
    }
}

/// Unordered homogeneous collection (sets). Stored as a vector; equality
/// ignores order.
#[derive(Debug, Clone)]
pub struct SetValue {
    pub streamer: Arc<TypeStreamer>,
    pub elements: Vec<Value>,
}

impl SetValue {
    pub fn contains(&self, value: &Value) -> bool {
        self.elements.iter().any(|e| e == value)
    }

    /// Insert if absent; returns whether the element was added.
    pub fn insert(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            false
        } else {
            self.elements.push(value);
            true
        }
    }

    /// Remove if present; returns whether the element was removed.
    pub fn remove(&mut self, value: &Value) -> bool {
        match self.elements.iter().position(|e| e == value) {
            Some(index) => {
                self.elements.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for SetValue {
    fn eq(&self, other: &Self) -> bool {
        self.streamer.tag() == other.streamer.tag()
            && self.elements.len() == other.elements.len()
            && self.elements.iter().all(|e| other.contains(e))
    }
}

/// Keyed collection. Stored as an entry vector; equality ignores order.
#[derive(Debug, Clone)]
pub struct MapValue {
    pub streamer: Arc<TypeStreamer>,
    pub entries: Vec<(Value, Value)>,
}

impl MapValue {
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace by key.
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove by key; returns whether an entry was removed.
    pub fn remove(&mut self, key: &Value) -> bool {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        self.streamer.tag() == other.streamer.tag()
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Value {
    /// Build a record value over `streamer`, in field declaration order.
    pub fn record(streamer: &Arc<TypeStreamer>, fields: Vec<Value>) -> Self {
        Value::Record(RecordValue {
            streamer: streamer.clone(),
            fields,
        })
    }

    pub fn enumerator(streamer: &Arc<TypeStreamer>, value: u32) -> Self {
        Value::Enum(EnumValue {
            streamer: streamer.clone(),
            value,
        })
    }

    pub fn list(streamer: &Arc<TypeStreamer>, elements: Vec<Value>) -> Self {
        Value::List(SeqValue {
            streamer: streamer.clone(),
            elements,
        })
    }

    pub fn set(streamer: &Arc<TypeStreamer>, elements: Vec<Value>) -> Self {
        Value::Set(SetValue {
            streamer: streamer.clone(),
            elements,
        })
    }

    pub fn map(streamer: &Arc<TypeStreamer>, entries: Vec<(Value, Value)>) -> Self {
        Value::Map(MapValue {
            streamer: streamer.clone(),
            entries,
        })
    }

    pub fn script(value: ScriptValue) -> Self {
        Value::Script(Box::new(value))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&SeqValue> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetValue> {
        match self {
            Value::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&ScriptValue> {
        match self {
            Value::Script(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_shared(&self) -> Option<&SharedObjectPointer> {
        match self {
            Value::Shared(Some(v)) => Some(v),
            _ => None,
        }
    }

    /// Descriptor this value travels under, when it has one. `Invalid` has
    /// none (it is the null variant); plain polymorphic objects travel only
    /// inside script values or shared-object pointers, never as variants.
    pub fn streamer(&self) -> Option<Arc<TypeStreamer>> {
        match self {
            Value::Invalid | Value::Object(_) => None,
            Value::Bool(_) => Some(registry::simple(SimpleKind::Bool)),
            Value::I32(_) => Some(registry::simple(SimpleKind::I32)),
            Value::U32(_) => Some(registry::simple(SimpleKind::U32)),
            Value::I64(_) => Some(registry::simple(SimpleKind::I64)),
            Value::F32(_) => Some(registry::simple(SimpleKind::F32)),
            Value::F64(_) => Some(registry::simple(SimpleKind::F64)),
            Value::String(_) => Some(registry::simple(SimpleKind::String)),
            Value::Bytes(_) => Some(registry::simple(SimpleKind::Bytes)),
            Value::VariantList(_) => Some(registry::simple(SimpleKind::VariantList)),
            Value::VariantMap(_) => Some(registry::simple(SimpleKind::VariantMap)),
            Value::Script(_) => Some(registry::simple(SimpleKind::Script)),
            Value::Shared(_) => Some(registry::simple(SimpleKind::SharedObject)),
            Value::Enum(v) => Some(v.streamer.clone()),
            Value::Record(v) => Some(v.streamer.clone()),
            Value::List(v) => Some(v.streamer.clone()),
            Value::Set(v) => Some(v.streamer.clone()),
            Value::Map(v) => Some(v.streamer.clone()),
        }
    }

    /// Default value of a type: zeroes, empties, enum value 0, recursive
    /// defaults for records.
    pub fn default_for(streamer: &Arc<TypeStreamer>) -> Value {
        match streamer.kind() {
            StreamerKind::Simple(kind) => match kind {
                SimpleKind::Bool => Value::Bool(false),
                SimpleKind::I32 => Value::I32(0),
                SimpleKind::U32 => Value::U32(0),
                SimpleKind::I64 => Value::I64(0),
                SimpleKind::F32 => Value::F32(0.0),
                SimpleKind::F64 => Value::F64(0.0),
                SimpleKind::String => Value::String(String::new()),
                SimpleKind::Bytes => Value::Bytes(Vec::new()),
                SimpleKind::VariantList => Value::VariantList(Vec::new()),
                SimpleKind::VariantMap => Value::VariantMap(Vec::new()),
                SimpleKind::Script => Value::Script(Box::new(ScriptValue::Invalid)),
                SimpleKind::SharedObject => Value::Shared(None),
            },
            StreamerKind::Enum(_) => Value::Enum(EnumValue {
                streamer: streamer.clone(),
                value: 0,
            }),
            StreamerKind::Record(fields) => Value::Record(RecordValue {
                streamer: streamer.clone(),
                fields: fields
                    .iter()
                    .map(|f| Value::default_for(f.streamer()))
                    .collect(),
            }),
            StreamerKind::List(_) => Value::List(SeqValue {
                streamer: streamer.clone(),
                elements: Vec::new(),
            }),
            StreamerKind::Set(_) => Value::Set(SetValue {
                streamer: streamer.clone(),
                elements: Vec::new(),
            }),
            StreamerKind::Map(_, _) => Value::Map(MapValue {
                streamer: streamer.clone(),
                entries: Vec::new(),
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ScriptValue> for Value {
    fn from(v: ScriptValue) -> Self {
        Value::Script(Box::new(v))
    }
}

/// A dynamic polymorphic object: a class descriptor plus one value per
/// registered property.
#[derive(Debug, Clone)]
pub struct PolyObject {
    class: Arc<ClassDescriptor>,
    properties: Vec<Value>,
}

impl PolyObject {
    /// Instance with default-valued properties.
    pub fn new(class: &Arc<ClassDescriptor>) -> Self {
        let properties = class
            .properties()
            .iter()
            .map(|p| Value::default_for(p.streamer()))
            .collect();
        Self {
            class: class.clone(),
            properties,
        }
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn properties(&self) -> &[Value] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.class
            .property_index(name)
            .and_then(|i| self.properties.get(i))
    }

    pub fn set_property(&mut self, name: &str, value: Value) -> bool {
        match self.class.property_index(name) {
            Some(index) => {
                self.properties[index] = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn property_at(&self, index: usize) -> Option<&Value> {
        self.properties.get(index)
    }

    pub(crate) fn set_property_at(&mut self, index: usize, value: Value) {
        if index < self.properties.len() {
            self.properties[index] = value;
        }
    }
}

impl PartialEq for PolyObject {
    fn eq(&self, other: &Self) -> bool {
        self.class.name() == other.class.name() && self.properties == other.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::TypeTag;

    fn int_streamer() -> Arc<TypeStreamer> {
        Arc::new(TypeStreamer::new(
            "int",
            TypeTag(900),
            StreamerKind::Simple(SimpleKind::I32),
        ))
    }

    #[test]
    fn test_primitive_accessors() {
        let v = Value::from(42i32);
        assert_eq!(v.as_i32(), Some(42));
        assert_eq!(v.as_u32(), None);

        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert!(!v.is_invalid());
        assert!(Value::Invalid.is_invalid());
    }

    #[test]
    fn test_set_semantics() {
        let streamer = Arc::new(TypeStreamer::new(
            "Set<int>",
            TypeTag(901),
            StreamerKind::Set(int_streamer()),
        ));
        let a = Value::set(&streamer, vec![1i32.into(), 2i32.into()]);
        let b = Value::set(&streamer, vec![2i32.into(), 1i32.into()]);
        assert_eq!(a, b);

        let mut set = match Value::set(&streamer, vec![1i32.into()]) {
            Value::Set(s) => s,
            _ => unreachable!(),
        };
        assert!(set.insert(2i32.into()));
        assert!(!set.insert(2i32.into()));
        assert!(set.remove(&1i32.into()));
        assert!(!set.remove(&1i32.into()));
    }

    #[test]
    fn test_map_semantics() {
        let streamer = Arc::new(TypeStreamer::new(
            "Map<int,int>",
            TypeTag(902),
            StreamerKind::Map(int_streamer(), int_streamer()),
        ));
        let mut map = match Value::map(&streamer, vec![(1i32.into(), 10i32.into())]) {
            Value::Map(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(map.get(&1i32.into()), Some(&Value::I32(10)));
        map.insert(1i32.into(), 11i32.into());
        assert_eq!(map.get(&1i32.into()), Some(&Value::I32(11)));
        assert!(map.remove(&1i32.into()));
        assert!(map.get(&1i32.into()).is_none());
    }

    #[test]
    fn test_default_for_record() {
        let point = Arc::new(TypeStreamer::new(
            "Point",
            TypeTag(903),
            StreamerKind::Record(vec![
                crate::streamer::Field::new("x", int_streamer()),
                crate::streamer::Field::new("y", int_streamer()),
            ]),
        ));
        let v = Value::default_for(&point);
        let record = v.as_record().expect("record default");
        assert_eq!(record.fields, vec![Value::I32(0), Value::I32(0)]);
    }
}
