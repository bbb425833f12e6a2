// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide type, class, and attribute registries.
//!
//! The registry is initialized lazily on first access and is append-only:
//! perform all registration during startup, then any number of encoders and
//! decoders may look types up concurrently. Registration is idempotent by
//! name; re-registering a name returns the original descriptor.

use crate::streamer::{EnumSpec, Field, SimpleKind, StreamerKind, TypeStreamer, TypeTag};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A stored property of a registered class.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    streamer: Arc<TypeStreamer>,
}

impl Property {
    pub fn new(name: impl Into<String>, streamer: Arc<TypeStreamer>) -> Self {
        Self {
            name: name.into(),
            streamer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn streamer(&self) -> &Arc<TypeStreamer> {
        &self.streamer
    }
}

/// Descriptor of a polymorphic class: the name it travels under plus its
/// ordered stored properties. This is the codec's view of the host's
/// property introspection system.
#[derive(Debug)]
pub struct ClassDescriptor {
    name: String,
    properties: Vec<Property>,
}

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name() == name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// An attribute handle. The attribute system itself is an external
/// collaborator; the codec only interns handles by name.
#[derive(Debug, PartialEq, Eq)]
pub struct Attribute {
    name: String,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct RegistryInner {
    by_tag: HashMap<TypeTag, Arc<TypeStreamer>>,
    by_name: HashMap<String, Arc<TypeStreamer>>,
    enums_by_name: HashMap<String, Arc<TypeStreamer>>,
    simple_by_kind: HashMap<SimpleKind, Arc<TypeStreamer>>,
    classes: HashMap<String, Arc<ClassDescriptor>>,
    attributes: HashMap<String, Arc<Attribute>>,
    next_tag: u32,
}

impl RegistryInner {
    fn with_builtins() -> Self {
        let mut inner = Self {
            by_tag: HashMap::new(),
            by_name: HashMap::new(),
            enums_by_name: HashMap::new(),
            simple_by_kind: HashMap::new(),
            classes: HashMap::new(),
            attributes: HashMap::new(),
            next_tag: 1,
        };
        for (name, kind) in [
            ("bool", SimpleKind::Bool),
            ("int", SimpleKind::I32),
            ("uint", SimpleKind::U32),
            ("int64", SimpleKind::I64),
            ("float", SimpleKind::F32),
            ("double", SimpleKind::F64),
            ("string", SimpleKind::String),
            ("bytes", SimpleKind::Bytes),
            ("variantList", SimpleKind::VariantList),
            ("variantMap", SimpleKind::VariantMap),
            ("scriptValue", SimpleKind::Script),
            ("sharedObject", SimpleKind::SharedObject),
        ] {
            let streamer = inner.insert(name, StreamerKind::Simple(kind));
            inner.simple_by_kind.insert(kind, streamer);
        }
        inner
    }

    fn insert(&mut self, name: &str, kind: StreamerKind) -> Arc<TypeStreamer> {
        let tag = TypeTag(self.next_tag);
        self.next_tag += 1;
        let is_enum = matches!(kind, StreamerKind::Enum(_));
        let streamer = Arc::new(TypeStreamer::new(name, tag, kind));
        self.by_tag.insert(tag, streamer.clone());
        if is_enum {
            self.enums_by_name.insert(name.to_string(), streamer.clone());
        } else {
            self.by_name.insert(name.to_string(), streamer.clone());
        }
        streamer
    }

    fn existing(&self, name: &str) -> Option<Arc<TypeStreamer>> {
        self.by_name
            .get(name)
            .or_else(|| self.enums_by_name.get(name))
            .cloned()
    }
}

static REGISTRY: OnceLock<RwLock<RegistryInner>> = OnceLock::new();

fn registry() -> &'static RwLock<RegistryInner> {
    REGISTRY.get_or_init(|| RwLock::new(RegistryInner::with_builtins()))
}

fn register(name: &str, kind: impl FnOnce() -> StreamerKind) -> Arc<TypeStreamer> {
    let mut inner = registry().write();
    if let Some(existing) = inner.existing(name) {
        return existing;
    }
    inner.insert(name, kind())
}

/// Register a record (streamable) type with named fields.
pub fn register_record_streamer(
    name: &str,
    fields: Vec<(String, Arc<TypeStreamer>)>,
) -> Arc<TypeStreamer> {
    register(name, || {
        StreamerKind::Record(
            fields
                .into_iter()
                .map(|(n, s)| Field::new(n, s))
                .collect(),
        )
    })
}

/// Register an enumeration with named values.
pub fn register_enum_streamer(name: &str, entries: Vec<(String, u32)>) -> Arc<TypeStreamer> {
    register(name, || StreamerKind::Enum(EnumSpec::new(entries, false)))
}

/// Register a flag enumeration; values combine bitwise and schema shims
/// remap them bit by bit.
pub fn register_flags_streamer(name: &str, entries: Vec<(String, u32)>) -> Arc<TypeStreamer> {
    register(name, || StreamerKind::Enum(EnumSpec::new(entries, true)))
}

/// Register a homogeneous list type.
pub fn register_list_streamer(name: &str, element: Arc<TypeStreamer>) -> Arc<TypeStreamer> {
    register(name, || StreamerKind::List(element))
}

/// Register a homogeneous set type.
pub fn register_set_streamer(name: &str, element: Arc<TypeStreamer>) -> Arc<TypeStreamer> {
    register(name, || StreamerKind::Set(element))
}

/// Register a keyed map type.
pub fn register_map_streamer(
    name: &str,
    key: Arc<TypeStreamer>,
    value: Arc<TypeStreamer>,
) -> Arc<TypeStreamer> {
    register(name, || StreamerKind::Map(key, value))
}

/// Look a streamer up by wire name (regular types first, then enums).
pub fn streamer_for_name(name: &str) -> Option<Arc<TypeStreamer>> {
    registry().read().existing(name)
}

pub fn streamer_for_tag(tag: TypeTag) -> Option<Arc<TypeStreamer>> {
    registry().read().by_tag.get(&tag).cloned()
}

/// Register a polymorphic class with its ordered stored properties.
pub fn register_class(
    name: &str,
    properties: Vec<(String, Arc<TypeStreamer>)>,
) -> Arc<ClassDescriptor> {
    let mut inner = registry().write();
    if let Some(existing) = inner.classes.get(name) {
        return existing.clone();
    }
    let class = Arc::new(ClassDescriptor {
        name: name.to_string(),
        properties: properties
            .into_iter()
            .map(|(n, s)| Property::new(n, s))
            .collect(),
    });
    inner.classes.insert(name.to_string(), class.clone());
    class
}

pub fn class_for_name(name: &str) -> Option<Arc<ClassDescriptor>> {
    registry().read().classes.get(name).cloned()
}

/// Look an attribute handle up by name, registering it on first use.
pub fn attribute(name: &str) -> Arc<Attribute> {
    let mut inner = registry().write();
    if let Some(existing) = inner.attributes.get(name) {
        return existing.clone();
    }
    let attribute = Arc::new(Attribute {
        name: name.to_string(),
    });
    inner.attributes.insert(name.to_string(), attribute.clone());
    attribute
}

pub(crate) fn simple(kind: SimpleKind) -> Arc<TypeStreamer> {
    registry()
        .read()
        .simple_by_kind
        .get(&kind)
        .cloned()
        .expect("built-in streamer present")
}

pub fn bool_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::Bool)
}

pub fn i32_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::I32)
}

pub fn u32_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::U32)
}

pub fn i64_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::I64)
}

pub fn f32_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::F32)
}

pub fn f64_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::F64)
}

pub fn string_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::String)
}

pub fn bytes_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::Bytes)
}

pub fn variant_list_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::VariantList)
}

pub fn variant_map_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::VariantMap)
}

pub fn script_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::Script)
}

pub fn shared_object_streamer() -> Arc<TypeStreamer> {
    simple(SimpleKind::SharedObject)
}
