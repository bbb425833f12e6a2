// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors driving the codec.
//!
//! A [`TypeStreamer`] is pure data: the name a type travels under on the
//! wire, a process-local tag, and the structural kind the encoder and
//! decoder dispatch on. Descriptors for compound types hold `Arc`s to their
//! child descriptors, so a registered type graph is shared, immutable, and
//! cheap to clone.

use std::sync::Arc;

/// Opaque process-local identifier for a registered type.
///
/// Tags are never transmitted; only names and structural descriptors go on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub(crate) u32);

/// Structural category carried in Hash/Full schema metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReaderType {
    Simple = 0,
    Enum = 1,
    Streamable = 2,
    List = 3,
    Set = 4,
    Map = 5,
}

impl ReaderType {
    pub(crate) fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Simple),
            1 => Some(Self::Enum),
            2 => Some(Self::Streamable),
            3 => Some(Self::List),
            4 => Some(Self::Set),
            5 => Some(Self::Map),
            _ => None,
        }
    }
}

/// Built-in value kinds with fixed wire layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleKind {
    Bool,
    I32,
    U32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    /// Untyped list: each element travels through the full variant path.
    VariantList,
    /// Untyped string-keyed map of variants.
    VariantMap,
    /// Weakly-typed script value.
    Script,
    /// Identity-preserving shared object pointer.
    SharedObject,
}

/// Enumeration schema: named entries, the bit width of the highest value,
/// and whether values combine bitwise (flag enums).
#[derive(Debug, Clone)]
pub struct EnumSpec {
    entries: Vec<(String, u32)>,
    bits: u32,
    flags: bool,
}

impl EnumSpec {
    pub fn new(entries: Vec<(String, u32)>, flags: bool) -> Self {
        let highest = entries.iter().map(|(_, v)| *v).max().unwrap_or(0);
        Self {
            entries,
            bits: bits_for_highest_value(highest),
            flags,
        }
    }

    /// Bit width sufficient for the highest declared value.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn is_flags(&self) -> bool {
        self.flags
    }

    pub fn entries(&self) -> &[(String, u32)] {
        &self.entries
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

/// Named field of a record type.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    streamer: Arc<TypeStreamer>,
}

impl Field {
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

/// Structural kind of a type.
#[derive(Debug, Clone)]
pub enum StreamerKind {
    Simple(SimpleKind),
    Enum(EnumSpec),
    Record(Vec<Field>),
    List(Arc<TypeStreamer>),
    Set(Arc<TypeStreamer>),
    Map(Arc<TypeStreamer>, Arc<TypeStreamer>),
}

/// A registered type descriptor.
#[derive(Debug, Clone)]
pub struct TypeStreamer {
    name: String,
    tag: TypeTag,
    kind: StreamerKind,
}

impl TypeStreamer {
    pub(crate) fn new(name: impl Into<String>, tag: TypeTag, kind: StreamerKind) -> Self {
        Self {
            name: name.into(),
            tag,
            kind,
        }
    }

    /// Wire name of the type.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn kind(&self) -> &StreamerKind {
        &self.kind
    }

    pub fn reader_type(&self) -> ReaderType {
        match &self.kind {
            StreamerKind::Simple(_) => ReaderType::Simple,
            StreamerKind::Enum(_) => ReaderType::Enum,
            StreamerKind::Record(_) => ReaderType::Streamable,
            StreamerKind::List(_) => ReaderType::List,
            StreamerKind::Set(_) => ReaderType::Set,
            StreamerKind::Map(_, _) => ReaderType::Map,
        }
    }

    /// Record fields; empty for non-record kinds.
    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            StreamerKind::Record(fields) => fields,
            _ => &[],
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name() == name)
    }

    pub fn enum_spec(&self) -> Option<&EnumSpec> {
        match &self.kind {
            StreamerKind::Enum(spec) => Some(spec),
            _ => None,
        }
    }

    /// Element descriptor of a list or set, or the value descriptor of a
    /// map.
    pub fn value_streamer(&self) -> Option<&Arc<TypeStreamer>> {
        match &self.kind {
            StreamerKind::List(child) | StreamerKind::Set(child) => Some(child),
            StreamerKind::Map(_, value) => Some(value),
            _ => None,
        }
    }

    /// Key descriptor of a map.
    pub fn key_streamer(&self) -> Option<&Arc<TypeStreamer>> {
        match &self.kind {
            StreamerKind::Map(key, _) => Some(key),
            _ => None,
        }
    }
}

/// Number of bits needed to represent `value` (position of the highest set
/// bit).
pub(crate) fn bits_for_highest_value(mut value: u32) -> u32 {
    let mut bits = 0;
    while value != 0 {
        bits += 1;
        value >>= 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_for_highest_value() {
        assert_eq!(bits_for_highest_value(0), 0);
        assert_eq!(bits_for_highest_value(1), 1);
        assert_eq!(bits_for_highest_value(2), 2);
        assert_eq!(bits_for_highest_value(3), 2);
        assert_eq!(bits_for_highest_value(4), 3);
        assert_eq!(bits_for_highest_value(7), 3);
        assert_eq!(bits_for_highest_value(8), 4);
    }

    #[test]
    fn test_enum_spec_bits() {
        let spec = EnumSpec::new(
            vec![("A".into(), 0), ("B".into(), 1), ("C".into(), 2)],
            false,
        );
        assert_eq!(spec.bits(), 2);
        assert_eq!(spec.value_of("C"), Some(2));
        assert_eq!(spec.name_of(1), Some("B"));
        assert_eq!(spec.value_of("D"), None);
    }

    #[test]
    fn test_reader_type_roundtrip() {
        for rt in [
            ReaderType::Simple,
            ReaderType::Enum,
            ReaderType::Streamable,
            ReaderType::List,
            ReaderType::Set,
            ReaderType::Map,
        ] {
            assert_eq!(ReaderType::from_i32(rt as i32), Some(rt));
        }
        assert_eq!(ReaderType::from_i32(6), None);
        assert_eq!(ReaderType::from_i32(-1), None);
    }

    #[test]
    fn test_field_lookup() {
        let tag = TypeTag(1);
        let child = Arc::new(TypeStreamer::new(
            "int",
            tag,
            StreamerKind::Simple(SimpleKind::I32),
        ));
        let record = TypeStreamer::new(
            "Point",
            TypeTag(2),
            StreamerKind::Record(vec![
                Field::new("x", child.clone()),
                Field::new("y", child.clone()),
            ]),
        );
        assert_eq!(record.field_index("y"), Some(1));
        assert_eq!(record.field_index("z"), None);
        assert_eq!(record.reader_type(), ReaderType::Streamable);
    }
}
