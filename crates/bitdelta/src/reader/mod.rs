// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema shims constructed while decoding.
//!
//! A [`TypeReader`] describes the *peer's* view of a type. When the peer's
//! schema matches the local registration exactly the reader is a thin
//! wrapper over the local [`TypeStreamer`]; otherwise it records how to
//! adapt the peer's layout: enum value remapping, field reordering, and
//! consume-and-discard for fields with no local counterpart. The decoding
//! logic itself lives on [`crate::stream::Decoder`], which walks these
//! shims.

use crate::registry::ClassDescriptor;
use crate::streamer::TypeStreamer;
use std::collections::HashMap;
use std::sync::Arc;

/// The peer's view of one type.
#[derive(Debug, Clone)]
pub struct TypeReader {
    name: String,
    streamer: Option<Arc<TypeStreamer>>,
    spec: ReaderSpec,
}

/// How the peer's layout maps onto the local type.
#[derive(Debug, Clone)]
pub enum ReaderSpec {
    /// Peer and local schemas agree; decode with the local streamer.
    Exact,
    /// Enum with diverging values: the peer's bit width and a
    /// peer-value → local-value map (empty under Hash metadata mismatch).
    Enum {
        bits: u32,
        mappings: HashMap<u32, u32>,
    },
    /// Record with remapped fields, in the peer's order.
    Record { fields: Vec<FieldReader> },
    /// List with an adapted element reader.
    List { element: Box<TypeReader> },
    /// Set with an adapted element reader.
    Set { element: Box<TypeReader> },
    /// Map with adapted key and value readers.
    Map {
        key: Box<TypeReader>,
        value: Box<TypeReader>,
    },
}

impl TypeReader {
    /// The null reader (empty name): reads nothing, yields `Invalid`.
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            streamer: None,
            spec: ReaderSpec::Exact,
        }
    }

    pub fn exact(name: impl Into<String>, streamer: Option<Arc<TypeStreamer>>) -> Self {
        Self {
            name: name.into(),
            streamer,
            spec: ReaderSpec::Exact,
        }
    }

    pub(crate) fn shim(
        name: impl Into<String>,
        streamer: Option<Arc<TypeStreamer>>,
        spec: ReaderSpec,
    ) -> Self {
        Self {
            name: name.into(),
            streamer,
            spec,
        }
    }

    /// Wire name of the peer's type; empty for the null reader.
    pub fn type_name(&self) -> &str {
        &self.name
    }

    /// The local streamer, when one was resolved.
    pub fn streamer(&self) -> Option<&Arc<TypeStreamer>> {
        self.streamer.as_ref()
    }

    pub fn spec(&self) -> &ReaderSpec {
        &self.spec
    }

    pub fn is_exact_match(&self) -> bool {
        matches!(self.spec, ReaderSpec::Exact) && self.streamer.is_some()
    }

    /// True when this reader decodes exactly as `streamer` would.
    pub fn matches_exactly(&self, streamer: &Arc<TypeStreamer>) -> bool {
        matches!(self.spec, ReaderSpec::Exact)
            && self
                .streamer
                .as_ref()
                .is_some_and(|s| s.tag() == streamer.tag())
    }
}

/// One peer field of a record shim: the adapted reader plus the local field
/// index, or `None` when the field has no local counterpart (its value is
/// read to consume the correct bit count, then discarded).
#[derive(Debug, Clone)]
pub struct FieldReader {
    reader: TypeReader,
    index: Option<usize>,
}

impl FieldReader {
    pub fn new(reader: TypeReader, index: Option<usize>) -> Self {
        Self { reader, index }
    }

    pub fn reader(&self) -> &TypeReader {
        &self.reader
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// The peer's view of a polymorphic class.
#[derive(Debug, Clone)]
pub struct ObjectReader {
    class_name: String,
    class: Option<Arc<ClassDescriptor>>,
    properties: Vec<PropertyReader>,
}

impl ObjectReader {
    /// The null reader (empty class name).
    pub fn empty() -> Self {
        Self {
            class_name: String::new(),
            class: None,
            properties: Vec::new(),
        }
    }

    /// Reader that decodes with the local class layout verbatim.
    pub fn exact(class: &Arc<ClassDescriptor>) -> Self {
        let properties = class
            .properties()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                PropertyReader::new(
                    TypeReader::exact(p.streamer().name(), Some(p.streamer().clone())),
                    Some(i),
                )
            })
            .collect();
        Self {
            class_name: class.name().to_string(),
            class: Some(class.clone()),
            properties,
        }
    }

    pub(crate) fn shim(
        class_name: impl Into<String>,
        class: Option<Arc<ClassDescriptor>>,
        properties: Vec<PropertyReader>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            class,
            properties,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn class(&self) -> Option<&Arc<ClassDescriptor>> {
        self.class.as_ref()
    }

    pub fn properties(&self) -> &[PropertyReader] {
        &self.properties
    }

    pub fn is_null(&self) -> bool {
        self.class_name.is_empty()
    }
}

/// One peer property: adapted reader plus local property index.
#[derive(Debug, Clone)]
pub struct PropertyReader {
    reader: TypeReader,
    index: Option<usize>,
}

impl PropertyReader {
    pub fn new(reader: TypeReader, index: Option<usize>) -> Self {
        Self { reader, index }
    }

    pub fn reader(&self) -> &TypeReader {
        &self.reader
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    #[test]
    fn test_empty_reader() {
        let reader = TypeReader::empty();
        assert_eq!(reader.type_name(), "");
        assert!(!reader.is_exact_match());
    }

    #[test]
    fn test_matches_exactly() {
        let int = registry::i32_streamer();
        let float = registry::f32_streamer();
        let reader = TypeReader::exact("int", Some(int.clone()));
        assert!(reader.matches_exactly(&int));
        assert!(!reader.matches_exactly(&float));

        let shim = TypeReader::shim(
            "int",
            Some(int.clone()),
            ReaderSpec::Enum {
                bits: 2,
                mappings: HashMap::new(),
            },
        );
        assert!(!shim.matches_exactly(&int));
    }

    #[test]
    fn test_exact_object_reader() {
        let class = registry::register_class(
            "reader_test::Sprite",
            vec![
                ("x".into(), registry::i32_streamer()),
                ("y".into(), registry::i32_streamer()),
            ],
        );
        let reader = ObjectReader::exact(&class);
        assert_eq!(reader.class_name(), "reader_test::Sprite");
        assert_eq!(reader.properties().len(), 2);
        assert_eq!(reader.properties()[1].index(), Some(1));
        assert!(reader.properties()[0].reader().is_exact_match());
    }
}
