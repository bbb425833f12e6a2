// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read half of the facade.
//!
//! The decoder constructs schema shims for peer-described types and keeps
//! making best-effort forward progress on mismatches: unknown names are
//! parsed via their schema records and discarded, unknown fields are
//! consumed and dropped, and unmapped enum values decode to zero. Only a
//! truncated stream or malformed schema record is a hard error.

use super::{GenericsMode, MetadataType, ReadMappings};
use crate::bitio::BitReader;
use crate::error::{CodecError, CodecResult};
use crate::intern::{ReadTable, ReadToken};
use crate::reader::{FieldReader, ObjectReader, PropertyReader, ReaderSpec, TypeReader};
use crate::registry::{self, Attribute, ClassDescriptor};
use crate::schema::SchemaHash;
use crate::script::{ScriptRegExp, ScriptValue, SCRIPT_VALUE_BITS};
use crate::shared::{SharedObject, SharedObjectPointer};
use crate::streamer::{
    bits_for_highest_value, EnumSpec, ReaderType, SimpleKind, StreamerKind, TypeStreamer,
};
use crate::value::{EnumValue, MapValue, PolyObject, RecordValue, SeqValue, SetValue, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Deserializes values from fed bytes.
///
/// One decoder serves one connection; feed it each delivered unit with
/// [`feed`](Decoder::feed) and call [`reset`](Decoder::reset) at message
/// boundaries to discard flush padding.
pub struct Decoder {
    bits: BitReader,
    metadata: MetadataType,
    generics: GenericsMode,
    classes: ReadTable<ObjectReader>,
    types: ReadTable<TypeReader>,
    attributes: ReadTable<Arc<Attribute>>,
    script_strings: ReadTable<String>,
    shared_objects: ReadTable<Option<SharedObjectPointer>>,
    shared_references: HashMap<u32, Weak<SharedObject>>,
    weak_shared: HashMap<u32, Weak<SharedObject>>,
    type_substitutions: HashMap<String, Arc<TypeStreamer>>,
    class_substitutions: HashMap<String, Arc<ClassDescriptor>>,
}

impl Decoder {
    pub fn new(metadata: MetadataType, generics: GenericsMode) -> Self {
        Self {
            bits: BitReader::new(),
            metadata,
            generics,
            classes: ReadTable::new(),
            types: ReadTable::new(),
            attributes: ReadTable::new(),
            script_strings: ReadTable::new(),
            shared_objects: ReadTable::new(),
            shared_references: HashMap::new(),
            weak_shared: HashMap::new(),
            type_substitutions: HashMap::new(),
            class_substitutions: HashMap::new(),
        }
    }

    pub fn metadata(&self) -> MetadataType {
        self.metadata
    }

    /// Append incoming bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.bits.feed(bytes);
    }

    /// Discard the partial accumulator at a message boundary.
    pub fn reset(&mut self) {
        self.bits.reset();
    }

    /// Remap a peer type name to a locally chosen streamer before schema
    /// resolution.
    pub fn add_type_substitution(&mut self, name: &str, replacement: &Arc<TypeStreamer>) {
        self.type_substitutions
            .insert(name.to_string(), replacement.clone());
    }

    /// Remap a peer class name to a locally chosen class before schema
    /// resolution.
    pub fn add_class_substitution(&mut self, name: &str, replacement: &Arc<ClassDescriptor>) {
        self.class_substitutions
            .insert(name.to_string(), replacement.clone());
    }

    // Raw primitive surface.

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        self.bits.read_bool()
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        self.bits.read_i32()
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.bits.read_u32()
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        self.bits.read_i64()
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.bits.read_f32()
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        self.bits.read_f64()
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        self.bits.read_string()
    }

    pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        self.bits.read_byte_string()
    }

    fn read_len(&mut self) -> CodecResult<usize> {
        let len = self.bits.read_i32()?;
        if len < 0 {
            return Err(CodecError::InvalidData {
                reason: format!("negative count {}", len),
            });
        }
        Ok(len as usize)
    }

    /// Read a value preceded by its interned type descriptor.
    pub fn read(&mut self) -> CodecResult<Value> {
        let reader = self.read_type_descriptor()?;
        if reader.type_name().is_empty() {
            return Ok(Value::Invalid);
        }
        self.read_with(&reader)
    }

    /// Variant-level delta: changed flag, then descriptor and raw delta.
    pub fn read_delta(&mut self, reference: &Value) -> CodecResult<Value> {
        if !self.bits.read_bool()? {
            return Ok(reference.clone());
        }
        self.read_raw_delta(reference)
    }

    /// Descriptor reference plus raw delta, with no changed flag.
    pub fn read_raw_delta(&mut self, reference: &Value) -> CodecResult<Value> {
        let reader = self.read_type_descriptor()?;
        if reader.type_name().is_empty() {
            return Ok(Value::Invalid);
        }
        self.read_raw_delta_with(&reader, reference)
    }

    /// Decode a payload under a known local descriptor.
    pub fn read_typed(&mut self, streamer: &Arc<TypeStreamer>) -> CodecResult<Value> {
        match streamer.kind() {
            StreamerKind::Simple(kind) => self.read_simple(*kind),
            StreamerKind::Enum(spec) => {
                let value = self.bits.read_u32_bits(spec.bits())?;
                Ok(Value::Enum(EnumValue {
                    streamer: streamer.clone(),
                    value,
                }))
            }
            StreamerKind::Record(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(self.read_typed(field.streamer())?);
                }
                Ok(Value::Record(RecordValue {
                    streamer: streamer.clone(),
                    fields: values,
                }))
            }
            StreamerKind::List(child) => {
                let size = self.read_len()?;
                let mut elements = Vec::new();
                for _ in 0..size {
                    elements.push(self.read_typed(child)?);
                }
                Ok(Value::List(SeqValue {
                    streamer: streamer.clone(),
                    elements,
                }))
            }
            StreamerKind::Set(child) => {
                let size = self.read_len()?;
                let mut elements = Vec::new();
                for _ in 0..size {
                    elements.push(self.read_typed(child)?);
                }
                Ok(Value::Set(SetValue {
                    streamer: streamer.clone(),
                    elements,
                }))
            }
            StreamerKind::Map(key, value) => {
                let size = self.read_len()?;
                let mut entries = Vec::new();
                for _ in 0..size {
                    let entry_key = self.read_typed(key)?;
                    let entry_value = self.read_typed(value)?;
                    entries.push((entry_key, entry_value));
                }
                Ok(Value::Map(MapValue {
                    streamer: streamer.clone(),
                    entries,
                }))
            }
        }
    }

    fn read_simple(&mut self, kind: SimpleKind) -> CodecResult<Value> {
        Ok(match kind {
            SimpleKind::Bool => Value::Bool(self.bits.read_bool()?),
            SimpleKind::I32 => Value::I32(self.bits.read_i32()?),
            SimpleKind::U32 => Value::U32(self.bits.read_u32()?),
            SimpleKind::I64 => Value::I64(self.bits.read_i64()?),
            SimpleKind::F32 => Value::F32(self.bits.read_f32()?),
            SimpleKind::F64 => Value::F64(self.bits.read_f64()?),
            SimpleKind::String => Value::String(self.bits.read_string()?),
            SimpleKind::Bytes => Value::Bytes(self.bits.read_byte_string()?),
            SimpleKind::VariantList => {
                let size = self.read_len()?;
                let mut items = Vec::new();
                for _ in 0..size {
                    items.push(self.read()?);
                }
                Value::VariantList(items)
            }
            SimpleKind::VariantMap => {
                let size = self.read_len()?;
                let mut entries = Vec::new();
                for _ in 0..size {
                    let key = self.bits.read_string()?;
                    let value = self.read()?;
                    entries.push((key, value));
                }
                Value::VariantMap(entries)
            }
            SimpleKind::Script => Value::Script(Box::new(self.read_script()?)),
            SimpleKind::SharedObject => Value::Shared(self.read_shared()?),
        })
    }

    /// One-bit changed flag, then the raw delta.
    pub fn read_typed_delta(
        &mut self,
        streamer: &Arc<TypeStreamer>,
        reference: &Value,
    ) -> CodecResult<Value> {
        if !self.bits.read_bool()? {
            return Ok(reference.clone());
        }
        self.read_typed_raw_delta(streamer, reference)
    }

    /// Apply a raw delta against `reference` under a known local
    /// descriptor.
    pub fn read_typed_raw_delta(
        &mut self,
        streamer: &Arc<TypeStreamer>,
        reference: &Value,
    ) -> CodecResult<Value> {
        let invalid = Value::Invalid;
        match streamer.kind() {
            StreamerKind::Simple(kind) => match kind {
                SimpleKind::Script => {
                    let reference_script = match reference {
                        Value::Script(r) => r.as_ref().clone(),
                        _ => ScriptValue::Invalid,
                    };
                    Ok(Value::Script(Box::new(
                        self.read_script_raw_delta(&reference_script)?,
                    )))
                }
                SimpleKind::SharedObject => Ok(Value::Shared(self.read_shared()?)),
                _ => self.read_simple(*kind),
            },
            StreamerKind::Enum(spec) => {
                let value = self.bits.read_u32_bits(spec.bits())?;
                Ok(Value::Enum(EnumValue {
                    streamer: streamer.clone(),
                    value,
                }))
            }
            StreamerKind::Record(fields) => {
                let reference_record = match reference {
                    Value::Record(r) if r.streamer.tag() == streamer.tag() => Some(r),
                    _ => None,
                };
                let mut values = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    let field_reference = reference_record
                        .and_then(|r| r.fields.get(i))
                        .unwrap_or(&invalid);
                    values.push(self.read_typed_delta(field.streamer(), field_reference)?);
                }
                Ok(Value::Record(RecordValue {
                    streamer: streamer.clone(),
                    fields: values,
                }))
            }
            StreamerKind::List(child) => {
                let reference_elements: Vec<Value> = match reference {
                    Value::List(r) if r.streamer.tag() == streamer.tag() => r.elements.clone(),
                    _ => Vec::new(),
                };
                let size = self.read_len()?;
                let reference_size = self.read_len()?;
                let mut elements = Vec::new();
                for i in 0..size {
                    if i < reference_size {
                        let element_reference = reference_elements.get(i).unwrap_or(&invalid);
                        elements.push(self.read_typed_delta(child, element_reference)?);
                    } else {
                        elements.push(self.read_typed(child)?);
                    }
                }
                Ok(Value::List(SeqValue {
                    streamer: streamer.clone(),
                    elements,
                }))
            }
            StreamerKind::Set(child) => {
                let mut set = match reference {
                    Value::Set(r) if r.streamer.tag() == streamer.tag() => r.clone(),
                    _ => SetValue {
                        streamer: streamer.clone(),
                        elements: Vec::new(),
                    },
                };
                let toggled = self.read_len()?;
                for _ in 0..toggled {
                    let element = self.read_typed(child)?;
                    if !set.remove(&element) {
                        set.elements.push(element);
                    }
                }
                Ok(Value::Set(set))
            }
            StreamerKind::Map(key_streamer, value_streamer) => {
                let reference_map = match reference {
                    Value::Map(r) if r.streamer.tag() == streamer.tag() => Some(r),
                    _ => None,
                };
                let mut map = match reference_map {
                    Some(r) => r.clone(),
                    None => MapValue {
                        streamer: streamer.clone(),
                        entries: Vec::new(),
                    },
                };
                let added = self.read_len()?;
                for _ in 0..added {
                    let key = self.read_typed(key_streamer)?;
                    let value = self.read_typed(value_streamer)?;
                    map.insert(key, value);
                }
                let modified = self.read_len()?;
                for _ in 0..modified {
                    let key = self.read_typed(key_streamer)?;
                    let value_reference = reference_map
                        .and_then(|r| r.get(&key))
                        .cloned()
                        .unwrap_or(Value::Invalid);
                    let value = self.read_typed_delta(value_streamer, &value_reference)?;
                    map.insert(key, value);
                }
                let removed = self.read_len()?;
                for _ in 0..removed {
                    let key = self.read_typed(key_streamer)?;
                    map.remove(&key);
                }
                Ok(Value::Map(map))
            }
        }
    }

    /// Decode through a schema shim.
    pub fn read_with(&mut self, reader: &TypeReader) -> CodecResult<Value> {
        match reader.spec() {
            ReaderSpec::Exact => match reader.streamer() {
                Some(streamer) => {
                    let streamer = streamer.clone();
                    self.read_typed(&streamer)
                }
                None => Ok(Value::Invalid),
            },
            ReaderSpec::Enum { bits, mappings } => {
                let raw = self.bits.read_u32_bits(*bits)?;
                Ok(match enum_target(reader) {
                    Some((streamer, spec)) => Value::Enum(EnumValue {
                        value: map_enum_value(spec, raw, mappings),
                        streamer,
                    }),
                    None => Value::Invalid,
                })
            }
            ReaderSpec::Record { fields } => {
                match record_target(reader) {
                    Some(streamer) => {
                        let mut record = match Value::default_for(&streamer) {
                            Value::Record(r) => r,
                            _ => unreachable!("record streamer yields record default"),
                        };
                        for field in fields {
                            let value = self.read_with(field.reader())?;
                            if let Some(index) = field.index() {
                                if index < record.fields.len() {
                                    record.fields[index] = value;
                                }
                            }
                        }
                        Ok(Value::Record(record))
                    }
                    None => {
                        // Unknown type: consume every field, yield nothing.
                        for field in fields {
                            self.read_with(field.reader())?;
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
            ReaderSpec::List { element } => {
                let size = self.read_len()?;
                match seq_target(reader, ReaderType::List) {
                    Some(streamer) => {
                        let mut elements = Vec::new();
                        for _ in 0..size {
                            elements.push(self.read_with(element)?);
                        }
                        Ok(Value::List(SeqValue { streamer, elements }))
                    }
                    None => {
                        for _ in 0..size {
                            self.read_with(element)?;
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
            ReaderSpec::Set { element } => {
                let size = self.read_len()?;
                match seq_target(reader, ReaderType::Set) {
                    Some(streamer) => {
                        let mut elements = Vec::new();
                        for _ in 0..size {
                            elements.push(self.read_with(element)?);
                        }
                        Ok(Value::Set(SetValue { streamer, elements }))
                    }
                    None => {
                        for _ in 0..size {
                            self.read_with(element)?;
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
            ReaderSpec::Map { key, value } => {
                let size = self.read_len()?;
                match seq_target(reader, ReaderType::Map) {
                    Some(streamer) => {
                        let mut entries = Vec::new();
                        for _ in 0..size {
                            let entry_key = self.read_with(key)?;
                            let entry_value = self.read_with(value)?;
                            entries.push((entry_key, entry_value));
                        }
                        Ok(Value::Map(MapValue { streamer, entries }))
                    }
                    None => {
                        for _ in 0..size {
                            self.read_with(key)?;
                            self.read_with(value)?;
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
        }
    }

    /// Delta decode through a schema shim.
    pub fn read_delta_with(&mut self, reader: &TypeReader, reference: &Value) -> CodecResult<Value> {
        if !self.bits.read_bool()? {
            return Ok(reference.clone());
        }
        self.read_raw_delta_with(reader, reference)
    }

    /// Raw delta decode through a schema shim.
    pub fn read_raw_delta_with(
        &mut self,
        reader: &TypeReader,
        reference: &Value,
    ) -> CodecResult<Value> {
        let invalid = Value::Invalid;
        match reader.spec() {
            ReaderSpec::Exact => match reader.streamer() {
                Some(streamer) => {
                    let streamer = streamer.clone();
                    self.read_typed_raw_delta(&streamer, reference)
                }
                None => Ok(Value::Invalid),
            },
            ReaderSpec::Enum { bits, mappings } => {
                let raw = self.bits.read_u32_bits(*bits)?;
                Ok(match enum_target(reader) {
                    Some((streamer, spec)) => Value::Enum(EnumValue {
                        value: map_enum_value(spec, raw, mappings),
                        streamer,
                    }),
                    None => Value::Invalid,
                })
            }
            ReaderSpec::Record { fields } => match record_target(reader) {
                Some(streamer) => {
                    let mut record = match reference {
                        Value::Record(r) if r.streamer.tag() == streamer.tag() => r.clone(),
                        _ => match Value::default_for(&streamer) {
                            Value::Record(r) => r,
                            _ => unreachable!("record streamer yields record default"),
                        },
                    };
                    let reference_record = match reference {
                        Value::Record(r) if r.streamer.tag() == streamer.tag() => Some(r),
                        _ => None,
                    };
                    for field in fields {
                        match field.index() {
                            Some(index) => {
                                let field_reference = reference_record
                                    .and_then(|r| r.fields.get(index))
                                    .unwrap_or(&invalid);
                                let value = self.read_delta_with(field.reader(), field_reference)?;
                                if index < record.fields.len() {
                                    record.fields[index] = value;
                                }
                            }
                            None => {
                                self.read_delta_with(field.reader(), &invalid)?;
                            }
                        }
                    }
                    Ok(Value::Record(record))
                }
                None => {
                    for field in fields {
                        self.read_delta_with(field.reader(), &invalid)?;
                    }
                    Ok(Value::Invalid)
                }
            },
            ReaderSpec::List { element } => {
                let size = self.read_len()?;
                let reference_size = self.read_len()?;
                match seq_target(reader, ReaderType::List) {
                    Some(streamer) => {
                        let reference_elements: Vec<Value> = match reference {
                            Value::List(r) if r.streamer.tag() == streamer.tag() => {
                                r.elements.clone()
                            }
                            _ => Vec::new(),
                        };
                        let mut elements = Vec::new();
                        for i in 0..size {
                            if i < reference_size {
                                let element_reference =
                                    reference_elements.get(i).unwrap_or(&invalid);
                                elements.push(self.read_delta_with(element, element_reference)?);
                            } else {
                                elements.push(self.read_with(element)?);
                            }
                        }
                        Ok(Value::List(SeqValue { streamer, elements }))
                    }
                    None => {
                        for i in 0..size {
                            if i < reference_size {
                                self.read_delta_with(element, &invalid)?;
                            } else {
                                self.read_with(element)?;
                            }
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
            ReaderSpec::Set { element } => {
                let toggled = self.read_len()?;
                match seq_target(reader, ReaderType::Set) {
                    Some(streamer) => {
                        let mut set = match reference {
                            Value::Set(r) if r.streamer.tag() == streamer.tag() => r.clone(),
                            _ => SetValue {
                                streamer,
                                elements: Vec::new(),
                            },
                        };
                        for _ in 0..toggled {
                            let element = self.read_with(element)?;
                            if !set.remove(&element) {
                                set.elements.push(element);
                            }
                        }
                        Ok(Value::Set(set))
                    }
                    None => {
                        for _ in 0..toggled {
                            self.read_with(element)?;
                        }
                        Ok(Value::Invalid)
                    }
                }
            }
            ReaderSpec::Map { key, value } => match seq_target(reader, ReaderType::Map) {
                Some(streamer) => {
                    let reference_map = match reference {
                        Value::Map(r) if r.streamer.tag() == streamer.tag() => Some(r),
                        _ => None,
                    };
                    let mut map = match reference_map {
                        Some(r) => r.clone(),
                        None => MapValue {
                            streamer,
                            entries: Vec::new(),
                        },
                    };
                    let added = self.read_len()?;
                    for _ in 0..added {
                        let entry_key = self.read_with(key)?;
                        let entry_value = self.read_with(value)?;
                        map.insert(entry_key, entry_value);
                    }
                    let modified = self.read_len()?;
                    for _ in 0..modified {
                        let entry_key = self.read_with(key)?;
                        let value_reference = reference_map
                            .and_then(|r| r.get(&entry_key))
                            .cloned()
                            .unwrap_or(Value::Invalid);
                        let entry_value = self.read_delta_with(value, &value_reference)?;
                        map.insert(entry_key, entry_value);
                    }
                    let removed = self.read_len()?;
                    for _ in 0..removed {
                        let entry_key = self.read_with(key)?;
                        map.remove(&entry_key);
                    }
                    Ok(Value::Map(map))
                }
                None => {
                    let added = self.read_len()?;
                    for _ in 0..added {
                        self.read_with(key)?;
                        self.read_with(value)?;
                    }
                    let modified = self.read_len()?;
                    for _ in 0..modified {
                        self.read_with(key)?;
                        self.read_delta_with(value, &invalid)?;
                    }
                    let removed = self.read_len()?;
                    for _ in 0..removed {
                        self.read_with(key)?;
                    }
                    Ok(Value::Invalid)
                }
            },
        }
    }

    /// Read a polymorphic object: interned class descriptor, then
    /// properties.
    pub fn read_object(&mut self) -> CodecResult<Option<PolyObject>> {
        let reader = self.read_class_descriptor()?;
        self.read_object_with(&reader)
    }

    pub(crate) fn read_object_with(&mut self, reader: &ObjectReader) -> CodecResult<Option<PolyObject>> {
        if reader.is_null() {
            return Ok(None);
        }
        let mut object = reader.class().map(PolyObject::new);
        self.read_object_properties(reader, object.as_mut())?;
        Ok(object)
    }

    /// Read a per-property object delta against `reference`.
    pub fn read_object_raw_delta(
        &mut self,
        reference: Option<&PolyObject>,
    ) -> CodecResult<Option<PolyObject>> {
        let reader = self.read_class_descriptor()?;
        if reader.is_null() {
            return Ok(None);
        }
        let mut object = reader.class().map(PolyObject::new);
        self.read_object_properties_delta(&reader, reference, object.as_mut())?;
        Ok(object)
    }

    fn read_object_properties(
        &mut self,
        reader: &ObjectReader,
        mut target: Option<&mut PolyObject>,
    ) -> CodecResult<()> {
        for property in reader.properties() {
            let value = self.read_with(property.reader())?;
            if let (Some(target), Some(index)) = (target.as_deref_mut(), property.index()) {
                target.set_property_at(index, value);
            }
        }
        Ok(())
    }

    fn read_object_properties_delta(
        &mut self,
        reader: &ObjectReader,
        reference: Option<&PolyObject>,
        mut target: Option<&mut PolyObject>,
    ) -> CodecResult<()> {
        let same_class = reference.is_some_and(|r| r.class().name() == reader.class_name());
        let invalid = Value::Invalid;
        for property in reader.properties() {
            let property_reference = match (same_class, reference, property.index()) {
                (true, Some(r), Some(index)) => r.property_at(index).unwrap_or(&invalid),
                _ => &invalid,
            };
            let value = self.read_delta_with(property.reader(), property_reference)?;
            if let (Some(target), Some(index)) = (target.as_deref_mut(), property.index()) {
                target.set_property_at(index, value);
            }
        }
        Ok(())
    }

    /// Read an interned class reference and return the resolved local
    /// class, if any.
    pub fn read_class(&mut self) -> CodecResult<Option<Arc<ClassDescriptor>>> {
        let reader = self.read_class_descriptor()?;
        Ok(reader.class().cloned())
    }

    /// Read a shared object by identity, applying deltas against the known
    /// predecessor of its lineage.
    pub fn read_shared(&mut self) -> CodecResult<Option<SharedObjectPointer>> {
        match self.shared_objects.read_token(&mut self.bits)? {
            ReadToken::Null => Ok(None),
            ReadToken::Known(id) => self.shared_objects.get(id),
            ReadToken::New => {
                let id = self.shared_objects.reserve();
                let object = self.read_shared_body()?;
                self.shared_objects.fulfill(id, object.clone());
                Ok(object)
            }
        }
    }

    fn read_shared_body(&mut self) -> CodecResult<Option<SharedObjectPointer>> {
        let remote_id = self.bits.read_i32()? as u32;
        if remote_id == 0 {
            return Ok(None);
        }
        let remote_origin = self.bits.read_i32()? as u32;
        let reference = self
            .shared_references
            .get(&remote_origin)
            .and_then(Weak::upgrade);

        if let Some(existing) = self.weak_shared.get(&remote_id).and_then(Weak::upgrade) {
            // Second appearance of the same remote id within the current
            // mapping window: mutate the object in place.
            let reader = self.read_class_descriptor()?;
            let mut state = existing.state().clone();
            match &reference {
                Some(reference) => {
                    let reference_state = reference.state().clone();
                    self.read_object_properties_delta(
                        &reader,
                        Some(&reference_state),
                        Some(&mut state),
                    )?;
                }
                None => self.read_object_properties(&reader, Some(&mut state))?,
            }
            *existing.state() = state;
            return Ok(Some(existing));
        }

        let decoded = match &reference {
            Some(reference) => {
                let reference_state = reference.state().clone();
                self.read_object_raw_delta(Some(&reference_state))?
            }
            None => self.read_object()?,
        };
        match decoded {
            Some(state) => {
                let pointer = SharedObject::from_state(state);
                if let Some(reference) = &reference {
                    // Successor: continue the local lineage.
                    pointer.set_origin_id(reference.origin_id());
                }
                pointer.set_remote_id(remote_id);
                pointer.set_remote_origin_id(remote_origin);
                self.weak_shared.insert(remote_id, Arc::downgrade(&pointer));
                Ok(Some(pointer))
            }
            None => {
                crate::warn!("null shared object body for remote id {}", remote_id);
                Ok(None)
            }
        }
    }

    /// Read an interned script string; `None` is the invalid-string
    /// sentinel.
    pub fn read_script_string(&mut self) -> CodecResult<Option<String>> {
        match self.script_strings.read_token(&mut self.bits)? {
            ReadToken::Null => Ok(None),
            ReadToken::Known(id) => self.script_strings.get(id).map(Some),
            ReadToken::New => {
                let id = self.script_strings.reserve();
                let value = self.bits.read_string()?;
                self.script_strings.fulfill(id, value.clone());
                Ok(Some(value))
            }
        }
    }

    /// Read an interned attribute handle, registering unknown names.
    pub fn read_attribute(&mut self) -> CodecResult<Option<Arc<Attribute>>> {
        match self.attributes.read_token(&mut self.bits)? {
            ReadToken::Null => Ok(None),
            ReadToken::Known(id) => self.attributes.get(id).map(Some),
            ReadToken::New => {
                let id = self.attributes.reserve();
                let name = String::from_utf8(self.bits.read_byte_string()?)?;
                let attribute = registry::attribute(&name);
                self.attributes.fulfill(id, attribute.clone());
                Ok(Some(attribute))
            }
        }
    }

    /// Read a script value.
    pub fn read_script(&mut self) -> CodecResult<ScriptValue> {
        let kind = self.bits.read_u32_bits(SCRIPT_VALUE_BITS)?;
        Ok(match kind {
            1 => ScriptValue::Undefined,
            2 => ScriptValue::Null,
            3 => ScriptValue::Bool(self.bits.read_bool()?),
            4 => ScriptValue::Number(self.bits.read_f64()?),
            5 => ScriptValue::String(self.bits.read_string()?),
            6 => ScriptValue::Variant(self.read()?),
            7 => ScriptValue::Object(self.read_object()?.map(Box::new)),
            8 => ScriptValue::MetaObject(self.read_class()?),
            9 => ScriptValue::Date(self.bits.read_i64()?),
            10 => ScriptValue::RegExp(self.read_regexp()?),
            11 => {
                let size = self.read_len()?;
                let mut items = Vec::new();
                for _ in 0..size {
                    items.push(self.read_script()?);
                }
                ScriptValue::Array(items)
            }
            12 => {
                let mut properties = Vec::new();
                while let Some(name) = self.read_script_string()? {
                    let value = self.read_script()?;
                    properties.push((name, value));
                }
                ScriptValue::ObjectRecord(properties)
            }
            // Tag 0 and host-only constructs.
            _ => ScriptValue::Invalid,
        })
    }

    fn read_regexp(&mut self) -> CodecResult<ScriptRegExp> {
        Ok(ScriptRegExp {
            pattern: self.bits.read_string()?,
            case_sensitive: self.bits.read_bool()?,
            syntax: self.bits.read_u32_bits(3)? as u8,
            minimal: self.bits.read_bool()?,
        })
    }

    /// One-bit changed flag, then the script raw delta.
    pub fn read_script_delta(&mut self, reference: &ScriptValue) -> CodecResult<ScriptValue> {
        if !self.bits.read_bool()? {
            return Ok(reference.clone());
        }
        self.read_script_raw_delta(reference)
    }

    /// Script delta against a reference; mirrors the writer's kind
    /// dispatch.
    pub fn read_script_raw_delta(&mut self, reference: &ScriptValue) -> CodecResult<ScriptValue> {
        match reference {
            ScriptValue::Bool(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::Bool(self.bits.read_bool()?))
                }
            }
            ScriptValue::Number(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::Number(self.bits.read_f64()?))
                }
            }
            ScriptValue::String(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::String(self.bits.read_string()?))
                }
            }
            ScriptValue::Variant(reference_variant) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::Variant(self.read_raw_delta(reference_variant)?))
                }
            }
            ScriptValue::Object(reference_object) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::Object(
                        self.read_object_raw_delta(reference_object.as_deref())?
                            .map(Box::new),
                    ))
                }
            }
            ScriptValue::MetaObject(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::MetaObject(self.read_class()?))
                }
            }
            ScriptValue::Date(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::Date(self.bits.read_i64()?))
                }
            }
            ScriptValue::RegExp(_) => {
                if self.bits.read_bool()? {
                    self.read_script()
                } else {
                    Ok(ScriptValue::RegExp(self.read_regexp()?))
                }
            }
            ScriptValue::Array(reference_items) => {
                if self.bits.read_bool()? {
                    return self.read_script();
                }
                let size = self.read_len()?;
                let mut items = Vec::new();
                for i in 0..size {
                    match reference_items.get(i) {
                        Some(reference_item) => items.push(self.read_script_delta(reference_item)?),
                        None => items.push(self.read_script()?),
                    }
                }
                Ok(ScriptValue::Array(items))
            }
            ScriptValue::ObjectRecord(reference_properties) => {
                if self.bits.read_bool()? {
                    return self.read_script();
                }
                // Shallow-copy the reference, then apply named changes
                // until the invalid-string terminator.
                let mut properties = reference_properties.clone();
                let invalid = ScriptValue::Invalid;
                while let Some(name) = self.read_script_string()? {
                    let property_reference = reference_properties
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, v)| v)
                        .unwrap_or(&invalid);
                    let value = self.read_script_raw_delta(property_reference)?;
                    match properties.iter_mut().find(|(n, _)| *n == name) {
                        Some(entry) => entry.1 = value,
                        None => properties.push((name, value)),
                    }
                }
                Ok(ScriptValue::ObjectRecord(properties))
            }
            // Undefined, null, or invalid references: the value was written
            // whole.
            _ => self.read_script(),
        }
    }

    /// Read an interned type descriptor, constructing the schema shim on
    /// first use. Exposed for consumers that inspect peer schemas directly.
    pub fn read_type_descriptor(&mut self) -> CodecResult<TypeReader> {
        match self.types.read_token(&mut self.bits)? {
            ReadToken::Null => Ok(TypeReader::empty()),
            ReadToken::Known(id) => self.types.get(id),
            ReadToken::New => {
                let id = self.types.reserve();
                let reader = self.read_type_descriptor_body()?;
                self.types.fulfill(id, reader.clone());
                Ok(reader)
            }
        }
    }

    fn read_type_descriptor_body(&mut self) -> CodecResult<TypeReader> {
        let name_bytes = self.bits.read_byte_string()?;
        if name_bytes.is_empty() {
            return Ok(TypeReader::empty());
        }
        let name = String::from_utf8(name_bytes)?;
        let mut streamer = self
            .type_substitutions
            .get(&name)
            .cloned()
            .or_else(|| registry::streamer_for_name(&name));

        if self.metadata == MetadataType::None {
            if streamer.is_none() {
                crate::warn!("unknown type name: {}", name);
            }
            return Ok(TypeReader::exact(name, streamer));
        }

        let raw_type = self.bits.read_i32()?;
        let reader_type = ReaderType::from_i32(raw_type).ok_or_else(|| CodecError::InvalidData {
            reason: format!("unknown reader type {} for {}", raw_type, name),
        })?;
        if reader_type == ReaderType::Simple {
            if streamer.is_none() {
                crate::warn!("unknown type name: {}", name);
            }
            return Ok(TypeReader::exact(name, streamer));
        }
        if self.generics == GenericsMode::All {
            streamer = None;
        }

        match reader_type {
            ReaderType::Enum => self.read_enum_descriptor(name, streamer),
            ReaderType::List | ReaderType::Set => {
                let element = self.read_type_descriptor()?;
                let exact = streamer.as_ref().is_some_and(|s| {
                    s.reader_type() == reader_type
                        && s.value_streamer().is_some_and(|c| element.matches_exactly(c))
                });
                if exact {
                    Ok(TypeReader::exact(name, streamer))
                } else if reader_type == ReaderType::List {
                    Ok(TypeReader::shim(
                        name,
                        streamer,
                        ReaderSpec::List {
                            element: Box::new(element),
                        },
                    ))
                } else {
                    Ok(TypeReader::shim(
                        name,
                        streamer,
                        ReaderSpec::Set {
                            element: Box::new(element),
                        },
                    ))
                }
            }
            ReaderType::Map => {
                let key = self.read_type_descriptor()?;
                let value = self.read_type_descriptor()?;
                let exact = streamer.as_ref().is_some_and(|s| {
                    s.reader_type() == ReaderType::Map
                        && s.key_streamer().is_some_and(|k| key.matches_exactly(k))
                        && s.value_streamer().is_some_and(|v| value.matches_exactly(v))
                });
                if exact {
                    Ok(TypeReader::exact(name, streamer))
                } else {
                    Ok(TypeReader::shim(
                        name,
                        streamer,
                        ReaderSpec::Map {
                            key: Box::new(key),
                            value: Box::new(value),
                        },
                    ))
                }
            }
            ReaderType::Streamable => self.read_record_descriptor(name, streamer),
            ReaderType::Simple => unreachable!("handled above"),
        }
    }

    fn read_enum_descriptor(
        &mut self,
        name: String,
        streamer: Option<Arc<TypeStreamer>>,
    ) -> CodecResult<TypeReader> {
        if self.metadata == MetadataType::Full {
            let count = self.read_len()?;
            let mut entries = Vec::new();
            for _ in 0..count {
                let key = String::from_utf8(self.bits.read_byte_string()?)?;
                let value = self.bits.read_i32()? as u32;
                entries.push((key, value));
            }
            let local_spec = streamer.as_ref().and_then(|s| s.enum_spec());
            let mut mappings = HashMap::new();
            let mut matches = local_spec.is_some_and(|s| s.entries().len() == count);
            let mut highest = 0u32;
            for (key, value) in &entries {
                highest = highest.max(*value);
                let local_value = local_spec.and_then(|s| s.value_of(key));
                if let Some(local) = local_value {
                    mappings.insert(*value, local);
                }
                matches &= local_value == Some(*value);
            }
            if matches {
                Ok(TypeReader::exact(name, streamer))
            } else {
                Ok(TypeReader::shim(
                    name,
                    streamer,
                    ReaderSpec::Enum {
                        bits: bits_for_highest_value(highest),
                        mappings,
                    },
                ))
            }
        } else {
            let bits = self.bits.read_i32()?;
            if !(0..=32).contains(&bits) {
                return Err(CodecError::InvalidData {
                    reason: format!("enum bit width {} for {}", bits, name),
                });
            }
            let local_hash = match streamer.as_ref().and_then(|s| s.enum_spec()) {
                Some(spec) => SchemaHash::of_enum_entries(spec.entries()),
                None => SchemaHash::of_names(std::iter::empty::<&str>()),
            };
            let mut remote = [0u8; SchemaHash::SIZE];
            self.bits.read(&mut remote, SchemaHash::SIZE * 8, 0)?;
            if streamer.is_some() && local_hash.as_bytes() == &remote {
                Ok(TypeReader::exact(name, streamer))
            } else {
                // No names to remap under Hash metadata; unmapped values
                // decode to zero.
                Ok(TypeReader::shim(
                    name,
                    streamer,
                    ReaderSpec::Enum {
                        bits: bits as u32,
                        mappings: HashMap::new(),
                    },
                ))
            }
        }
    }

    fn read_record_descriptor(
        &mut self,
        name: String,
        streamer: Option<Arc<TypeStreamer>>,
    ) -> CodecResult<TypeReader> {
        let count = self.read_len()?;
        let mut fields = Vec::new();
        for _ in 0..count {
            let reader = self.read_type_descriptor()?;
            let mut index = None;
            if self.metadata == MetadataType::Full {
                let field_name = String::from_utf8(self.bits.read_byte_string()?)?;
                index = streamer.as_ref().and_then(|s| s.field_index(&field_name));
            }
            fields.push(FieldReader::new(reader, index));
        }

        if self.metadata == MetadataType::Hash {
            if count == 0 {
                // The writer emits no hash for an empty field list.
                let exact = streamer.as_ref().is_some_and(|s| {
                    s.reader_type() == ReaderType::Streamable && s.fields().is_empty()
                });
                return Ok(if exact {
                    TypeReader::exact(name, streamer)
                } else {
                    TypeReader::shim(name, streamer, ReaderSpec::Record { fields })
                });
            }
            // Names are not on the wire under Hash metadata; map fields
            // positionally wherever the structure lines up, so a renamed
            // field still decodes through its slot.
            if let Some(s) = streamer.as_ref() {
                let local_fields = s.fields();
                fields = fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, fr)| {
                        let index = (i < local_fields.len()
                            && fr.reader().matches_exactly(local_fields[i].streamer()))
                        .then_some(i);
                        FieldReader::new(fr.reader().clone(), index)
                    })
                    .collect();
            }
            let mut matches = false;
            let mut local_hash = SchemaHash::of_names(std::iter::empty::<&str>());
            if let Some(s) = streamer.as_ref() {
                let local_fields = s.fields();
                if local_fields.len() == count {
                    matches = local_fields
                        .iter()
                        .zip(&fields)
                        .all(|(lf, fr)| fr.reader().matches_exactly(lf.streamer()));
                    local_hash = SchemaHash::of_names(local_fields.iter().map(|f| f.name()));
                }
            }
            let mut remote = [0u8; SchemaHash::SIZE];
            self.bits.read(&mut remote, SchemaHash::SIZE * 8, 0)?;
            if streamer.is_some() && matches && local_hash.as_bytes() == &remote {
                return Ok(TypeReader::exact(name, streamer));
            }
            return Ok(TypeReader::shim(name, streamer, ReaderSpec::Record { fields }));
        }

        // Full metadata: when every field matches the local type in order,
        // the plain local streamer is the more efficient reader.
        if let Some(s) = streamer.as_ref() {
            let local_fields = s.fields();
            if s.reader_type() == ReaderType::Streamable
                && local_fields.len() == count
                && fields.iter().enumerate().all(|(i, fr)| {
                    fr.index() == Some(i) && fr.reader().matches_exactly(local_fields[i].streamer())
                })
            {
                return Ok(TypeReader::exact(name, streamer));
            }
        }
        Ok(TypeReader::shim(name, streamer, ReaderSpec::Record { fields }))
    }

    /// Read an interned class descriptor, constructing the object shim on
    /// first use.
    pub fn read_class_descriptor(&mut self) -> CodecResult<ObjectReader> {
        match self.classes.read_token(&mut self.bits)? {
            ReadToken::Null => Ok(ObjectReader::empty()),
            ReadToken::Known(id) => self.classes.get(id),
            ReadToken::New => {
                let id = self.classes.reserve();
                let reader = self.read_class_descriptor_body()?;
                self.classes.fulfill(id, reader.clone());
                Ok(reader)
            }
        }
    }

    fn read_class_descriptor_body(&mut self) -> CodecResult<ObjectReader> {
        let name_bytes = self.bits.read_byte_string()?;
        if name_bytes.is_empty() {
            return Ok(ObjectReader::empty());
        }
        let name = String::from_utf8(name_bytes)?;
        let class = self
            .class_substitutions
            .get(&name)
            .cloned()
            .or_else(|| registry::class_for_name(&name));
        if class.is_none() {
            crate::warn!("unknown class name: {}", name);
        }

        if self.metadata == MetadataType::None {
            return Ok(match &class {
                Some(class) => ObjectReader::exact(class),
                None => ObjectReader::shim(name, None, Vec::new()),
            });
        }

        let count = self.read_len()?;
        let mut properties = Vec::new();
        for _ in 0..count {
            let reader = self.read_type_descriptor()?;
            let mut index = None;
            if self.metadata == MetadataType::Full {
                let property_name = String::from_utf8(self.bits.read_byte_string()?)?;
                index = class.as_ref().and_then(|c| c.property_index(&property_name));
            }
            properties.push(PropertyReader::new(reader, index));
        }

        if self.metadata == MetadataType::Hash {
            // Positional property mapping, as for record fields.
            if let Some(c) = &class {
                let local_properties = c.properties();
                properties = properties
                    .into_iter()
                    .enumerate()
                    .map(|(i, pr)| {
                        let index = (i < local_properties.len()
                            && pr.reader().matches_exactly(local_properties[i].streamer()))
                        .then_some(i);
                        PropertyReader::new(pr.reader().clone(), index)
                    })
                    .collect();
            }
            let mut matches = false;
            let mut local_hash = SchemaHash::of_names(std::iter::empty::<&str>());
            if let Some(c) = &class {
                if c.properties().len() == count {
                    matches = c
                        .properties()
                        .iter()
                        .zip(&properties)
                        .all(|(p, pr)| pr.reader().matches_exactly(p.streamer()));
                    local_hash = SchemaHash::of_names(c.properties().iter().map(|p| p.name()));
                }
            }
            let mut remote = [0u8; SchemaHash::SIZE];
            self.bits.read(&mut remote, SchemaHash::SIZE * 8, 0)?;
            if let Some(c) = &class {
                if matches && local_hash.as_bytes() == &remote {
                    return Ok(ObjectReader::exact(c));
                }
            }
        }
        Ok(ObjectReader::shim(name, class, properties))
    }

    /// Drain the interning additions made since the last reset.
    pub fn get_and_reset_read_mappings(&mut self) -> ReadMappings {
        ReadMappings {
            classes: self.classes.get_and_reset_transient(),
            types: self.types.get_and_reset_transient(),
            attributes: self.attributes.get_and_reset_transient(),
            script_strings: self.script_strings.get_and_reset_transient(),
            shared_objects: self.shared_objects.get_and_reset_transient(),
        }
    }

    /// Commit drained mappings and update shared-object lineage references.
    pub fn persist_read_mappings(&mut self, mappings: ReadMappings) {
        self.classes.persist_transient(mappings.classes);
        self.types.persist_transient(mappings.types);
        self.attributes.persist_transient(mappings.attributes);
        self.script_strings.persist_transient(mappings.script_strings);
        let shared = mappings.shared_objects;
        self.shared_objects.persist_transient(shared.clone());

        for object in shared.values().flatten() {
            let origin = object.remote_origin_id();
            if let Some(existing) = self.shared_references.get(&origin).and_then(Weak::upgrade) {
                if existing.id() != object.id() {
                    let existing_id = existing.id();
                    self.shared_objects
                        .remove_persistent_values(|v| {
                            v.as_ref().is_some_and(|o| o.id() == existing_id)
                        });
                }
            }
            self.shared_references.insert(origin, Arc::downgrade(object));
            self.weak_shared.remove(&object.remote_id());
        }
    }

    pub fn persist_and_reset_read_mappings(&mut self) {
        let mappings = self.get_and_reset_read_mappings();
        self.persist_read_mappings(mappings);
    }

    /// Drop the mapping for a shared object the peer reports destroyed.
    pub fn clear_shared_object(&mut self, id: u32) {
        if let Some(Some(object)) = self.shared_objects.take_persistent_value(id) {
            self.weak_shared.remove(&object.remote_id());
            self.shared_references.remove(&object.remote_origin_id());
        }
    }
}

fn map_enum_value(spec: &EnumSpec, raw: u32, mappings: &HashMap<u32, u32>) -> u32 {
    if spec.is_flags() {
        let mut combined = 0;
        for (peer_bit, local) in mappings {
            if raw & peer_bit != 0 {
                combined |= local;
            }
        }
        combined
    } else {
        mappings.get(&raw).copied().unwrap_or(0)
    }
}

fn enum_target(reader: &TypeReader) -> Option<(Arc<TypeStreamer>, &EnumSpec)> {
    let streamer = reader.streamer()?;
    let spec = streamer.enum_spec()?;
    Some((streamer.clone(), spec))
}

fn record_target(reader: &TypeReader) -> Option<Arc<TypeStreamer>> {
    let streamer = reader.streamer()?;
    if streamer.reader_type() == ReaderType::Streamable {
        Some(streamer.clone())
    } else {
        None
    }
}

fn seq_target(reader: &TypeReader, reader_type: ReaderType) -> Option<Arc<TypeStreamer>> {
    let streamer = reader.streamer()?;
    if streamer.reader_type() == reader_type {
        Some(streamer.clone())
    } else {
        None
    }
}
