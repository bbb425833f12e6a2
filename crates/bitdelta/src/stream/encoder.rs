// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write half of the facade.

use super::{MetadataType, WriteMappings};
use crate::bitio::BitWriter;
use crate::error::{CodecError, CodecResult};
use crate::intern::WriteTable;
use crate::registry::{Attribute, ClassDescriptor};
use crate::schema::SchemaHash;
use crate::script::{ScriptValue, SCRIPT_VALUE_BITS};
use crate::shared::{SharedKey, SharedObject, SharedObjectPointer};
use crate::streamer::{SimpleKind, StreamerKind, TypeStreamer, TypeTag};
use crate::value::{PolyObject, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Serializes values into a bit-packed byte buffer.
///
/// One encoder serves one connection: its interning tables and
/// shared-object references accumulate across messages. Call
/// [`flush`](Encoder::flush) to byte-align between messages and
/// [`take_bytes`](Encoder::take_bytes) to drain the output.
pub struct Encoder {
    bits: BitWriter,
    metadata: MetadataType,
    classes: WriteTable<String>,
    types: WriteTable<TypeTag>,
    attributes: WriteTable<String>,
    script_strings: WriteTable<String>,
    shared_objects: WriteTable<SharedKey>,
    shared_references: HashMap<u32, Weak<SharedObject>>,
}

impl Encoder {
    pub fn new(metadata: MetadataType) -> Self {
        Self {
            bits: BitWriter::new(),
            metadata,
            classes: WriteTable::new(),
            types: WriteTable::new(),
            attributes: WriteTable::new(),
            script_strings: WriteTable::new(),
            shared_objects: WriteTable::new(),
            shared_references: HashMap::new(),
        }
    }

    pub fn metadata(&self) -> MetadataType {
        self.metadata
    }

    // Raw primitive surface, for application framing around typed payloads.

    pub fn write_bool(&mut self, value: bool) {
        self.bits.write_bool(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bits.write_i32(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bits.write_u32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.bits.write_i64(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bits.write_f32(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bits.write_f64(value);
    }

    pub fn write_string(&mut self, value: &str) {
        self.bits.write_string(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.bits.write_bytes(value);
    }

    /// Byte-align the output. Required between messages.
    pub fn flush(&mut self) {
        self.bits.flush();
    }

    /// Flush and drain the encoded bytes.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.bits.take_bytes()
    }

    /// Write a value preceded by its interned type descriptor.
    pub fn write(&mut self, value: &Value) -> CodecResult<()> {
        match value.streamer() {
            Some(streamer) => {
                self.write_streamer_ref(&streamer)?;
                self.write_typed(&streamer, value)
            }
            None => {
                if !value.is_invalid() {
                    crate::warn!("non-streamable value: {:?}", value);
                }
                self.types.write_null(&mut self.bits);
                Ok(())
            }
        }
    }

    /// Write a value's payload under a known type descriptor (no descriptor
    /// reference is emitted).
    pub fn write_typed(&mut self, streamer: &Arc<TypeStreamer>, value: &Value) -> CodecResult<()> {
        match (streamer.kind(), value) {
            (StreamerKind::Simple(kind), _) => self.write_simple(*kind, value),
            (StreamerKind::Enum(spec), Value::Enum(v)) => {
                self.bits.write_u32_bits(v.value, spec.bits());
                Ok(())
            }
            (StreamerKind::Record(fields), Value::Record(v)) => {
                if v.fields.len() != fields.len() {
                    return Err(CodecError::TypeMismatch {
                        expected: format!("{} fields of {}", fields.len(), streamer.name()),
                        found: format!("{} fields", v.fields.len()),
                    });
                }
                for (field, field_value) in fields.iter().zip(&v.fields) {
                    self.write_typed(field.streamer(), field_value)?;
                }
                Ok(())
            }
            (StreamerKind::List(child), Value::List(v)) => {
                self.bits.write_i32(v.elements.len() as i32);
                for element in &v.elements {
                    self.write_typed(child, element)?;
                }
                Ok(())
            }
            (StreamerKind::Set(child), Value::Set(v)) => {
                self.bits.write_i32(v.elements.len() as i32);
                for element in &v.elements {
                    self.write_typed(child, element)?;
                }
                Ok(())
            }
            (StreamerKind::Map(key, value_streamer), Value::Map(v)) => {
                self.bits.write_i32(v.entries.len() as i32);
                for (entry_key, entry_value) in &v.entries {
                    self.write_typed(key, entry_key)?;
                    self.write_typed(value_streamer, entry_value)?;
                }
                Ok(())
            }
            _ => Err(type_mismatch(streamer, value)),
        }
    }

    fn write_simple(&mut self, kind: SimpleKind, value: &Value) -> CodecResult<()> {
        match (kind, value) {
            (SimpleKind::Bool, Value::Bool(v)) => self.bits.write_bool(*v),
            (SimpleKind::I32, Value::I32(v)) => self.bits.write_i32(*v),
            (SimpleKind::U32, Value::U32(v)) => self.bits.write_u32(*v),
            (SimpleKind::I64, Value::I64(v)) => self.bits.write_i64(*v),
            (SimpleKind::F32, Value::F32(v)) => self.bits.write_f32(*v),
            (SimpleKind::F64, Value::F64(v)) => self.bits.write_f64(*v),
            (SimpleKind::String, Value::String(v)) => self.bits.write_string(v),
            (SimpleKind::Bytes, Value::Bytes(v)) => self.bits.write_bytes(v),
            (SimpleKind::VariantList, Value::VariantList(items)) => {
                self.bits.write_i32(items.len() as i32);
                for item in items {
                    self.write(item)?;
                }
            }
            (SimpleKind::VariantMap, Value::VariantMap(entries)) => {
                self.bits.write_i32(entries.len() as i32);
                for (key, entry_value) in entries {
                    self.bits.write_string(key);
                    self.write(entry_value)?;
                }
            }
            (SimpleKind::Script, Value::Script(v)) => self.write_script(v)?,
            (SimpleKind::SharedObject, Value::Shared(v)) => self.write_shared(v.as_ref())?,
            (_, _) => {
                return Err(CodecError::TypeMismatch {
                    expected: format!("{:?}", kind),
                    found: format!("{:?}", value),
                })
            }
        }
        Ok(())
    }

    /// One-bit changed flag, then the raw delta when the values differ.
    pub fn write_typed_delta(
        &mut self,
        streamer: &Arc<TypeStreamer>,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        if value == reference {
            self.bits.write_bool(false);
            return Ok(());
        }
        self.bits.write_bool(true);
        self.write_typed_raw_delta(streamer, value, reference)
    }

    /// Delta payload without the changed flag.
    pub fn write_typed_raw_delta(
        &mut self,
        streamer: &Arc<TypeStreamer>,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        let invalid = Value::Invalid;
        match streamer.kind() {
            StreamerKind::Simple(kind) => match (kind, value) {
                (SimpleKind::Script, Value::Script(v)) => {
                    let reference_script = match reference {
                        Value::Script(r) => r.as_ref().clone(),
                        _ => ScriptValue::Invalid,
                    };
                    self.write_script_raw_delta(v, &reference_script)
                }
                (SimpleKind::SharedObject, Value::Shared(v)) => self.write_shared(v.as_ref()),
                _ => self.write_simple(*kind, value),
            },
            StreamerKind::Enum(spec) => {
                let v = value.as_enum().ok_or_else(|| type_mismatch(streamer, value))?;
                self.bits.write_u32_bits(v.value, spec.bits());
                Ok(())
            }
            StreamerKind::Record(fields) => {
                let v = value.as_record().ok_or_else(|| type_mismatch(streamer, value))?;
                let reference_record = match reference {
                    Value::Record(r) if r.streamer.tag() == streamer.tag() => Some(r),
                    _ => None,
                };
                for (i, field) in fields.iter().enumerate() {
                    let field_value = v.fields.get(i).unwrap_or(&invalid);
                    let field_reference = reference_record
                        .and_then(|r| r.fields.get(i))
                        .unwrap_or(&invalid);
                    self.write_typed_delta(field.streamer(), field_value, field_reference)?;
                }
                Ok(())
            }
            StreamerKind::List(child) => {
                let v = value.as_list().ok_or_else(|| type_mismatch(streamer, value))?;
                let reference_elements: &[Value] = match reference {
                    Value::List(r) if r.streamer.tag() == streamer.tag() => &r.elements,
                    _ => &[],
                };
                self.bits.write_i32(v.elements.len() as i32);
                self.bits.write_i32(reference_elements.len() as i32);
                for (i, element) in v.elements.iter().enumerate() {
                    match reference_elements.get(i) {
                        Some(reference_element) => {
                            self.write_typed_delta(child, element, reference_element)?
                        }
                        None => self.write_typed(child, element)?,
                    }
                }
                Ok(())
            }
            StreamerKind::Set(child) => {
                let v = value.as_set().ok_or_else(|| type_mismatch(streamer, value))?;
                let reference_elements: &[Value] = match reference {
                    Value::Set(r) if r.streamer.tag() == streamer.tag() => &r.elements,
                    _ => &[],
                };
                // Symmetric difference: removals first, then additions. The
                // reader toggles membership, so only the count matters.
                let removed: Vec<&Value> = reference_elements
                    .iter()
                    .filter(|e| !slice_contains(&v.elements, e))
                    .collect();
                let added: Vec<&Value> = v
                    .elements
                    .iter()
                    .filter(|e| !slice_contains(reference_elements, e))
                    .collect();
                self.bits.write_i32((removed.len() + added.len()) as i32);
                for element in removed.into_iter().chain(added) {
                    self.write_typed(child, element)?;
                }
                Ok(())
            }
            StreamerKind::Map(key_streamer, value_streamer) => {
                let v = value.as_map().ok_or_else(|| type_mismatch(streamer, value))?;
                let empty = Vec::new();
                let reference_entries: &Vec<(Value, Value)> = match reference {
                    Value::Map(r) if r.streamer.tag() == streamer.tag() => &r.entries,
                    _ => &empty,
                };
                let added: Vec<&(Value, Value)> = v
                    .entries
                    .iter()
                    .filter(|(k, _)| entries_get(reference_entries, k).is_none())
                    .collect();
                let modified: Vec<(&Value, &Value, &Value)> = v
                    .entries
                    .iter()
                    .filter_map(|(k, val)| {
                        entries_get(reference_entries, k)
                            .filter(|r| *r != val)
                            .map(|r| (k, val, r))
                    })
                    .collect();
                let removed: Vec<&Value> = reference_entries
                    .iter()
                    .filter(|(k, _)| entries_get(&v.entries, k).is_none())
                    .map(|(k, _)| k)
                    .collect();

                self.bits.write_i32(added.len() as i32);
                for (k, val) in added {
                    self.write_typed(key_streamer, k)?;
                    self.write_typed(value_streamer, val)?;
                }
                self.bits.write_i32(modified.len() as i32);
                for (k, val, reference_value) in modified {
                    self.write_typed(key_streamer, k)?;
                    self.write_typed_delta(value_streamer, val, reference_value)?;
                }
                self.bits.write_i32(removed.len() as i32);
                for k in removed {
                    self.write_typed(key_streamer, k)?;
                }
                Ok(())
            }
        }
    }

    /// Variant-level delta: changed flag, then descriptor reference and raw
    /// delta.
    pub fn write_delta(&mut self, value: &Value, reference: &Value) -> CodecResult<()> {
        if value == reference {
            self.bits.write_bool(false);
            return Ok(());
        }
        self.bits.write_bool(true);
        self.write_raw_delta(value, reference)
    }

    /// Descriptor reference plus raw delta, with no equality gate.
    pub fn write_raw_delta(&mut self, value: &Value, reference: &Value) -> CodecResult<()> {
        match value.streamer() {
            Some(streamer) => {
                self.write_streamer_ref(&streamer)?;
                self.write_typed_raw_delta(&streamer, value, reference)
            }
            None => {
                if !value.is_invalid() {
                    crate::warn!("non-streamable value: {:?}", value);
                }
                self.types.write_null(&mut self.bits);
                Ok(())
            }
        }
    }

    /// Write a polymorphic object: interned class descriptor, then each
    /// stored property in declaration order.
    pub fn write_object(&mut self, object: Option<&PolyObject>) -> CodecResult<()> {
        match object {
            None => {
                self.classes.write_null(&mut self.bits);
                Ok(())
            }
            Some(object) => {
                self.write_class_ref(object.class().clone())?;
                let class = object.class().clone();
                for (i, property) in class.properties().iter().enumerate() {
                    let value = object.property_at(i).ok_or_else(|| CodecError::TypeMismatch {
                        expected: format!("property {} of {}", property.name(), class.name()),
                        found: "missing slot".into(),
                    })?;
                    self.write_typed(property.streamer(), value)?;
                }
                Ok(())
            }
        }
    }

    /// Per-property delta form of a polymorphic object. When the reference
    /// is a different class, every property deltas against `Invalid` and
    /// the payload degrades to full field values.
    pub fn write_object_raw_delta(
        &mut self,
        value: Option<&PolyObject>,
        reference: Option<&PolyObject>,
    ) -> CodecResult<()> {
        let object = match value {
            None => {
                self.classes.write_null(&mut self.bits);
                return Ok(());
            }
            Some(object) => object,
        };
        self.write_class_ref(object.class().clone())?;
        let class = object.class().clone();
        let same_class = reference.is_some_and(|r| r.class().name() == class.name());
        let invalid = Value::Invalid;
        for (i, property) in class.properties().iter().enumerate() {
            let value = object.property_at(i).unwrap_or(&invalid);
            let reference_value = match (same_class, reference) {
                (true, Some(r)) => r.property_at(i).unwrap_or(&invalid),
                _ => &invalid,
            };
            self.write_typed_delta(property.streamer(), value, reference_value)?;
        }
        Ok(())
    }

    /// Write an interned class reference.
    pub fn write_class(&mut self, class: Option<&Arc<ClassDescriptor>>) -> CodecResult<()> {
        match class {
            None => {
                self.classes.write_null(&mut self.bits);
                Ok(())
            }
            Some(class) => self.write_class_ref(class.clone()),
        }
    }

    /// Write a shared object by identity. A fresh object carries its full
    /// form; when a predecessor with the same origin is known to both
    /// sides, the body is a delta against it.
    pub fn write_shared(&mut self, object: Option<&SharedObjectPointer>) -> CodecResult<()> {
        match object {
            None => {
                self.shared_objects.write_null(&mut self.bits);
                Ok(())
            }
            Some(pointer) => {
                if self
                    .shared_objects
                    .write(&mut self.bits, &SharedKey(pointer.clone()))
                {
                    self.write_shared_body(pointer)?;
                }
                Ok(())
            }
        }
    }

    fn write_shared_body(&mut self, object: &SharedObjectPointer) -> CodecResult<()> {
        self.bits.write_i32(object.id() as i32);
        self.bits.write_i32(object.origin_id() as i32);
        let state = object.state().clone();
        let reference = self
            .shared_references
            .get(&object.origin_id())
            .and_then(Weak::upgrade);
        match reference {
            Some(reference) => {
                let reference_state = reference.state().clone();
                self.write_object_raw_delta(Some(&state), Some(&reference_state))
            }
            None => self.write_object(Some(&state)),
        }
    }

    /// Write an interned script string; `None` is the invalid-string
    /// sentinel that terminates object-record property lists.
    pub fn write_script_string(&mut self, value: Option<&str>) {
        match value {
            None => self.script_strings.write_null(&mut self.bits),
            Some(value) => {
                if self.script_strings.write(&mut self.bits, &value.to_string()) {
                    self.bits.write_string(value);
                }
            }
        }
    }

    /// Write an interned attribute handle.
    pub fn write_attribute(&mut self, attribute: Option<&Arc<Attribute>>) {
        match attribute {
            None => self.attributes.write_null(&mut self.bits),
            Some(attribute) => {
                if self
                    .attributes
                    .write(&mut self.bits, &attribute.name().to_string())
                {
                    self.bits.write_bytes(attribute.name().as_bytes());
                }
            }
        }
    }

    /// Write a script value: 4-bit kind tag, then the kind payload.
    pub fn write_script(&mut self, value: &ScriptValue) -> CodecResult<()> {
        self.bits
            .write_u32_bits(value.kind() as u32, SCRIPT_VALUE_BITS);
        match value {
            ScriptValue::Invalid | ScriptValue::Undefined | ScriptValue::Null => Ok(()),
            ScriptValue::Bool(v) => {
                self.bits.write_bool(*v);
                Ok(())
            }
            ScriptValue::Number(v) => {
                self.bits.write_f64(*v);
                Ok(())
            }
            ScriptValue::String(v) => {
                self.bits.write_string(v);
                Ok(())
            }
            ScriptValue::Variant(v) => self.write(v),
            ScriptValue::Object(v) => self.write_object(v.as_deref()),
            ScriptValue::MetaObject(v) => self.write_class(v.as_ref()),
            ScriptValue::Date(ms) => {
                self.bits.write_i64(*ms);
                Ok(())
            }
            ScriptValue::RegExp(v) => {
                self.write_regexp(v);
                Ok(())
            }
            ScriptValue::Array(items) => {
                self.bits.write_i32(items.len() as i32);
                for item in items {
                    self.write_script(item)?;
                }
                Ok(())
            }
            ScriptValue::ObjectRecord(properties) => {
                for (name, property) in properties {
                    self.write_script_string(Some(name));
                    self.write_script(property)?;
                }
                self.write_script_string(None);
                Ok(())
            }
        }
    }

    fn write_regexp(&mut self, value: &crate::script::ScriptRegExp) {
        self.bits.write_string(&value.pattern);
        self.bits.write_bool(value.case_sensitive);
        self.bits.write_u32_bits(value.syntax as u32 & 0x7, 3);
        self.bits.write_bool(value.minimal);
    }

    /// One-bit changed flag, then the script raw delta.
    pub fn write_script_delta(
        &mut self,
        value: &ScriptValue,
        reference: &ScriptValue,
    ) -> CodecResult<()> {
        if value == reference {
            self.bits.write_bool(false);
            return Ok(());
        }
        self.bits.write_bool(true);
        self.write_script_raw_delta(value, reference)
    }

    /// Script delta against a reference. For value-bearing reference kinds
    /// a type-changed bit precedes either the whole value (kind changed) or
    /// the kind-specific delta; undefined/null/invalid references get the
    /// value in full form.
    pub fn write_script_raw_delta(
        &mut self,
        value: &ScriptValue,
        reference: &ScriptValue,
    ) -> CodecResult<()> {
        match reference {
            ScriptValue::Bool(_) => match value {
                ScriptValue::Bool(v) => {
                    self.bits.write_bool(false);
                    self.bits.write_bool(*v);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::Number(_) => match value {
                ScriptValue::Number(v) => {
                    self.bits.write_bool(false);
                    self.bits.write_f64(*v);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::String(_) => match value {
                ScriptValue::String(v) => {
                    self.bits.write_bool(false);
                    self.bits.write_string(v);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::Variant(reference_variant) => match value {
                ScriptValue::Variant(v) => {
                    self.bits.write_bool(false);
                    self.write_raw_delta(v, reference_variant)
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::Object(reference_object) => match value {
                ScriptValue::Object(v) => {
                    self.bits.write_bool(false);
                    self.write_object_raw_delta(v.as_deref(), reference_object.as_deref())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::MetaObject(_) => match value {
                ScriptValue::MetaObject(v) => {
                    self.bits.write_bool(false);
                    self.write_class(v.as_ref())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::Date(_) => match value {
                ScriptValue::Date(ms) => {
                    self.bits.write_bool(false);
                    self.bits.write_i64(*ms);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::RegExp(_) => match value {
                ScriptValue::RegExp(v) => {
                    self.bits.write_bool(false);
                    self.write_regexp(v);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::Array(reference_items) => match value {
                ScriptValue::Array(items) => {
                    self.bits.write_bool(false);
                    self.bits.write_i32(items.len() as i32);
                    for (i, item) in items.iter().enumerate() {
                        match reference_items.get(i) {
                            Some(reference_item) => self.write_script_delta(item, reference_item)?,
                            None => self.write_script(item)?,
                        }
                    }
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            ScriptValue::ObjectRecord(reference_properties) => match value {
                ScriptValue::ObjectRecord(properties) => {
                    self.bits.write_bool(false);
                    let invalid = ScriptValue::Invalid;
                    for (name, property) in properties {
                        let reference_property = record_get(reference_properties, name);
                        if reference_property != Some(property) {
                            self.write_script_string(Some(name));
                            self.write_script_raw_delta(
                                property,
                                reference_property.unwrap_or(&invalid),
                            )?;
                        }
                    }
                    for (name, reference_property) in reference_properties {
                        if record_get(properties, name).is_none() {
                            self.write_script_string(Some(name));
                            self.write_script_raw_delta(&invalid, reference_property)?;
                        }
                    }
                    self.write_script_string(None);
                    Ok(())
                }
                _ => self.script_type_changed(value),
            },
            // Undefined, null, or invalid references carry no reusable
            // state; write the value whole.
            _ => self.write_script(value),
        }
    }

    fn script_type_changed(&mut self, value: &ScriptValue) -> CodecResult<()> {
        self.bits.write_bool(true);
        self.write_script(value)
    }

    /// Write an interned type-descriptor reference, materializing the full
    /// schema record on first use.
    pub fn write_streamer_ref(&mut self, streamer: &Arc<TypeStreamer>) -> CodecResult<()> {
        if self.types.write(&mut self.bits, &streamer.tag()) {
            self.write_streamer_body(streamer)?;
        }
        Ok(())
    }

    fn write_class_ref(&mut self, class: Arc<ClassDescriptor>) -> CodecResult<()> {
        if self.classes.write(&mut self.bits, &class.name().to_string()) {
            self.write_class_body(&class)?;
        }
        Ok(())
    }

    fn write_streamer_body(&mut self, streamer: &Arc<TypeStreamer>) -> CodecResult<()> {
        self.bits.write_bytes(streamer.name().as_bytes());
        if self.metadata == MetadataType::None {
            return Ok(());
        }
        self.bits.write_i32(streamer.reader_type() as i32);
        match streamer.kind() {
            StreamerKind::Simple(_) => {}
            StreamerKind::Enum(spec) => {
                if self.metadata == MetadataType::Full {
                    self.bits.write_i32(spec.entries().len() as i32);
                    for (name, value) in spec.entries() {
                        self.bits.write_bytes(name.as_bytes());
                        self.bits.write_i32(*value as i32);
                    }
                } else {
                    self.bits.write_i32(spec.bits() as i32);
                    let hash = SchemaHash::of_enum_entries(spec.entries());
                    self.bits.write(hash.as_bytes(), SchemaHash::SIZE * 8, 0);
                }
            }
            StreamerKind::List(child) | StreamerKind::Set(child) => {
                self.write_streamer_ref(child)?;
            }
            StreamerKind::Map(key, value) => {
                self.write_streamer_ref(key)?;
                self.write_streamer_ref(value)?;
            }
            StreamerKind::Record(fields) => {
                self.bits.write_i32(fields.len() as i32);
                if fields.is_empty() {
                    return Ok(());
                }
                for field in fields {
                    self.write_streamer_ref(field.streamer())?;
                    if self.metadata == MetadataType::Full {
                        self.bits.write_bytes(field.name().as_bytes());
                    }
                }
                if self.metadata == MetadataType::Hash {
                    let hash = SchemaHash::of_names(fields.iter().map(|f| f.name()));
                    self.bits.write(hash.as_bytes(), SchemaHash::SIZE * 8, 0);
                }
            }
        }
        Ok(())
    }

    fn write_class_body(&mut self, class: &Arc<ClassDescriptor>) -> CodecResult<()> {
        self.bits.write_bytes(class.name().as_bytes());
        if self.metadata == MetadataType::None {
            return Ok(());
        }
        self.bits.write_i32(class.properties().len() as i32);
        for property in class.properties() {
            self.write_streamer_ref(property.streamer())?;
            if self.metadata == MetadataType::Full {
                self.bits.write_bytes(property.name().as_bytes());
            }
        }
        if self.metadata == MetadataType::Hash {
            let hash = SchemaHash::of_names(class.properties().iter().map(|p| p.name()));
            self.bits.write(hash.as_bytes(), SchemaHash::SIZE * 8, 0);
        }
        Ok(())
    }

    /// Drain the interning additions made since the last reset. Persist
    /// them once the encoded unit is delivered; drop them to roll back.
    pub fn get_and_reset_write_mappings(&mut self) -> WriteMappings {
        WriteMappings {
            classes: self.classes.get_and_reset_transient(),
            types: self.types.get_and_reset_transient(),
            attributes: self.attributes.get_and_reset_transient(),
            script_strings: self.script_strings.get_and_reset_transient(),
            shared_objects: self.shared_objects.get_and_reset_transient(),
        }
    }

    /// Commit drained mappings and update shared-object lineage references
    /// so later transmissions delta against the newest incarnation.
    pub fn persist_write_mappings(&mut self, mappings: WriteMappings) {
        self.classes.persist_transient(mappings.classes);
        self.types.persist_transient(mappings.types);
        self.attributes.persist_transient(mappings.attributes);
        self.script_strings.persist_transient(mappings.script_strings);
        self.shared_objects
            .persist_transient(mappings.shared_objects.clone());

        for key in mappings.shared_objects.keys() {
            let object = &key.0;
            let origin = object.origin_id();
            if let Some(existing) = self.shared_references.get(&origin).and_then(Weak::upgrade) {
                if existing.id() != object.id() {
                    // Replaced by a successor; the predecessor's wire id is
                    // retired.
                    self.shared_objects
                        .remove_persistent_id(&SharedKey(existing));
                }
            }
            self.shared_references.insert(origin, Arc::downgrade(object));
        }
    }

    pub fn persist_and_reset_write_mappings(&mut self) {
        let mappings = self.get_and_reset_write_mappings();
        self.persist_write_mappings(mappings);
    }

    /// Forget a destroyed shared object. Returns the wire ID to notify the
    /// peer with, if the object had been persisted.
    pub fn clear_shared_object(&mut self, object: &SharedObjectPointer) -> Option<u32> {
        self.shared_references.remove(&object.origin_id());
        let id = self
            .shared_objects
            .take_persistent_id(&SharedKey(object.clone()));
        (id != 0).then_some(id)
    }
}

fn type_mismatch(streamer: &Arc<TypeStreamer>, value: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected: streamer.name().to_string(),
        found: format!("{:?}", value),
    }
}

fn slice_contains(elements: &[Value], value: &Value) -> bool {
    elements.iter().any(|e| e == value)
}

fn entries_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn record_get<'a>(properties: &'a [(String, ScriptValue)], name: &str) -> Option<&'a ScriptValue> {
    properties
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}
