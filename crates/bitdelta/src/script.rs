// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Weakly-typed script values.
//!
//! The script engine that produces these is an external collaborator; the
//! codec only needs the tagged union and its 4-bit kind tag. Host-only
//! constructs the engine cannot express on the wire (functions and the
//! like) round-trip as `Invalid`.

use crate::registry::ClassDescriptor;
use crate::value::{PolyObject, Value};
use std::sync::Arc;

/// Wire tags for script value kinds (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ScriptValueKind {
    Invalid = 0,
    Undefined = 1,
    Null = 2,
    Bool = 3,
    Number = 4,
    String = 5,
    Variant = 6,
    Object = 7,
    MetaObject = 8,
    Date = 9,
    RegExp = 10,
    Array = 11,
    ObjectRecord = 12,
}

pub(crate) const SCRIPT_VALUE_BITS: u32 = 4;

/// A value produced by the embedded scripting engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Invalid,
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A strongly-typed value wrapped for the script world.
    Variant(Value),
    /// A polymorphic host object.
    Object(Option<Box<PolyObject>>),
    /// A class reference.
    MetaObject(Option<Arc<ClassDescriptor>>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    RegExp(ScriptRegExp),
    Array(Vec<ScriptValue>),
    /// A plain script object: ordered property list. Property names travel
    /// through the interned script-string table.
    ObjectRecord(Vec<(String, ScriptValue)>),
}

impl ScriptValue {
    pub(crate) fn kind(&self) -> ScriptValueKind {
        match self {
            ScriptValue::Invalid => ScriptValueKind::Invalid,
            ScriptValue::Undefined => ScriptValueKind::Undefined,
            ScriptValue::Null => ScriptValueKind::Null,
            ScriptValue::Bool(_) => ScriptValueKind::Bool,
            ScriptValue::Number(_) => ScriptValueKind::Number,
            ScriptValue::String(_) => ScriptValueKind::String,
            ScriptValue::Variant(_) => ScriptValueKind::Variant,
            ScriptValue::Object(_) => ScriptValueKind::Object,
            ScriptValue::MetaObject(_) => ScriptValueKind::MetaObject,
            ScriptValue::Date(_) => ScriptValueKind::Date,
            ScriptValue::RegExp(_) => ScriptValueKind::RegExp,
            ScriptValue::Array(_) => ScriptValueKind::Array,
            ScriptValue::ObjectRecord(_) => ScriptValueKind::ObjectRecord,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    /// Property of an object record, when present.
    pub fn property(&self, name: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::ObjectRecord(props) => {
                props.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

/// Regular-expression literal: pattern plus engine flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRegExp {
    pub pattern: String,
    /// One bit on the wire.
    pub case_sensitive: bool,
    /// Engine pattern syntax selector; three bits on the wire.
    pub syntax: u8,
    /// Non-greedy quantifier flag.
    pub minimal: bool,
}

impl ScriptRegExp {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: true,
            syntax: 0,
            minimal: false,
        }
    }
}
