// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bit-level, self-describing serialization with schema negotiation and
//! delta updates.
//!
//! bitdelta packs typed values as bit sequences over an in-memory byte
//! stream. Every value is preceded by an interned reference to its type
//! descriptor; the first use of a descriptor carries enough schema metadata
//! (none, a structural hash, or full field names, see [`MetadataType`]) for
//! a peer holding a *different* version of the same type to keep decoding.
//! Values can also be written as deltas against a mutually-known reference,
//! and shared objects are transmitted by identity so that a mutated
//! successor costs only the changed fields on the wire.
//!
//! The codec is not self-framing and defines no transport; callers feed the
//! encoder's flushed bytes to the decoder however they like and pair
//! [`Encoder::persist_and_reset_write_mappings`] on the sender with
//! [`Decoder::persist_and_reset_read_mappings`] on the receiver after each
//! delivered unit.
//!
//! ## Quick start
//!
//! ```ignore
//! use bitdelta::{registry, Encoder, Decoder, MetadataType, GenericsMode, Value};
//!
//! let point = registry::register_record_streamer(
//!     "Point",
//!     vec![
//!         ("x".into(), registry::i32_streamer()),
//!         ("y".into(), registry::i32_streamer()),
//!     ],
//! );
//!
//! let mut encoder = Encoder::new(MetadataType::Full);
//! encoder.write(&Value::record(&point, vec![3i32.into(), 4i32.into()]))?;
//! encoder.flush();
//!
//! let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
//! decoder.feed(&encoder.take_bytes());
//! let value = decoder.read()?;
//! # Ok::<(), bitdelta::CodecError>(())
//! ```

pub mod bitio;
pub mod error;
pub mod logging;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod script;
pub mod shared;
pub mod stream;
pub mod streamer;
pub mod value;

mod intern;

pub use error::{CodecError, CodecResult};
pub use reader::{FieldReader, ObjectReader, PropertyReader, TypeReader};
pub use registry::{Attribute, ClassDescriptor, Property};
pub use schema::SchemaHash;
pub use script::{ScriptRegExp, ScriptValue};
pub use shared::{SharedObject, SharedObjectPointer};
pub use stream::{Decoder, Encoder, GenericsMode, MetadataType, ReadMappings, WriteMappings};
pub use streamer::{ReaderType, SimpleKind, StreamerKind, TypeStreamer, TypeTag};
pub use value::{PolyObject, Value};
