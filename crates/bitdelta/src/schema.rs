// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Structural schema hashes for Hash-metadata negotiation.
//!
//! The hash is not a security boundary; it only has to be fast, 128 bits
//! wide, and stable across versions so that peers built at different times
//! agree on it.

use md5::{Digest, Md5};
use std::fmt;

/// 16-byte MD5 digest of a type's structural identity.
///
/// For record and class schemas the digest covers the field names, each
/// followed by a NUL terminator; for enums it covers each entry name plus
/// NUL plus the entry value as four little-endian bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaHash([u8; 16]);

impl SchemaHash {
    pub const SIZE: usize = 16;

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Digest of a sequence of NUL-terminated names.
    pub fn of_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = Md5::new();
        for name in names {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        Self::finalize(hasher)
    }

    /// Digest of enum entries: NUL-terminated name then 32-bit LE value.
    pub fn of_enum_entries<'a>(entries: impl IntoIterator<Item = &'a (String, u32)>) -> Self {
        let mut hasher = Md5::new();
        for (name, value) in entries {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_le_bytes());
        }
        Self::finalize(hasher)
    }

    fn finalize(hasher: Md5) -> Self {
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

impl fmt::Debug for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaHash(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
