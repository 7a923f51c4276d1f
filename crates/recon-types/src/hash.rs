// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! 48-byte (SHA-384) content hash used throughout the reconnect core.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};
use std::fmt;

pub const HASH_LEN: usize = 48;

/// A fixed-width 384-bit digest with value equality and a byte-lexicographic
/// total ordering, used as the Merkle hash everywhere in this core.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hash48([u8; HASH_LEN]);

impl Hash48 {
    pub const LEN: usize = HASH_LEN;

    /// The well-known hash reported for a null/absent child.
    pub const NULL: Hash48 = Hash48([0u8; HASH_LEN]);

    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(bytes);
        Some(Self(out))
    }

    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha384::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Default for Hash48 {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Hash48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash48(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Hash48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Incrementally hashes a sequence of framed fields the way `hash(internal)`
/// and `hash(leaf)` are defined in the data model: class-id, version, then
/// payload or child hashes in order.
pub struct HashBuilder {
    hasher: Sha384,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha384::new(),
        }
    }

    pub fn update_u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    pub fn update_u32(&mut self, v: u32) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    pub fn update_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.hasher.update(v);
        self
    }

    pub fn update_hash(&mut self, h: &Hash48) -> &mut Self {
        self.hasher.update(h.as_bytes());
        self
    }

    pub fn finish(self) -> Hash48 {
        let out = self.hasher.finalize();
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&out);
        Hash48(bytes)
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}
