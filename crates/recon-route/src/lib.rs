// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Compact, append-only path-from-root identifiers for nodes in an n-ary
//! tree, with two interchangeable concrete encodings behind one contract.

use recon_types::error::RouteError;
use std::fmt;
use std::hash::{Hash, Hasher};

const WORD_BITS: u32 = 32;
const MARKER: u32 = 1 << 31;
const CONTENT_START: u32 = WORD_BITS - 2; // 30

/// Inserts a single binary (0/1) step into a packed word, returning `None`
/// if the word has no remaining capacity.
fn insert_bit(word: u32, bit: bool) -> Option<u32> {
    if word == MARKER {
        let mut w = MARKER;
        if bit {
            w |= 1 << CONTENT_START;
        }
        w |= 1 << (CONTENT_START - 1);
        return Some(w);
    }
    let term_pos = (word & !MARKER).trailing_zeros();
    if term_pos == 0 {
        return None;
    }
    let mut w = word & !(1 << term_pos);
    if bit {
        w |= 1 << term_pos;
    }
    w |= 1 << (term_pos - 1);
    Some(w)
}

/// Decodes the binary steps packed into `word`, in the order they were
/// appended.
fn decode_packed(word: u32) -> Vec<i32> {
    if word == MARKER {
        return Vec::new();
    }
    let term_pos = (word & !MARKER).trailing_zeros();
    let n = CONTENT_START - term_pos;
    (0..n)
        .map(|i| {
            let pos = CONTENT_START - i;
            i32::from((word >> pos) & 1)
        })
        .collect()
}

fn is_packed(elem: i32) -> bool {
    (elem as u32) & MARKER != 0
}

/// One concrete encoding of a [`Route`]: one 32-bit integer per step.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct UncompressedRoute(Vec<i32>);

impl UncompressedRoute {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn extend(&self, step: i32) -> Result<Self, RouteError> {
        if step < 0 {
            return Err(RouteError::InvalidRoute);
        }
        let mut steps = self.0.clone();
        steps.push(step);
        Ok(Self(steps))
    }

    pub fn size(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn iter(&self) -> Result<Vec<i32>, RouteError> {
        for &e in &self.0 {
            if e == 0 {
                return Err(RouteError::CorruptRoute);
            }
        }
        Ok(self.0.clone())
    }
}

/// The other concrete encoding: packs runs of binary (0/1) steps into the
/// high bits of 32-bit words, storing n-ary steps (`>= 2`) as standalone
/// words.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CompressedBinaryRoute(Vec<i32>);

impl CompressedBinaryRoute {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn extend(&self, step: i32) -> Result<Self, RouteError> {
        if step < 0 {
            return Err(RouteError::InvalidRoute);
        }
        let mut words = self.0.clone();
        if step >= 2 {
            words.push(step);
            return Ok(Self(words));
        }
        let bit = step == 1;
        let appended = words
            .last()
            .copied()
            .filter(|&last| is_packed(last))
            .and_then(|last| insert_bit(last as u32, bit));
        match appended {
            Some(new_word) => {
                *words.last_mut().expect("checked above") = new_word as i32;
            }
            None => {
                let new_word = insert_bit(MARKER, bit).expect("fresh word always has capacity");
                words.push(new_word as i32);
            }
        }
        Ok(Self(words))
    }

    pub fn size(&self) -> u32 {
        // logical step count, not word count.
        self.iter().map(|v| v.len() as u32).unwrap_or(0)
    }

    pub fn iter(&self) -> Result<Vec<i32>, RouteError> {
        let mut out = Vec::new();
        for &elem in &self.0 {
            if elem == 0 {
                return Err(RouteError::CorruptRoute);
            }
            if is_packed(elem) {
                out.extend(decode_packed(elem as u32));
            } else if elem >= 2 {
                out.push(elem);
            } else {
                return Err(RouteError::CorruptRoute);
            }
        }
        Ok(out)
    }
}

/// A path from the root expressed as an ordered sequence of child indices,
/// behind either the uncompressed or compressed-binary encoding.
#[derive(Clone, Debug)]
pub enum Route {
    Uncompressed(UncompressedRoute),
    CompressedBinary(CompressedBinaryRoute),
}

impl Route {
    pub fn empty_uncompressed() -> Self {
        Route::Uncompressed(UncompressedRoute::empty())
    }

    pub fn empty_compressed() -> Self {
        Route::CompressedBinary(CompressedBinaryRoute::empty())
    }

    pub fn extend(&self, step: i32) -> Result<Self, RouteError> {
        match self {
            Route::Uncompressed(r) => Ok(Route::Uncompressed(r.extend(step)?)),
            Route::CompressedBinary(r) => Ok(Route::CompressedBinary(r.extend(step)?)),
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Route::Uncompressed(r) => r.size(),
            Route::CompressedBinary(r) => r.size(),
        }
    }

    /// Decodes the logical step sequence. Failure modes: `InvalidRoute` is
    /// only produced by `extend`; `CorruptRoute` here means the underlying
    /// storage contained a forbidden (zero, or unmarked sub-2) element.
    pub fn iter(&self) -> Result<Vec<i32>, RouteError> {
        match self {
            Route::Uncompressed(r) => r.iter(),
            Route::CompressedBinary(r) => r.iter(),
        }
    }

    /// Longest common prefix length of the two routes' logical step
    /// sequences. Not part of the wire contract; a small ergonomic helper in
    /// the spirit of a path type's usual diagnostic surface.
    pub fn common_prefix_len(&self, other: &Route) -> usize {
        let a = self.iter().unwrap_or_default();
        let b = other.iter().unwrap_or_default();
        a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
    }
}

impl PartialEq for Route {
    /// Equality is defined on the bit-pattern within a single encoding: two
    /// routes of different concrete encodings are never equal even if their
    /// logical step sequences match, mirroring `hash` below.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Route::Uncompressed(a), Route::Uncompressed(b)) => a == b,
            (Route::CompressedBinary(a), Route::CompressedBinary(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Route::Uncompressed(r) => {
                0u8.hash(state);
                r.hash(state);
            }
            Route::CompressedBinary(r) => {
                1u8.hash(state);
                r.hash(state);
            }
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.iter() {
            Ok(steps) => {
                write!(f, "/")?;
                for (i, s) in steps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{s}")?;
                }
                Ok(())
            }
            Err(_) => write!(f, "<corrupt route>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uncompressed_round_trip() {
        let r = Route::empty_uncompressed();
        let r = r.extend(3).unwrap().extend(0).unwrap().extend(12).unwrap();
        assert_eq!(r.iter().unwrap(), vec![3, 0, 12]);
        assert_eq!(r.size(), 3);
    }

    #[test]
    fn compressed_binary_packs_runs() {
        let r = Route::empty_compressed();
        let r = r
            .extend(1)
            .unwrap()
            .extend(0)
            .unwrap()
            .extend(1)
            .unwrap()
            .extend(5)
            .unwrap()
            .extend(0)
            .unwrap();
        assert_eq!(r.iter().unwrap(), vec![1, 0, 1, 5, 0]);
        if let Route::CompressedBinary(inner) = &r {
            // Two binary runs (before and after the n-ary step 5) should
            // live in two separate packed words, plus the standalone 5.
            assert_eq!(inner.0.len(), 3);
        } else {
            panic!("expected compressed encoding");
        }
    }

    #[test]
    fn negative_step_is_invalid() {
        assert_eq!(
            Route::empty_uncompressed().extend(-1).unwrap_err(),
            RouteError::InvalidRoute
        );
        assert_eq!(
            Route::empty_compressed().extend(-1).unwrap_err(),
            RouteError::InvalidRoute
        );
    }

    #[test]
    fn corrupt_zero_element_detected() {
        let bad = CompressedBinaryRoute(vec![0]);
        assert_eq!(bad.iter().unwrap_err(), RouteError::CorruptRoute);
    }

    #[test]
    fn packed_word_fills_to_capacity() {
        let mut r = CompressedBinaryRoute::empty();
        for i in 0..30 {
            r = r.extend(i % 2).unwrap();
        }
        assert_eq!(r.0.len(), 1, "30 binary steps should fit one word");
        assert_eq!(r.iter().unwrap().len(), 30);
        // a 31st binary step must spill into a new word.
        r = r.extend(1).unwrap();
        assert_eq!(r.0.len(), 2);
        assert_eq!(r.iter().unwrap().len(), 31);
    }

    proptest! {
        #[test]
        fn p2_route_round_trip_uncompressed(steps in proptest::collection::vec(0i32..1000, 0..64)) {
            let mut r = Route::empty_uncompressed();
            for &s in &steps {
                r = r.extend(s).unwrap();
            }
            prop_assert_eq!(r.iter().unwrap(), steps);
        }

        #[test]
        fn p2_route_round_trip_compressed(steps in proptest::collection::vec(0i32..1000, 0..64)) {
            let mut r = Route::empty_compressed();
            for &s in &steps {
                r = r.extend(s).unwrap();
            }
            prop_assert_eq!(r.iter().unwrap(), steps);
        }
    }
}
