// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The address-book snapshot consulted by the signed-state validator.

use crate::error::ReconnectError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = u64;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AddressBookEntry {
    pub public_key: Vec<u8>,
    pub stake: u64,
}

/// Snapshot mapping node-id to public-key and stake at a given round.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AddressBook {
    entries: BTreeMap<NodeId, AddressBookEntry>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. Returns `AddressBookViolation` on zero stake or
    /// re-insertion of an existing node-id — the invariants named in the
    /// error taxonomy as belonging to the address-book validator.
    pub fn insert(&mut self, node_id: NodeId, entry: AddressBookEntry) -> Result<(), ReconnectError> {
        if entry.stake == 0 {
            return Err(ReconnectError::AddressBookViolation {
                reason: format!("node {node_id} has zero stake"),
            });
        }
        if self.entries.contains_key(&node_id) {
            return Err(ReconnectError::AddressBookViolation {
                reason: format!("node {node_id} already present"),
            });
        }
        self.entries.insert(node_id, entry);
        Ok(())
    }

    pub fn get(&self, node_id: NodeId) -> Option<&AddressBookEntry> {
        self.entries.get(&node_id)
    }

    pub fn total_stake(&self) -> u64 {
        self.entries.values().map(|e| e.stake).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &AddressBookEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validates the whole-snapshot invariants: non-empty, every entry
    /// carries positive stake, and node-ids are unique (guaranteed by the
    /// map) and form a monotonic sequence starting at 0, matching the
    /// "monotonic next-id, no re-insertion" invariant named in the error
    /// taxonomy.
    pub fn validate(&self) -> Result<(), ReconnectError> {
        if self.entries.is_empty() {
            return Err(ReconnectError::AddressBookViolation {
                reason: "address book is empty".to_string(),
            });
        }
        for (id, entry) in &self.entries {
            if entry.stake == 0 {
                return Err(ReconnectError::AddressBookViolation {
                    reason: format!("node {id} has zero stake"),
                });
            }
        }
        let expected_next: Vec<NodeId> = (0..self.entries.len() as NodeId).collect();
        let actual: Vec<NodeId> = self.entries.keys().copied().collect();
        if actual != expected_next {
            return Err(ReconnectError::AddressBookViolation {
                reason: "node-ids are not a monotonic 0-based sequence".to_string(),
            });
        }
        Ok(())
    }
}

/// Signed-state envelope: round number, root hash, per-node signatures, and
/// the address book snapshot used to validate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedState {
    pub round_number: u64,
    pub root_hash: crate::hash::Hash48,
    pub signatures: BTreeMap<NodeId, Vec<u8>>,
    pub address_book: AddressBook,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stake: u64) -> AddressBookEntry {
        AddressBookEntry {
            public_key: vec![1, 2, 3],
            stake,
        }
    }

    #[test]
    fn empty_address_book_fails_validation() {
        let book = AddressBook::new();
        let err = book.validate().unwrap_err();
        assert!(matches!(err, ReconnectError::AddressBookViolation { .. }));
    }

    #[test]
    fn well_formed_address_book_validates() {
        let mut book = AddressBook::new();
        book.insert(0, entry(10)).unwrap();
        book.insert(1, entry(20)).unwrap();
        book.insert(2, entry(30)).unwrap();
        book.validate().unwrap();
        assert_eq!(book.total_stake(), 60);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn insert_rejects_zero_stake() {
        let mut book = AddressBook::new();
        let err = book.insert(0, entry(0)).unwrap_err();
        assert!(matches!(err, ReconnectError::AddressBookViolation { .. }));
    }

    #[test]
    fn insert_rejects_duplicate_node_id() {
        let mut book = AddressBook::new();
        book.insert(0, entry(10)).unwrap();
        let err = book.insert(0, entry(20)).unwrap_err();
        assert!(matches!(err, ReconnectError::AddressBookViolation { .. }));
    }

    #[test]
    fn validate_rejects_non_monotonic_node_ids() {
        // Inserting 0 and 2 (skipping 1) is allowed by `insert` itself, but
        // `validate` must catch the resulting gap before the book is used.
        let mut book = AddressBook::new();
        book.insert(0, entry(10)).unwrap();
        book.insert(2, entry(20)).unwrap();
        let err = book.validate().unwrap_err();
        assert!(matches!(err, ReconnectError::AddressBookViolation { .. }));
    }
}
