// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Polymorphic Merkle tree node: a small tagged variant `{Leaf, Internal,
//! SelfHashing}` for the core shape, immutable after its hash is set.

use parking_lot::Mutex;
use recon_types::{hash::Hash48, ReconnectError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The shape-specific payload of a node. Internal children are held behind
/// a lock since the hashing engine mutates them (setting each child's hash)
/// from multiple worker threads.
pub enum NodeKind {
    Leaf { payload: Vec<u8> },
    Internal { children: Mutex<Vec<Option<Arc<Node>>>> },
    /// Computes its own hash without reading children; the reported hash is
    /// authoritative and must never be recomputed or overridden.
    SelfHashing { reported_hash: Hash48 },
}

pub struct Node {
    class_id: u64,
    version: u32,
    kind: NodeKind,
    hash: Mutex<Option<Hash48>>,
    /// Set by `mark_for_initialization` for internal nodes assembled during
    /// reconnect splicing, so a post-assembly hook can run exactly once.
    needs_initialization: AtomicBool,
}

impl Node {
    pub fn new_leaf(class_id: u64, version: u32, payload: Vec<u8>) -> Arc<Node> {
        Arc::new(Node {
            class_id,
            version,
            kind: NodeKind::Leaf { payload },
            hash: Mutex::new(None),
            needs_initialization: AtomicBool::new(false),
        })
    }

    /// Constructs an internal node, enforcing `min_children(version)..=
    /// max_children(version)` from the supplied schema: bounds are
    /// checked at construction/deserialization time, never after.
    pub fn new_internal(
        class_id: u64,
        version: u32,
        children: Vec<Option<Arc<Node>>>,
        min_children: u32,
        max_children: u32,
    ) -> Result<Arc<Node>, ReconnectError> {
        let got = children.len() as u32;
        if got < min_children || got > max_children {
            return Err(ReconnectError::IllegalChildCount {
                class_id,
                version,
                got,
                min: min_children,
                max: max_children,
            });
        }
        Ok(Arc::new(Node {
            class_id,
            version,
            kind: NodeKind::Internal {
                children: Mutex::new(children),
            },
            hash: Mutex::new(None),
            needs_initialization: AtomicBool::new(false),
        }))
    }

    pub fn new_self_hashing(class_id: u64, version: u32, reported_hash: Hash48) -> Arc<Node> {
        Arc::new(Node {
            class_id,
            version,
            kind: NodeKind::SelfHashing { reported_hash },
            hash: Mutex::new(Some(reported_hash)),
            needs_initialization: AtomicBool::new(false),
        })
    }

    pub fn class_id(&self) -> u64 {
        self.class_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, NodeKind::Internal { .. })
    }

    pub fn is_self_hashing(&self) -> bool {
        matches!(self.kind, NodeKind::SelfHashing { .. })
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Leaf { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Internal { children } => children.lock().len(),
            _ => 0,
        }
    }

    pub fn get_child(&self, i: usize) -> Option<Arc<Node>> {
        match &self.kind {
            NodeKind::Internal { children } => children.lock().get(i).cloned().flatten(),
            _ => None,
        }
    }

    pub fn children_snapshot(&self) -> Vec<Option<Arc<Node>>> {
        match &self.kind {
            NodeKind::Internal { children } => children.lock().clone(),
            _ => Vec::new(),
        }
    }

    /// Sets a child by index. Fails with `StateImmutable` once this node's
    /// hash has been set.
    pub fn set_child(&self, i: usize, node: Option<Arc<Node>>) -> Result<(), ReconnectError> {
        if self.hash.lock().is_some() {
            return Err(ReconnectError::StateImmutable);
        }
        match &self.kind {
            NodeKind::Internal { children } => {
                let mut guard = children.lock();
                if i >= guard.len() {
                    return Err(ReconnectError::IllegalChildHash {
                        reason: format!("child index {i} out of bounds ({} children)", guard.len()),
                    });
                }
                guard[i] = node;
                Ok(())
            }
            _ => Err(ReconnectError::IllegalChildHash {
                reason: "set_child called on a non-internal node".to_string(),
            }),
        }
    }

    pub fn hash(&self) -> Option<Hash48> {
        *self.hash.lock()
    }

    /// Sets this node's hash. Fails with `StateImmutable` if already set
    /// self-hashing nodes reject any call since their hash is fixed
    /// at construction.
    pub fn set_hash(&self, h: Hash48) -> Result<(), ReconnectError> {
        if matches!(self.kind, NodeKind::SelfHashing { .. }) {
            return Err(ReconnectError::StateImmutable);
        }
        let mut guard = self.hash.lock();
        if guard.is_some() {
            return Err(ReconnectError::StateImmutable);
        }
        *guard = Some(h);
        Ok(())
    }

    /// Acquires the per-node lock and runs `f` only if the hash is not yet
    /// set, storing its result. Used by the hashing engine so concurrent
    /// workers never race to hash the same node twice.
    pub fn hash_once_with<F>(&self, f: F) -> Result<Hash48, ReconnectError>
    where
        F: FnOnce() -> Result<Hash48, ReconnectError>,
    {
        let mut guard = self.hash.lock();
        if let Some(h) = *guard {
            return Ok(h);
        }
        let h = f()?;
        *guard = Some(h);
        Ok(h)
    }

    pub fn mark_for_initialization(&self) {
        self.needs_initialization.store(true, Ordering::SeqCst);
    }

    pub fn needs_initialization(&self) -> bool {
        self.needs_initialization.load(Ordering::SeqCst)
    }

    pub fn clear_needs_initialization(&self) {
        self.needs_initialization.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("class_id", &self.class_id)
            .field("version", &self.version)
            .field("is_leaf", &self.is_leaf())
            .field("is_internal", &self.is_internal())
            .field("hash", &self.hash())
            .finish()
    }
}
