// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! A small capability set letting the core manipulate a node without
//! knowing its concrete type. The learner and teacher operate entirely
//! through a `View`; concrete node flavors plug in by implementing it.

use async_trait::async_trait;
use recon_types::{Hash48, ReconnectError};
use std::sync::Arc;

/// Abstracts the differences among tree flavors: how to read a node's
/// class-id, how to read a child count, how to get/set a child by index,
/// how to serialize/deserialize a node, and how to extract the hash of a
/// child.
#[async_trait]
pub trait View: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    fn class_id(&self, node: &Self::Handle) -> u64;
    fn version(&self, node: &Self::Handle) -> u32;
    fn is_internal(&self, node: &Self::Handle) -> bool;
    fn child_count(&self, node: &Self::Handle) -> usize;
    fn get_child(&self, node: &Self::Handle, i: usize) -> Option<Self::Handle>;
    fn set_child(
        &self,
        node: &Self::Handle,
        i: usize,
        child: Option<Self::Handle>,
    ) -> Result<(), ReconnectError>;
    fn hash_of(&self, node: &Self::Handle) -> Option<Hash48>;
    fn serialize_payload(&self, node: &Self::Handle) -> Vec<u8>;

    fn new_leaf(
        &self,
        class_id: u64,
        version: u32,
        payload: Vec<u8>,
    ) -> Result<Self::Handle, ReconnectError>;

    fn new_internal(
        &self,
        class_id: u64,
        version: u32,
        children: Vec<Option<Self::Handle>>,
    ) -> Result<Self::Handle, ReconnectError>;

    fn mark_for_initialization(&self, node: &Self::Handle);
    fn needs_initialization(&self, node: &Self::Handle) -> bool;
    fn clear_needs_initialization(&self, node: &Self::Handle);

    /// Runs any post-assembly initialization on a freshly spliced internal
    /// node. Default is a no-op; flavors that need it override this.
    fn initialize(&self, _node: &Self::Handle) {}

    /// Suspension point at the boundary of a custom subtree.
    async fn wait_until_ready(&self) {}

    /// Runs on every exit path of the subtree this view was created for.
    fn close(&self) {}

    /// Returns `Some(class-id)` when `node` must be treated as the root of a
    /// subtree synchronized under a different view. The default never
    /// switches views.
    fn custom_view_class_id(&self, _node: &Self::Handle) -> Option<u64> {
        None
    }

    /// Recomputes the hash of a freshly spliced tree from the leaves up,
    /// after every `needs_initialization` node has been initialized.
    fn finalize_hash(&self, root: &Self::Handle) -> Result<Hash48, ReconnectError>;
}

/// RAII guard that calls `View::close` on every exit path, including
/// panics, satisfying "views are held by a scoped lifetime that guarantees
/// close() runs".
pub struct ScopedView<V: View + ?Sized> {
    view: Arc<V>,
}

impl<V: View + ?Sized> ScopedView<V> {
    pub fn new(view: Arc<V>) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &V {
        &self.view
    }
}

impl<V: View + ?Sized> Drop for ScopedView<V> {
    fn drop(&mut self) {
        self.view.close();
    }
}

pub mod merkle_view {
    use super::*;
    use recon_merkle::registry::REGISTRY;
    use recon_merkle::Node;

    /// The default `View` over `recon_merkle::Node` trees, looking up
    /// child-count bounds from the process-wide constructable registry the
    /// way a deserializer would.
    pub struct MerkleView;

    #[async_trait]
    impl View for MerkleView {
        type Handle = Arc<Node>;

        fn class_id(&self, node: &Self::Handle) -> u64 {
            node.class_id()
        }

        fn version(&self, node: &Self::Handle) -> u32 {
            node.version()
        }

        fn is_internal(&self, node: &Self::Handle) -> bool {
            node.is_internal()
        }

        fn child_count(&self, node: &Self::Handle) -> usize {
            node.child_count()
        }

        fn get_child(&self, node: &Self::Handle, i: usize) -> Option<Self::Handle> {
            node.get_child(i)
        }

        fn set_child(
            &self,
            node: &Self::Handle,
            i: usize,
            child: Option<Self::Handle>,
        ) -> Result<(), ReconnectError> {
            node.set_child(i, child)
        }

        fn hash_of(&self, node: &Self::Handle) -> Option<Hash48> {
            node.hash()
        }

        fn serialize_payload(&self, node: &Self::Handle) -> Vec<u8> {
            node.payload().unwrap_or(&[]).to_vec()
        }

        fn new_leaf(
            &self,
            class_id: u64,
            version: u32,
            payload: Vec<u8>,
        ) -> Result<Self::Handle, ReconnectError> {
            Ok(Node::new_leaf(class_id, version, payload))
        }

        fn new_internal(
            &self,
            class_id: u64,
            version: u32,
            children: Vec<Option<Self::Handle>>,
        ) -> Result<Self::Handle, ReconnectError> {
            let schema = REGISTRY.create(class_id)?;
            let min = schema.min_children(version);
            let max = schema.max_children(version);
            Node::new_internal(class_id, version, children, min, max)
        }

        fn mark_for_initialization(&self, node: &Self::Handle) {
            node.mark_for_initialization();
        }

        fn needs_initialization(&self, node: &Self::Handle) -> bool {
            node.needs_initialization()
        }

        fn clear_needs_initialization(&self, node: &Self::Handle) {
            node.clear_needs_initialization();
        }

        fn finalize_hash(&self, root: &Self::Handle) -> Result<Hash48, ReconnectError> {
            recon_merkle::hashing::hash_parallel(root, 1).map_err(|e| {
                ReconnectError::MerkleSerializationError {
                    reason: e.to_string(),
                    node: format!("{:#x}", root.class_id()),
                }
            })
        }
    }
}
