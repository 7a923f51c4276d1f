// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Decodes a node's tagged header out of its on-wire byte encoding, reporting
//! a malformed `Node::decode` input the way `jellyfish_merkle::node_type::
//! NodeDecodeError` does for its own node format. `recon-merkle`'s node
//! bytes are framed as
//! `tag(1B) | class_id(8B BE) | version(4B BE) | rest`, where `rest` is the
//! leaf payload for a leaf node or empty for an internal node (an internal
//! node's children are resolved separately, by hash, rather than inlined).

use crate::node::Node;
use std::sync::Arc;
use thiserror::Error;

const TAG_LEAF: u8 = 0;
const TAG_INTERNAL: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 4;

/// Error thrown when a `Node` fails to decode from its on-wire byte
/// encoding, via `decode_node`.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum NodeDecodeError {
    /// Input is empty or too short to contain a full header.
    #[error("missing or truncated header")]
    EmptyInput,

    /// The first byte of the input is not a known tag representing one of
    /// the node variants.
    #[error("lead tag byte is unknown: {unknown_tag}")]
    UnknownTag { unknown_tag: u8 },

    /// An internal node was decoded with no children supplied.
    #[error("no children found in internal node")]
    NoChildren,

    /// The supplied child count falls outside the registered bounds for
    /// this node's class-id and version.
    #[error("child count {got} outside the registered bounds {min}..={max}")]
    ChildCountOutOfBounds { got: u32, min: u32, max: u32 },
}

/// Decodes a node from its header bytes plus an externally-resolved
/// children list (for an internal node; ignored for a leaf). `bounds` is
/// the `(min_children, max_children)` pair the registry reports for this
/// node's class-id and version.
pub fn decode_node(
    bytes: &[u8],
    children: Vec<Option<Arc<Node>>>,
    bounds: (u32, u32),
) -> Result<Arc<Node>, NodeDecodeError> {
    if bytes.is_empty() {
        return Err(NodeDecodeError::EmptyInput);
    }
    let tag = bytes[0];
    if tag != TAG_LEAF && tag != TAG_INTERNAL {
        return Err(NodeDecodeError::UnknownTag { unknown_tag: tag });
    }
    if bytes.len() < HEADER_LEN {
        return Err(NodeDecodeError::EmptyInput);
    }
    let class_id = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
    let version = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
    let payload = &bytes[HEADER_LEN..];

    match tag {
        TAG_LEAF => Ok(Node::new_leaf(class_id, version, payload.to_vec())),
        TAG_INTERNAL => {
            if children.is_empty() {
                return Err(NodeDecodeError::NoChildren);
            }
            let (min, max) = bounds;
            let got = children.len() as u32;
            if got < min || got > max {
                return Err(NodeDecodeError::ChildCountOutOfBounds { got, min, max });
            }
            // Bounds were just checked above, so construction cannot fail.
            Ok(Node::new_internal(class_id, version, children, min, max)
                .expect("bounds checked above"))
        }
        unknown => Err(NodeDecodeError::UnknownTag {
            unknown_tag: unknown,
        }),
    }
}

/// Encodes a node's header the way `decode_node` expects to read it back.
/// Only the leaf payload (if any) follows the header; an internal node's
/// children are not serialized inline.
pub fn encode_header(node: &Node) -> Vec<u8> {
    let tag = if node.is_internal() {
        TAG_INTERNAL
    } else {
        TAG_LEAF
    };
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.push(tag);
    out.extend_from_slice(&node.class_id().to_be_bytes());
    out.extend_from_slice(&node.version().to_be_bytes());
    if let Some(payload) = node.payload() {
        out.extend_from_slice(payload);
    }
    out
}

/// Converts a decode failure into the unified reconnect error, the way a
/// downstream crate composes a crate-local error into `ReconnectError`'s
/// `MerkleSerializationError` variant without `ReconnectError` itself
/// needing to know about `NodeDecodeError` (it is defined in this crate,
/// one layer above `recon-types`).
impl From<NodeDecodeError> for recon_types::ReconnectError {
    fn from(err: NodeDecodeError) -> Self {
        recon_types::ReconnectError::MerkleSerializationError {
            reason: err.to_string(),
            node: "<decoded>".to_string(),
        }
    }
}
