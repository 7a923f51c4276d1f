// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The content-addressed Merkle tree node model and its hashing engine.

pub mod decode;
pub mod hashing;
pub mod node;
pub mod registry;

pub use decode::{decode_node, encode_header, NodeDecodeError};
pub use hashing::{check_hashes, hash_parallel, hash_sync, CheckOutcome};
pub use node::{Node, NodeKind};
pub use registry::{NodeSchema, Registry, RegistryError, REGISTRY};
