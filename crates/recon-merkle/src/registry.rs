// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Process-wide constructable registry mapping class-id to node factory,
//! modeled as a thread-safe lazily-initialized table (per the design note:
//! append-only, re-registering a class-id is an error).

use crate::node::Node;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use recon_types::ReconnectError;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Per-class-id schema: version-dependent child-count bounds for internal
/// nodes, and a factory for leaf payloads.
pub trait NodeSchema: Send + Sync {
    fn class_id(&self) -> u64;

    fn min_children(&self, _version: u32) -> u32 {
        0
    }

    fn max_children(&self, _version: u32) -> u32 {
        u32::MAX
    }

    fn create_leaf(&self, version: u32, payload: Vec<u8>) -> Arc<Node> {
        Node::new_leaf(self.class_id(), version, payload)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("class-id {0} is already registered")]
    AlreadyRegistered(u64),
}

pub struct Registry {
    schemas: RwLock<HashMap<u64, Arc<dyn NodeSchema>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, schema: Arc<dyn NodeSchema>) -> Result<(), RegistryError> {
        let class_id = schema.class_id();
        let mut guard = self.schemas.write();
        if guard.contains_key(&class_id) {
            return Err(RegistryError::AlreadyRegistered(class_id));
        }
        guard.insert(class_id, schema);
        Ok(())
    }

    pub fn create(&self, class_id: u64) -> Result<Arc<dyn NodeSchema>, ReconnectError> {
        self.schemas
            .read()
            .get(&class_id)
            .cloned()
            .ok_or(ReconnectError::ClassNotFoundInRegistry { class_id })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The global, process-wide registry instance.
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
