// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// The full error taxonomy for the reconnect core. `RouteError`, defined in
/// this crate, converts into this one via `#[from]`; `recon_merkle::
/// NodeDecodeError`, defined one layer up (it would be a circular
/// dependency for this crate to know about it), converts via a manual
/// `From` impl into `MerkleSerializationError` instead. This mirrors the
/// same layering `kanari-rpc-api::RpcError` uses over `KanariError` and
/// `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ReconnectError {
    #[error("class {class_id} not found in constructable registry")]
    ClassNotFoundInRegistry { class_id: u64 },

    #[error(
        "internal node of class {class_id} version {version} has {got} children, expected {min}..={max}"
    )]
    IllegalChildCount {
        class_id: u64,
        version: u32,
        got: u32,
        min: u32,
        max: u32,
    },

    #[error("expected-lesson queue exceeded bound: max {max}, observed {observed}")]
    NodeLimitExceeded { max: u64, observed: u64 },

    #[error("merkle serialization error on node {node}: {reason}")]
    MerkleSerializationError { reason: String, node: String },

    #[error("illegal child hash: {reason}")]
    IllegalChildHash { reason: String },

    #[error("mutator called on an already-hashed node")]
    StateImmutable,

    #[error("insufficient stake: valid {valid_stake}, total {total_stake}")]
    InsufficientStake { valid_stake: u64, total_stake: u64 },

    #[error("address book violation: {reason}")]
    AddressBookViolation { reason: String },

    #[error("transport failure: {cause}")]
    TransportFailure { cause: String },

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum RouteError {
    #[error("negative step in route")]
    InvalidRoute,
    #[error("corrupt route storage")]
    CorruptRoute,
}

/// Top-level failure surfaced to the reconnect caller: wraps the first
/// observed `ReconnectError`. Any other concurrently observed errors are
/// discarded per the propagation policy (fatal on first cause).
#[derive(Debug, Error)]
#[error("reconnect failed: {first_cause}")]
pub struct ReconnectFailed {
    pub first_cause: ReconnectError,
}

impl ReconnectFailed {
    pub fn new(first_cause: ReconnectError) -> Self {
        Self { first_cause }
    }
}
