// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Shared wire types, error taxonomy, configuration, and address-book model
//! for the Merkle-tree reconnect core.

pub mod address_book;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod hash;
pub mod wire;

pub use address_book::{AddressBook, AddressBookEntry, NodeId, SignedState};
pub use collaborators::{ConstructableRegistry, Cryptography, GossipIntake, Transport};
pub use error::{ReconnectError, ReconnectFailed, RouteError};
pub use hash::{Hash48, HashBuilder};
