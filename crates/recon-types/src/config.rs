// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Environment/config knobs for the reconnect core, declared the way
//! `kanari-config`'s `*Config` structs are declared and defaulted.

use clap::Parser;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PURGE_STRIPE_COUNT: usize = 1024;

#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "reconnect-config")]
pub struct ReconnectConfig {
    /// Worker count for the parallel hashing engine. Defaults to the number
    /// of available CPUs.
    #[arg(long, env = "RECONNECT_HASH_WORKERS")]
    pub hash_workers: Option<usize>,

    /// Socket-level read/write timeout in milliseconds.
    #[arg(long, env = "RECONNECT_SOCKET_TIMEOUT_MS", default_value_t = 60_000)]
    pub socket_timeout_ms: u64,

    /// Per-shadow-entry bound on how long the teacher waits for a
    /// `QueryResponse` before sending the full lesson unconditionally.
    #[arg(long, env = "RECONNECT_MAX_ACK_DELAY_MS", default_value_t = 5_000)]
    pub max_ack_delay_ms: u64,

    /// Stripe count for the purgable generation map/set.
    #[arg(long, env = "RECONNECT_PURGE_STRIPES", default_value_t = DEFAULT_PURGE_STRIPE_COUNT)]
    pub purge_stripe_count: usize,

    /// Upper bound on nodes the learner's expected-lesson queue may grow to,
    /// guarding against adversarial inflation.
    #[arg(
        long,
        env = "RECONNECT_MAX_NODES_TO_DESERIALIZE",
        default_value_t = 5_000_000
    )]
    pub max_nodes_to_deserialize: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            hash_workers: None,
            socket_timeout_ms: 60_000,
            max_ack_delay_ms: 5_000,
            purge_stripe_count: DEFAULT_PURGE_STRIPE_COUNT,
            max_nodes_to_deserialize: 5_000_000,
        }
    }
}

impl ReconnectConfig {
    pub fn hash_worker_count(&self) -> usize {
        self.hash_workers
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, |n| n.get()))
    }
}

/// Installs a `tracing-subscriber` the way `kanari`'s binaries do, so every
/// crate in the core can just call `tracing::debug!`/`warn!`/`info!`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
