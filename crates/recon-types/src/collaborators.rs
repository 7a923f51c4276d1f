// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Trait seams for the four external collaborators named as deliberately
//! out of scope: gossip/intake, transport, cryptography, and the
//! constructable registry. Only the contracts live here; concrete
//! implementations (a real gossip layer, TLS transport, signature suite) are
//! provided by the surrounding node, not by this core.

use crate::hash::Hash48;
use anyhow::Result;
use async_trait::async_trait;

/// Supplied by the gossip/event-intake subsystem.
pub trait GossipIntake {
    fn fallen_behind_detected(&self) -> bool;
    fn previous_signed_state(&self) -> Option<crate::address_book::SignedState>;
}

/// Byte-level duplex transport with a `close()` that unblocks any
/// concurrently blocked read or write, used by the break-connection action.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
    async fn write_all(&self, buf: &[u8]) -> Result<()>;
    fn close(&self);
}

/// Supplied by the cryptography collaborator.
#[async_trait]
pub trait Cryptography: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> Hash48;
    async fn verify(&self, hash: &Hash48, signature: &[u8], public_key: &[u8]) -> bool;
    fn sign(&self, hash: &Hash48, private_key: &[u8]) -> Vec<u8>;
}

/// `create(class_id) -> Node` — the process-wide constructable registry,
/// exposed here as a seam so C2/C6 can depend on it abstractly. The concrete
/// registry lives in `recon-merkle::registry`.
pub trait ConstructableRegistry<N> {
    fn create(&self, class_id: u64) -> Result<N>;
}

/// In-memory fakes for the four collaborator seams, used by tests in this
/// crate and available to downstream crates' tests so a reconnect session
/// can be driven without a real gossip layer, socket, or signature suite.
pub mod fakes {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Reports a fixed "fallen behind" flag and a fixed previous signed
    /// state, both settable by the test driving it.
    #[derive(Default)]
    pub struct FakeGossipIntake {
        fallen_behind: Mutex<bool>,
        previous: Mutex<Option<crate::address_book::SignedState>>,
    }

    impl FakeGossipIntake {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fallen_behind(&self, value: bool) {
            *self.fallen_behind.lock() = value;
        }

        pub fn set_previous_signed_state(&self, state: Option<crate::address_book::SignedState>) {
            *self.previous.lock() = state;
        }
    }

    impl GossipIntake for FakeGossipIntake {
        fn fallen_behind_detected(&self) -> bool {
            *self.fallen_behind.lock()
        }

        fn previous_signed_state(&self) -> Option<crate::address_book::SignedState> {
            self.previous.lock().clone()
        }
    }

    /// An in-memory duplex pipe pair: writes to one end land in the other
    /// end's read buffer. `close()` marks the pipe closed so a concurrently
    /// blocked read or write unblocks with an error instead of hanging.
    #[derive(Default)]
    struct PipeState {
        buffer: std::collections::VecDeque<u8>,
        closed: bool,
    }

    pub struct InMemoryTransport {
        inbox: Arc<Mutex<PipeState>>,
        outbox: Arc<Mutex<PipeState>>,
    }

    impl InMemoryTransport {
        /// Builds a connected pair: `a`'s writes become `b`'s reads and
        /// vice versa.
        pub fn pair() -> (Self, Self) {
            let left = Arc::new(Mutex::new(PipeState::default()));
            let right = Arc::new(Mutex::new(PipeState::default()));
            (
                Self {
                    inbox: left.clone(),
                    outbox: right.clone(),
                },
                Self {
                    inbox: right,
                    outbox: left,
                },
            )
        }
    }

    #[async_trait]
    impl Transport for InMemoryTransport {
        async fn read(&self, buf: &mut [u8]) -> Result<usize> {
            let mut guard = self.inbox.lock();
            if guard.buffer.is_empty() {
                if guard.closed {
                    return Ok(0);
                }
                return Err(anyhow::anyhow!("no data available"));
            }
            let n = guard.buffer.len().min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = guard.buffer.pop_front().unwrap();
            }
            Ok(n)
        }

        async fn write_all(&self, buf: &[u8]) -> Result<()> {
            let mut guard = self.outbox.lock();
            if guard.closed {
                return Err(anyhow::anyhow!("write on closed transport"));
            }
            guard.buffer.extend(buf.iter().copied());
            Ok(())
        }

        fn close(&self) {
            self.inbox.lock().closed = true;
            self.outbox.lock().closed = true;
        }
    }

    /// Identity "cryptography": `digest` hashes with `HashBuilder`, `sign`
    /// returns the private key bytes back as the "signature", and `verify`
    /// checks the signature equals the public key — enough to exercise
    /// callers without pulling in a real signature scheme.
    #[derive(Default)]
    pub struct FakeCryptography;

    #[async_trait]
    impl Cryptography for FakeCryptography {
        fn digest(&self, bytes: &[u8]) -> Hash48 {
            crate::hash::HashBuilder::new().update_bytes(bytes).finish()
        }

        async fn verify(&self, _hash: &Hash48, signature: &[u8], public_key: &[u8]) -> bool {
            signature == public_key
        }

        fn sign(&self, _hash: &Hash48, private_key: &[u8]) -> Vec<u8> {
            private_key.to_vec()
        }
    }

    /// A constructable registry backed by a `HashMap` of factory closures,
    /// for tests that need `ConstructableRegistry` without depending on
    /// `recon-merkle`.
    #[derive(Default)]
    pub struct FakeConstructableRegistry<N> {
        factories: HashMap<u64, Arc<dyn Fn() -> N + Send + Sync>>,
    }

    impl<N> FakeConstructableRegistry<N> {
        pub fn new() -> Self {
            Self {
                factories: HashMap::new(),
            }
        }

        pub fn register(&mut self, class_id: u64, factory: impl Fn() -> N + Send + Sync + 'static) {
            self.factories.insert(class_id, Arc::new(factory));
        }
    }

    impl<N> ConstructableRegistry<N> for FakeConstructableRegistry<N> {
        fn create(&self, class_id: u64) -> Result<N> {
            match self.factories.get(&class_id) {
                Some(factory) => Ok(factory()),
                None => Err(anyhow::anyhow!("class {class_id} not registered")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[test]
    fn fake_gossip_intake_reports_what_was_set() {
        let intake = FakeGossipIntake::new();
        assert!(!intake.fallen_behind_detected());
        intake.set_fallen_behind(true);
        assert!(intake.fallen_behind_detected());
        assert!(intake.previous_signed_state().is_none());
    }

    #[tokio::test]
    async fn in_memory_transport_pair_delivers_writes_to_the_peer() {
        let (a, b) = InMemoryTransport::pair();
        a.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn in_memory_transport_close_unblocks_reads_with_eof() {
        let (a, b) = InMemoryTransport::pair();
        a.close();
        let mut buf = [0u8; 1];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn fake_cryptography_round_trips_sign_and_verify() {
        let crypto = FakeCryptography;
        let hash = crypto.digest(b"payload");
        let signature = crypto.sign(&hash, b"private-key-bytes");
        assert!(crypto.verify(&hash, &signature, b"private-key-bytes").await);
        assert!(!crypto.verify(&hash, &signature, b"wrong-key").await);
    }

    #[test]
    fn fake_constructable_registry_creates_by_class_id() {
        let mut registry = FakeConstructableRegistry::new();
        registry.register(7, || 42u32);
        assert!(FakeConstructableRegistry::create(&registry, 7).is_ok());
        assert!(FakeConstructableRegistry::create(&registry, 8).is_err());
    }
}
