// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Async framed streams and the supervised work group used to run a
//! reconnect session's sender/receiver task pairs.

pub mod error;
pub mod framed;
pub mod work_group;

pub use error::NetError;
pub use framed::{FramedDuplex, FramedInputStream, FramedOutputStream, MessageFactory, RawFrame};
pub use work_group::{BreakAction, WorkGroup, WorkGroupOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::duplex;

    struct EchoFactory;
    impl MessageFactory for EchoFactory {
        fn decode(&self, frame: &RawFrame) -> Result<Box<dyn Any + Send>, NetError> {
            Ok(Box::new(frame.payload.clone()))
        }
    }

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let out = FramedOutputStream::new(client_w);
        out.send(7, 1, b"hello").unwrap();

        let input = FramedInputStream::new(server_r, 16);
        input.anticipate_message(Box::new(EchoFactory)).await;
        let decoded = input.read_anticipated().await.unwrap();
        let payload = decoded.downcast::<Vec<u8>>().unwrap();
        assert_eq!(*payload, b"hello".to_vec());

        drop(client_r);
        drop(server_w);
        out.close().await.unwrap();
    }

    #[tokio::test]
    async fn read_anticipated_without_slot_is_protocol_error() {
        let (_client, server) = duplex(64);
        let (server_r, _server_w) = tokio::io::split(server);
        let input = FramedInputStream::new(server_r, 4);
        let err = input.read_anticipated().await.unwrap_err();
        assert!(matches!(err, NetError::Protocol(_)));
    }

    #[tokio::test]
    async fn work_group_invokes_break_action_on_failure() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let mut group = WorkGroup::new(Arc::new(move || {
            fired2.store(true, Ordering::SeqCst);
        }));
        group.spawn("sender", async { Ok(()) });
        group.spawn("receiver", async { anyhow::bail!("boom") });
        let outcome = group.join().await;
        assert!(outcome.has_exceptions());
        assert!(fired.load(Ordering::SeqCst));
    }
}
