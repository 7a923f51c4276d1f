// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Multiplexed per-peer input/output message streams: FIFO, fire-and-forget
//! framed output, and an anticipated-reply input stream with back-pressure.

use crate::error::NetError;
use byteorder::{BigEndian, WriteBytesExt};
use recon_types::wire::FrameHeader;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A raw decoded frame: class-id, version, and payload bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub class_id: u64,
    pub version: u32,
    pub payload: Vec<u8>,
}

/// Decodes a typed message from a raw frame's payload.
pub trait MessageFactory: Send + Sync {
    fn decode(&self, frame: &RawFrame) -> Result<Box<dyn Any + Send>, NetError>;
}

/// Accepts typed messages, frames and serializes them, and transmits them
/// asynchronously over a background writer task. Guarantees FIFO ordering
/// of frames as queued, but does not make the sender of a single message
/// wait for delivery.
pub struct FramedOutputStream {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    writer_task: JoinHandle<Result<(), NetError>>,
}

impl FramedOutputStream {
    pub fn new<W>(mut writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                writer
                    .write_all(&frame)
                    .await
                    .map_err(|e| NetError::Io(e.to_string()))?;
            }
            writer.flush().await.map_err(|e| NetError::Io(e.to_string()))?;
            Ok(())
        });
        Self { tx, writer_task }
    }

    /// Enqueues a message frame. Returns immediately once queued; does not
    /// wait for the background writer to actually flush it.
    pub fn send(&self, class_id: u64, version: u32, payload: &[u8]) -> Result<(), NetError> {
        let mut frame = Vec::with_capacity(12 + payload.len());
        let header = FrameHeader { class_id, version };
        header
            .write(&mut frame, payload.len() as u32)
            .map_err(|e| NetError::Io(e.to_string()))?;
        frame
            .write_all(payload)
            .map_err(|e| NetError::Io(e.to_string()))?;
        self.tx.send(frame).map_err(|_| NetError::Closed)
    }

    /// Drops the sending half and waits for the writer task to drain and
    /// terminate.
    pub async fn close(self) -> Result<(), NetError> {
        drop(self.tx);
        self.writer_task
            .await
            .map_err(|e| NetError::Io(e.to_string()))?
    }
}

struct AnticipatedSlot {
    factory: Box<dyn MessageFactory>,
}

/// Reads raw frames from the peer and dispenses them in the order the
/// caller anticipated them via `anticipate_message`. A message arriving
/// with no anticipated slot registered is a protocol error.
pub struct FramedInputStream {
    slots: Mutex<VecDeque<AnticipatedSlot>>,
    incoming: Mutex<mpsc::Receiver<Result<RawFrame, NetError>>>,
    reader_task: JoinHandle<()>,
}

impl FramedInputStream {
    pub fn new<R>(mut reader: R, max_pending: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Result<RawFrame, NetError>>(max_pending.max(1));
        let reader_task = tokio::spawn(async move {
            loop {
                let frame = match read_one_frame(&mut reader).await {
                    Ok(f) => f,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if tx.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
        });
        Self {
            slots: Mutex::new(VecDeque::new()),
            incoming: Mutex::new(rx),
            reader_task,
        }
    }

    /// Registers a slot for the next incoming message of a specific type.
    pub async fn anticipate_message(&self, factory: Box<dyn MessageFactory>) {
        self.slots.lock().await.push_back(AnticipatedSlot { factory });
    }

    /// Blocks until the next anticipated slot has a message, then
    /// deserializes it via that slot's factory.
    pub async fn read_anticipated(&self) -> Result<Box<dyn Any + Send>, NetError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .pop_front()
                .ok_or_else(|| NetError::Protocol("no anticipated slot registered".to_string()))?
        };
        let mut incoming = self.incoming.lock().await;
        let frame = incoming
            .recv()
            .await
            .ok_or(NetError::Closed)??;
        slot.factory.decode(&frame)
    }

    /// Like `read_anticipated` but fails with `NetError::Timeout` if nothing
    /// arrives within `timeout`, for the socket-level read timeout named in
    /// the concurrency model.
    pub async fn read_anticipated_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn Any + Send>, NetError> {
        tokio::time::timeout(timeout, self.read_anticipated())
            .await
            .map_err(|_| NetError::Timeout(timeout.as_millis() as u64))?
    }

    pub fn abort_reader(&self) {
        self.reader_task.abort();
    }
}

async fn read_one_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<RawFrame, NetError> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| NetError::Io(e.to_string()))?;
    let total_len = u32::from_be_bytes(len_buf);
    if total_len < 12 {
        return Err(NetError::Protocol("frame shorter than header".to_string()));
    }
    let mut rest = vec![0u8; total_len as usize];
    reader
        .read_exact(&mut rest)
        .await
        .map_err(|e| NetError::Io(e.to_string()))?;
    let class_id = u64::from_be_bytes(rest[0..8].try_into().unwrap());
    let version = u32::from_be_bytes(rest[8..12].try_into().unwrap());
    let payload = rest[12..].to_vec();
    Ok(RawFrame {
        class_id,
        version,
        payload,
    })
}

/// A bidirectional framed link: one output stream, one input stream, and a
/// shared `close()` used by the work group's break-connection action.
pub struct FramedDuplex {
    pub output: FramedOutputStream,
    pub input: Arc<FramedInputStream>,
}

impl FramedDuplex {
    pub fn new<R, W>(reader: R, writer: W, max_pending: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            output: FramedOutputStream::new(writer),
            input: Arc::new(FramedInputStream::new(reader, max_pending)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::duplex;
    use tokio::task::JoinSet;

    struct EchoFactory;
    impl MessageFactory for EchoFactory {
        fn decode(&self, frame: &RawFrame) -> Result<Box<dyn Any + Send>, NetError> {
            Ok(Box::new(frame.payload.clone()))
        }
    }

    #[tokio::test]
    async fn peer_hang_times_out_and_reader_task_does_not_leak() {
        // The peer hangs: `_client` never writes anything, so nothing ever
        // arrives and `read_anticipated_with_timeout`'s only exit is its
        // own timeout firing.
        let (_client, server) = duplex(64);
        let (server_r, _server_w) = tokio::io::split(server);
        let input = Arc::new(FramedInputStream::new(server_r, 4));
        input.anticipate_message(Box::new(EchoFactory)).await;

        // Drain through a JoinSet with a deadline, the way a caller bounds
        // how long it waits on a stalled peer rather than trusting the
        // inner timeout alone.
        let mut set = JoinSet::new();
        let waiter = input.clone();
        set.spawn(async move {
            waiter
                .read_anticipated_with_timeout(Duration::from_millis(50))
                .await
        });
        let joined = tokio::time::timeout(Duration::from_secs(2), set.join_next())
            .await
            .expect("draining task hung past the join deadline")
            .expect("join set was empty")
            .expect("reader task panicked");
        assert!(matches!(joined, Err(NetError::Timeout(_))));

        // The timeout firing doesn't by itself stop the background reader
        // task, still blocked in `read_exact` against the hung peer; a
        // caller that gives up on a peer must explicitly abort it, and that
        // abort must actually land rather than leak the task.
        input.abort_reader();
        let deadline = Instant::now() + Duration::from_secs(1);
        while !input.reader_task.is_finished() {
            if Instant::now() > deadline {
                panic!("reader task leaked past its abort deadline");
            }
            tokio::task::yield_now().await;
        }
    }
}
