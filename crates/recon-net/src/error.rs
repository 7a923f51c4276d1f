// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use recon_types::ReconnectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(String),
    #[error("stream closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("socket timed out after {0}ms")]
    Timeout(u64),
}

impl From<NetError> for ReconnectError {
    fn from(e: NetError) -> Self {
        ReconnectError::TransportFailure {
            cause: e.to_string(),
        }
    }
}
