// ABOUTME: Error type for the upstream client's two-phase MMS-HTTP session

use crate::packet::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure. Retryable per the client's backoff policy.
    #[error("upstream connection error: {0}")]
    Io(#[from] io::Error),

    /// Malformed MMS packet framing. Not retryable.
    #[error("malformed MMS packet: {0}")]
    Codec(#[from] CodecError),

    /// HTTP status outside [200, 300). Not retryable.
    #[error("upstream request not succeeded: {status} {reason}")]
    RequestNotSucceeded { status: u16, reason: String },

    /// The response had no parseable status line at all.
    #[error("upstream sent an unparseable status line: {0:?}")]
    BadStatusLine(String),
}

impl ClientError {
    /// A socket error triggers the retry/backoff policy; HTTP-level
    /// and framing failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Io(_))
    }
}
