// ABOUTME: Error type for a single downstream handler's socket/protocol failures

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket-level failure while reading or writing a downstream connection.
    /// Drops that one handler; other clients and the upstream are unaffected.
    #[error("downstream connection error: {0}")]
    Io(#[from] io::Error),
}
