// ABOUTME: Upstream client module: owns the outbound MMS-HTTP session to the origin server

pub mod client;
pub mod error;

pub use client::{CapturedResponse, ClientState, UpstreamClient};
pub use error::ClientError;
