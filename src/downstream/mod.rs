// ABOUTME: Downstream server module: classifies requests and fans the ring out to many players

pub mod classify;
pub mod error;
pub mod server;

pub use classify::Classification;
pub use error::ServerError;
pub use server::Server;
