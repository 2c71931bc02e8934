pub mod asf;
pub mod config;
pub mod connection;
pub mod downstream;
pub mod events;
pub mod liveness;
pub mod packet;
pub mod plugin;
pub mod playlist;
pub mod pragma;
pub mod ring;
pub mod upstream;

pub use config::{ClientOptions, ConfigError, LoggingOptions, Options, ServerOptions};
pub use downstream::{Server, ServerError};
pub use events::{Event, EventBus, Subscriber};
pub use packet::{InfoPacket, Marker, Packet};
pub use ring::Ring;
pub use upstream::{ClientState, UpstreamClient};

/// Error returned by the binaries' top-level `main` functions.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for application-level operations.
pub type Result<T> = std::result::Result<T, Error>;
