// crates/client/src/lib.rs
pub mod api;
pub mod codec;
pub mod config;
pub mod connection;
pub mod console;

pub use api::{ApiClient, ApiError};
pub use config::ConsoleConfig;
pub use connection::{ConnectionManager, SocketEvent, SocketHandle, TransportError};
pub use console::{Console, ConsoleError};
