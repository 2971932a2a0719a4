// crates/core/src/lib.rs
pub mod context;
pub mod error;
pub mod media;
pub mod recording;
pub mod render;
pub mod session;
pub mod tickets;
pub mod transport;

pub use context::*;
pub use error::*;
pub use recording::{AudioClip, Microphone, Recorder, RecorderState};
pub use render::{Alignment, Body, RenderedMessage, Renderer};
pub use session::*;
pub use tickets::*;
pub use transport::*;
