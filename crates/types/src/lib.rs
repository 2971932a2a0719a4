// crates/types/src/lib.rs
//! Shared data model and wire protocol for the helpdesk agent console.
pub mod id;
pub mod lenient;
pub mod message;
pub mod protocol;
pub mod ticket;

pub use id::Id;
pub use message::{ChatMessage, MessageType};
pub use protocol::*;
pub use ticket::{Language, Ticket, TicketContact, TicketMeta, TicketStatus};
