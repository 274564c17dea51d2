//! Durable, ordered per-agent message queues with broadcast fan-out.

mod hub;
mod message;

pub use hub::MailboxHub;
pub use message::{Message, MessageKind};
