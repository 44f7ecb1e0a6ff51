//! Telegram platform adapter.
//!
//! The rest of the gateway only sees the [`Gateway`] trait — drafts, final
//! messages, documents, and downloads — so turns are testable without the
//! network. [`gateway::TelegramGateway`] is the teloxide-backed
//! implementation; [`inbound`] owns the update dispatcher and the command
//! surface.

pub mod gateway;
pub mod inbound;

pub use gateway::{Destination, Gateway, ParseMode, SendError, TelegramGateway};
pub use inbound::{run_dispatcher, Attachment, InboundMessage};
