//! Messaging channel (LINE).
//!
//! Webhook envelope parsing into [`InboundEvent`]s, and the [`Messenger`] trait the pipeline uses
//! to download image content and to reply/push text. [`LineChannel`] is the HTTP implementation.

mod inbound;
mod line;
mod messenger;
mod webhook;

pub use inbound::{EventKind, InboundEvent, MessageType, ReplyToken, UNKNOWN_USER};
pub use line::LineChannel;
pub use messenger::{ChannelError, Messenger};
pub use webhook::{route, Events, MalformedPayload};
