//! Chat platform boundary.
//!
//! The bot core only sees the typed [`Event`] stream and the [`Outgoing`]
//! sink. The Slack implementation lives in [`slack`].

pub mod slack;

use thiserror::Error;

use crate::bot::directory::Snapshot;

/// Identity of the bot account on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

/// Delivered once per (re)connect.
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    pub bot: BotIdentity,
    pub snapshot: Snapshot,
}

/// A plain text message posted in a channel the bot can see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub user: String,
    pub channel: String,
    pub text: String,
}

impl MessageEvent {
    pub fn new(user: impl Into<String>, channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
            text: text.into(),
        }
    }
}

/// Errors reported by the platform connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not decode incoming frame: {0}")]
    Unmarshalling(String),

    #[error("message too long for channel {channel} ({len} chars)")]
    MessageTooLong { channel: String, len: usize },

    #[error("failed to send message to {channel}: {reason}")]
    Outgoing { channel: String, reason: String },

    #[error("incoming stream error: {0}")]
    Incoming(String),

    #[error("failed to acknowledge envelope {0}")]
    Ack(String),

    #[error("connection lost: {0}")]
    Connection(String),

    #[error("authentication rejected: {0}")]
    InvalidAuth(String),
}

impl TransportError {
    /// Fatal errors end the event loop; everything else is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::InvalidAuth(_))
    }
}

/// Events produced by the platform connection.
#[derive(Debug, Clone)]
pub enum Event {
    Connected(ConnectInfo),
    Message(MessageEvent),
    Error(TransportError),
}

/// Fire-and-forget message sink.
///
/// Implementations must not block: the event loop calls this directly.
pub trait Outgoing: Send + Sync {
    fn send(&self, text: &str, channel: &str);
}
