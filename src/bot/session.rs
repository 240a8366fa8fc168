//! Session state shared by all handlers.
//!
//! The session owns the entity directory, the bot identity and the outgoing
//! sink. It is only ever touched from the event loop, either directly by
//! handlers or by callbacks drained from the bridge.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::callbacks::CallbackSender;
use super::directory::{Directory, Entity, EntityKind};
use super::normalizer::Message;
use crate::platform::{BotIdentity, ConnectInfo, Outgoing};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("broadcast channel '{0}' not found")]
    BroadcastChannelNotFound(String),
}

/// State shared by every handler. The directory is replaced on each connect;
/// the upload slot outlives it.
pub struct Session {
    bot: BotIdentity,
    directory: Directory,
    outgoing: Arc<dyn Outgoing>,
    callbacks: CallbackSender,
    /// Name of the channel announcements go to.
    broadcast_channel: String,
    /// Token of the upload in flight. Survives reconnects.
    upload: Option<u64>,
    next_upload: u64,
}

impl Session {
    pub fn new(
        outgoing: Arc<dyn Outgoing>,
        callbacks: CallbackSender,
        broadcast_channel: impl Into<String>,
    ) -> Self {
        Self {
            bot: BotIdentity::default(),
            directory: Directory::default(),
            outgoing,
            callbacks,
            broadcast_channel: broadcast_channel.into(),
            upload: None,
            next_upload: 0,
        }
    }

    /// Whether an upload is in flight anywhere.
    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    /// Claim the single upload slot. Returns `None` while another upload is
    /// in flight.
    pub fn begin_upload(&mut self) -> Option<u64> {
        if self.upload.is_some() {
            return None;
        }
        self.next_upload += 1;
        self.upload = Some(self.next_upload);
        self.upload
    }

    /// Release the upload slot if `token` still holds it.
    pub fn end_upload(&mut self, token: u64) {
        if self.upload == Some(token) {
            self.upload = None;
        } else {
            debug!("Ignoring stale upload token {}", token);
        }
    }

    /// Begin a new connection epoch, discarding the previous directory.
    pub fn start(&mut self, info: &ConnectInfo) {
        self.bot = info.bot.clone();
        self.directory.rebuild(&info.snapshot);
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Handle for background tasks to report back to the event loop.
    pub fn callbacks(&self) -> &CallbackSender {
        &self.callbacks
    }

    /// Display name for logs, falling back to the raw ID.
    pub fn user_name(&self, id: &str) -> String {
        self.directory
            .user(id)
            .and_then(|u| u.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn send(&self, text: &str, channel: &str) {
        self.outgoing.send(text, channel);
    }

    /// Reply to a message in the channel it came from.
    pub fn reply(&self, message: &Message, text: &str) {
        self.send(&message.reply_text(text), &message.channel);
    }

    /// Resolve the configured broadcast channel (public first, then private).
    pub fn broadcast_channel(&self) -> Result<Arc<Entity>, SessionError> {
        self.directory
            .resolve_by_name(EntityKind::Channel, &self.broadcast_channel)
            .or_else(|| {
                self.directory
                    .resolve_by_name(EntityKind::Group, &self.broadcast_channel)
            })
            .ok_or_else(|| SessionError::BroadcastChannelNotFound(self.broadcast_channel.clone()))
    }

    /// Post to the broadcast channel.
    pub fn announce(&self, text: &str) -> Result<(), SessionError> {
        let channel = self.broadcast_channel()?;
        debug!("Announcing in #{}", self.broadcast_channel);
        self.send(text, &channel.id);
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Session fixtures shared by handler tests.

    use super::*;
    use crate::bot::directory::{NamedEntry, SessionEntry, Snapshot};

    pub const BOT_ID: &str = "UBOT";
    pub const ALICE: &str = "U1";
    pub const BOB: &str = "U2";
    pub const CAROL: &str = "U3";
    pub const GENERAL: &str = "C1";
    pub const HAM_BASE: &str = "C2";
    pub const ALICE_DM: &str = "D1";

    pub fn snapshot() -> Snapshot {
        Snapshot {
            users: vec![
                NamedEntry::new(BOT_ID, "hambot"),
                NamedEntry::new(ALICE, "alice"),
                NamedEntry::new(BOB, "bob"),
                NamedEntry::new(CAROL, "carol"),
            ],
            channels: vec![
                NamedEntry::new(GENERAL, "general"),
                NamedEntry::new(HAM_BASE, "ham-base"),
            ],
            groups: vec![],
            direct_sessions: vec![SessionEntry::new(ALICE_DM, ALICE)],
        }
    }

    pub fn connect_info() -> ConnectInfo {
        ConnectInfo {
            bot: BotIdentity {
                id: BOT_ID.to_string(),
                name: "hambot".to_string(),
            },
            snapshot: snapshot(),
        }
    }

    /// A started session with `ham-base` as the broadcast channel.
    pub fn session(outgoing: Arc<dyn Outgoing>, callbacks: CallbackSender) -> Session {
        let mut session = Session::new(outgoing, callbacks, "ham-base");
        session.start(&connect_info());
        session
    }
}
