//! Message normalizer.
//!
//! Decides whether an inbound message is addressed to the bot and extracts
//! the command text. A message is addressed when it starts with an at-mention
//! of the bot (`<@BOT> text` or `<@BOT>: text`) or when it arrives through a
//! direct session with the bot.

use regex::Regex;

use super::directory::Directory;
use crate::platform::MessageEvent;
use crate::utils::mention;

/// A message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The event as received from the platform.
    pub event: MessageEvent,
    /// Sender user ID.
    pub user: String,
    /// Channel the message arrived in.
    pub channel: String,
    /// Command text with the addressing removed. Never empty.
    pub direct_text: String,
    /// Prepended to replies. Empty in direct sessions.
    pub reply_prefix: String,
}

impl Message {
    /// Reply text addressed back to the sender.
    pub fn reply_text(&self, text: &str) -> String {
        format!("{}{}", self.reply_prefix, text)
    }
}

/// Compiled addressing rules for one bot identity.
#[derive(Debug, Clone)]
pub struct Normalizer {
    bot_id: String,
    at_bot: Regex,
}

impl Normalizer {
    pub fn new(bot_id: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r"^\s*<@{}>(\s*:)?\s+(.*?)\s*$", regex::escape(bot_id));
        Ok(Self {
            bot_id: bot_id.to_string(),
            at_bot: Regex::new(&pattern)?,
        })
    }

    /// Strip a leading at-mention of the bot.
    ///
    /// Returns the trimmed command text, or `None` if the text does not start
    /// with a mention of the bot.
    pub fn address<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.at_bot
            .captures(text)
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str())
    }

    /// Classify an event. `None` means the bot should ignore it.
    pub fn normalize(&self, event: &MessageEvent, directory: &Directory) -> Option<Message> {
        if event.user == self.bot_id {
            return None;
        }

        let in_direct_session = directory.direct_session(&event.channel).is_some();

        let (direct_text, reply_prefix) = match self.address(&event.text) {
            Some(text) if !text.is_empty() => {
                let prefix = if in_direct_session {
                    String::new()
                } else {
                    format!("{} ", mention(&event.user))
                };
                (text.to_string(), prefix)
            }
            _ if in_direct_session && !event.text.is_empty() => (event.text.clone(), String::new()),
            _ => return None,
        };

        Some(Message {
            event: event.clone(),
            user: event.user.clone(),
            channel: event.channel.clone(),
            direct_text,
            reply_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::directory::{NamedEntry, SessionEntry, Snapshot};

    const BOT: &str = "UBOT";

    fn directory() -> Directory {
        Directory::from_snapshot(&Snapshot {
            users: vec![NamedEntry::new("U1", "alice")],
            channels: vec![NamedEntry::new("C1", "general")],
            direct_sessions: vec![SessionEntry::new("D1", "U1")],
            ..Default::default()
        })
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(BOT).unwrap()
    }

    #[test]
    fn test_address_forms() {
        let n = normalizer();
        assert_eq!(n.address("<@UBOT> ham"), Some("ham"));
        assert_eq!(n.address("<@UBOT>: ham"), Some("ham"));
        assert_eq!(n.address("  <@UBOT> :  prompt hello  "), Some("prompt hello"));
        assert_eq!(n.address("<@UBOT>ham"), None);
        assert_eq!(n.address("hey <@UBOT> ham"), None);
        assert_eq!(n.address("<@UOTHER> ham"), None);
    }

    #[test]
    fn test_self_messages_are_discarded() {
        let n = normalizer();
        let dir = directory();
        assert!(n.normalize(&MessageEvent::new(BOT, "C1", "<@UBOT> ham"), &dir).is_none());
        assert!(n.normalize(&MessageEvent::new(BOT, "D1", "ham"), &dir).is_none());
    }

    #[test]
    fn test_public_mention_gets_reply_prefix() {
        let msg = normalizer()
            .normalize(&MessageEvent::new("U1", "C1", "  <@UBOT>:  take ham  "), &directory())
            .unwrap();
        assert_eq!(msg.direct_text, "take ham");
        assert_eq!(msg.reply_prefix, "<@U1> ");
        assert_eq!(msg.reply_text("ok"), "<@U1> ok");
    }

    #[test]
    fn test_mention_in_direct_session_has_no_prefix() {
        let msg = normalizer()
            .normalize(&MessageEvent::new("U1", "D1", "  <@UBOT>:  take ham  "), &directory())
            .unwrap();
        assert_eq!(msg.direct_text, "take ham");
        assert_eq!(msg.reply_prefix, "");
    }

    #[test]
    fn test_direct_session_text_is_verbatim() {
        let msg = normalizer()
            .normalize(&MessageEvent::new("U1", "D1", "  prompt  ham  "), &directory())
            .unwrap();
        assert_eq!(msg.direct_text, "  prompt  ham  ");
        assert!(msg.reply_prefix.is_empty());
    }

    #[test]
    fn test_unaddressed_public_message_is_discarded() {
        let n = normalizer();
        let dir = directory();
        assert!(n.normalize(&MessageEvent::new("U1", "C1", "ham"), &dir).is_none());
        assert!(n.normalize(&MessageEvent::new("U1", "C1", "<@UBOT> "), &dir).is_none());
    }

    #[test]
    fn test_bot_id_is_matched_literally() {
        let n = Normalizer::new("U.B").unwrap();
        assert_eq!(n.address("<@U.B> ham"), Some("ham"));
        assert_eq!(n.address("<@UXB> ham"), None);
    }
}
