//! Announcement plugin.
//!
//! Lets the configured announcer broadcast to the ham base. Anyone else is
//! ignored without a reply, so the announcer's identity is never revealed.

use regex::Regex;
use tracing::{info, warn};

use crate::bot::dispatcher::Handler;
use crate::bot::normalizer::Message;
use crate::bot::session::Session;

/// Handles `announce <text>`.
#[derive(Debug)]
pub struct Announce {
    re_announce: Regex,
    /// User name allowed to announce.
    announcer: Option<String>,
}

impl Announce {
    pub fn new(announcer: Option<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            re_announce: Regex::new(r"^announce\s+(.*)$")?,
            announcer,
        })
    }

    /// Whether `user` is the announcer in the current directory.
    fn is_announcer(&self, user: &str, session: &Session) -> bool {
        self.announcer
            .as_deref()
            .and_then(|name| session.directory().user_by_name(name))
            .is_some_and(|allowed| allowed.id == user)
    }
}

impl Handler for Announce {
    fn name(&self) -> &'static str {
        "announce"
    }

    fn handle(&mut self, message: &Message, session: &mut Session) -> bool {
        let Some(caps) = self.re_announce.captures(&message.direct_text) else {
            return false;
        };

        if !self.is_announcer(&message.user, session) {
            warn!("Announce rejected: @{} is not the announcer", session.user_name(&message.user));
            return false;
        }

        let text = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        info!("Announce '{}'", text);

        if let Err(e) = session.announce(text) {
            warn!("Announce failed: {}", e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bot::callbacks;
    use crate::bot::dispatcher::Dispatcher;
    use crate::bot::session::testing::*;
    use crate::platform::MessageEvent;
    use crate::platform::testing::RecordingOutgoing;

    fn setup(announcer: Option<&str>) -> (Dispatcher, Session, RecordingOutgoing) {
        let outgoing = RecordingOutgoing::new();
        let (tx, _rx) = callbacks::channel(1);
        let session = session(Arc::new(outgoing.clone()), tx);
        let mut dispatcher = Dispatcher::new(BOT_ID).unwrap();
        dispatcher.register(Announce::new(announcer.map(String::from)).unwrap());
        (dispatcher, session, outgoing)
    }

    #[test]
    fn test_announcer_broadcasts() {
        let (mut dispatcher, mut session, outgoing) = setup(Some("carol"));

        let claimed = dispatcher.dispatch(
            &MessageEvent::new(CAROL, GENERAL, "<@UBOT> announce Ham is served"),
            &mut session,
        );

        assert_eq!(claimed, Some("announce"));
        assert_eq!(outgoing.sent(), vec![(HAM_BASE.to_string(), "Ham is served".to_string())]);
    }

    #[test]
    fn test_non_announcer_is_silently_ignored() {
        let (mut dispatcher, mut session, outgoing) = setup(Some("carol"));

        let claimed = dispatcher.dispatch(
            &MessageEvent::new(ALICE, ALICE_DM, "announce secret"),
            &mut session,
        );

        assert_eq!(claimed, None);
        assert!(outgoing.sent().is_empty());
    }

    #[test]
    fn test_unknown_announcer_name_allows_nobody() {
        let (mut dispatcher, mut session, outgoing) = setup(Some("dave"));
        dispatcher.dispatch(&MessageEvent::new(CAROL, GENERAL, "<@UBOT> announce hi"), &mut session);
        assert!(outgoing.sent().is_empty());

        let (mut dispatcher, mut session, outgoing) = setup(None);
        dispatcher.dispatch(&MessageEvent::new(CAROL, GENERAL, "<@UBOT> announce hi"), &mut session);
        assert!(outgoing.sent().is_empty());
    }

    #[test]
    fn test_missing_broadcast_channel_is_handled() {
        let outgoing = RecordingOutgoing::new();
        let (tx, _rx) = callbacks::channel(1);
        let mut session = Session::new(Arc::new(outgoing.clone()), tx, "no-such-channel");
        session.start(&connect_info());
        let mut dispatcher = Dispatcher::new(BOT_ID).unwrap();
        dispatcher.register(Announce::new(Some("carol".into())).unwrap());

        let claimed = dispatcher.dispatch(
            &MessageEvent::new(CAROL, GENERAL, "<@UBOT> announce hi"),
            &mut session,
        );

        assert_eq!(claimed, Some("announce"));
        assert!(outgoing.sent().is_empty());
    }
}
