//! Message dispatcher.
//!
//! Normalizes inbound messages and hands them to the registered handlers in
//! registration order. The first handler that claims a message wins.

use std::any::Any;

use thiserror::Error;
use tracing::debug;

use super::normalizer::{Message, Normalizer};
use super::session::Session;
use crate::platform::MessageEvent;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid addressing pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Type-erased access to a handler, used by callbacks to find their handler.
pub trait AsAny {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A command handler.
pub trait Handler: AsAny + Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Handle a message. Returns `true` if the message was claimed.
    fn handle(&mut self, message: &Message, session: &mut Session) -> bool;
}

/// Routes messages to handlers.
pub struct Dispatcher {
    normalizer: Normalizer,
    handlers: Vec<Box<dyn Handler>>,
}

impl Dispatcher {
    /// Create a dispatcher for the given bot identity.
    pub fn new(bot_id: &str) -> Result<Self, DispatchError> {
        Ok(Self {
            normalizer: Normalizer::new(bot_id)?,
            handlers: Vec::new(),
        })
    }

    /// Append a handler. Earlier handlers take priority.
    pub fn register<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        debug!("Registered handler: {}", handler.name());
        self.handlers.push(Box::new(handler));
        self
    }

    /// Handler names in priority order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Find a registered handler by type.
    pub fn handler_mut<H: Handler + 'static>(&mut self) -> Option<&mut H> {
        self.handlers
            .iter_mut()
            .find_map(|h| h.as_mut().as_any_mut().downcast_mut::<H>())
    }

    /// Dispatch a raw message event.
    ///
    /// Returns the name of the handler that claimed it, if any.
    pub fn dispatch(&mut self, event: &MessageEvent, session: &mut Session) -> Option<&'static str> {
        let message = self.normalizer.normalize(event, session.directory())?;

        for handler in self.handlers.iter_mut() {
            if handler.handle(&message, session) {
                return Some(handler.name());
            }
        }

        debug!(
            "No handler for '{}' from {}",
            message.direct_text.chars().take(30).collect::<String>(),
            message.user
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::bot::callbacks;
    use crate::bot::session::testing::*;
    use crate::platform::testing::RecordingOutgoing;

    /// Claims messages whose text starts with `prefix` and records every call.
    struct Probe {
        label: &'static str,
        prefix: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Handler for Probe {
        fn name(&self) -> &'static str {
            self.label
        }

        fn handle(&mut self, message: &Message, _session: &mut Session) -> bool {
            self.seen.lock().unwrap().push(self.label);
            message.direct_text.starts_with(self.prefix)
        }
    }

    fn setup() -> (Dispatcher, Session, Arc<Mutex<Vec<&'static str>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(BOT_ID).unwrap();
        dispatcher
            .register(Probe { label: "first", prefix: "ham", seen: seen.clone() })
            .register(Probe { label: "second", prefix: "h", seen: seen.clone() })
            .register(Probe { label: "third", prefix: "", seen: seen.clone() });
        let (tx, _rx) = callbacks::channel(1);
        let session = session(Arc::new(RecordingOutgoing::new()), tx);
        (dispatcher, session, seen)
    }

    #[test]
    fn test_first_claiming_handler_wins() {
        let (mut dispatcher, mut session, seen) = setup();

        let claimed = dispatcher.dispatch(&MessageEvent::new(ALICE, ALICE_DM, "hello"), &mut session);
        assert_eq!(claimed, Some("second"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_registration_order_is_priority() {
        let (mut dispatcher, mut session, seen) = setup();
        assert_eq!(dispatcher.handler_names(), vec!["first", "second", "third"]);

        let claimed = dispatcher.dispatch(&MessageEvent::new(ALICE, ALICE_DM, "ham"), &mut session);
        assert_eq!(claimed, Some("first"));
        assert_eq!(*seen.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_self_message_has_no_effect() {
        let (mut dispatcher, mut session, seen) = setup();

        let claimed = dispatcher.dispatch(&MessageEvent::new(BOT_ID, ALICE_DM, "ham"), &mut session);
        assert_eq!(claimed, None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unaddressed_message_reaches_no_handler() {
        let (mut dispatcher, mut session, seen) = setup();

        let claimed = dispatcher.dispatch(&MessageEvent::new(ALICE, GENERAL, "ham"), &mut session);
        assert_eq!(claimed, None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unclaimed_message_is_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(BOT_ID).unwrap();
        dispatcher.register(Probe { label: "only", prefix: "ham", seen: seen.clone() });
        let (tx, _rx) = callbacks::channel(1);
        let mut session = session(Arc::new(RecordingOutgoing::new()), tx);

        let claimed = dispatcher.dispatch(&MessageEvent::new(ALICE, GENERAL, "<@UBOT> bacon"), &mut session);
        assert_eq!(claimed, None);
        assert_eq!(*seen.lock().unwrap(), vec!["only"]);
    }

    #[test]
    fn test_handler_lookup_by_type() {
        let (mut dispatcher, _session, _seen) = setup();
        let probe = dispatcher.handler_mut::<Probe>().unwrap();
        assert_eq!(probe.label, "first");

        let mut empty = Dispatcher::new(BOT_ID).unwrap();
        assert!(empty.handler_mut::<Probe>().is_none());
    }
}
