//! Ham echo plugin.
//!
//! Answers `ham` with ham.

use tracing::info;

use crate::bot::dispatcher::Handler;
use crate::bot::normalizer::Message;
use crate::bot::session::Session;

/// Handles the `ham` command (case-insensitive, exact).
#[derive(Debug, Default)]
pub struct Echo;

impl Echo {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn handle(&mut self, message: &Message, session: &mut Session) -> bool {
        if !message.direct_text.eq_ignore_ascii_case("ham") {
            return false;
        }

        info!("Echoing ham from @{}", session.user_name(&message.user));
        session.reply(message, "ham :ham:");
        true
    }
}
