//! Hamagram prompt plugin.
//!
//! `prompt <text>` uploads a new prompt for the hamagrams site and announces
//! it on the ham base.
//!
//! Flow:
//! 1. Validate: no upload in flight, prompt length, per-user rate limit
//! 2. Claim the session's upload slot and spawn the upload in the background
//! 3. The background task reports the outcome through the callback bridge,
//!    followed by a second callback that releases its slot
//!
//! Only successful uploads count toward a user's rate limit.

use std::sync::Arc;

use regex::Regex;
use tracing::{error, info, warn};

use super::rate_limit::RateLimiter;
use crate::bot::dispatcher::{Dispatcher, Handler};
use crate::bot::normalizer::Message;
use crate::bot::session::Session;
use crate::storage::{Destination, HamagramConfig, UploadError, Uploader};
use crate::utils::{filter_prompt, mention};

const MIN_PROMPT_LENGTH: usize = 2;
const MAX_PROMPT_LENGTH: usize = 64;

const BUSY_REPLY: &str = "Sorry, I'm currently uploading a prompt. :ham:";

/// Result of a background upload, delivered on the event loop.
#[derive(Debug)]
pub enum UploadOutcome {
    Uploaded,
    Failed(UploadError),
}

/// What the success/failure callback needs to finish a submission.
#[derive(Debug, Clone)]
struct Submission {
    message: Message,
    /// Filtered prompt with spaces, for the announcement.
    display_prompt: String,
}

/// Handles `prompt <text>`.
pub struct Prompt {
    re_prompt: Regex,
    limiter: RateLimiter,
    uploader: Arc<dyn Uploader>,
    destination: Destination,
    /// Public site URL included in announcements.
    hamagrams_url: String,
}

impl Prompt {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        destination: Destination,
        hamagrams_url: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            re_prompt: Regex::new(r"^prompt\s+(.+)$")?,
            limiter: RateLimiter::default(),
            uploader,
            destination,
            hamagrams_url: hamagrams_url.into(),
        })
    }

    /// Replace the default rate limiter.
    #[must_use]
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Validate a submission. Returns the rejection reply, if any.
    fn validate(&mut self, prompt: &str, user: &str, session: &Session) -> Option<&'static str> {
        if session.is_uploading() {
            return Some(BUSY_REPLY);
        }
        if prompt.len() < MIN_PROMPT_LENGTH {
            return Some("Sorry, that prompt is too short. :ham:");
        }
        if prompt.len() > MAX_PROMPT_LENGTH {
            return Some("Sorry, that prompt is too long. :ham:");
        }
        if self.limiter.too_many_recent(user) {
            return Some("Sorry, you've changed the prompt too many times recently. :ham:");
        }
        None
    }

    /// Run the upload on its own task and report back through the bridge.
    fn spawn_upload(
        &self,
        payload: bytes::Bytes,
        submission: Submission,
        token: u64,
        session: &Session,
    ) {
        let uploader = Arc::clone(&self.uploader);
        let destination = self.destination.clone();
        let callbacks = session.callbacks().clone();

        tokio::spawn(async move {
            let outcome = match uploader.upload(payload, &destination).await {
                Ok(()) => UploadOutcome::Uploaded,
                Err(e) => UploadOutcome::Failed(e),
            };

            callbacks
                .enqueue(move |dispatcher: &mut Dispatcher, session: &mut Session| {
                    finish_upload(dispatcher, session, &submission, outcome);
                })
                .await;

            callbacks
                .enqueue(move |_: &mut Dispatcher, session: &mut Session| {
                    session.end_upload(token);
                })
                .await;
        });
    }
}

/// Completion callback. Runs on the event loop.
fn finish_upload(
    dispatcher: &mut Dispatcher,
    session: &mut Session,
    submission: &Submission,
    outcome: UploadOutcome,
) {
    let message = &submission.message;

    match outcome {
        UploadOutcome::Uploaded => {
            let in_broadcast_channel = session
                .broadcast_channel()
                .is_ok_and(|channel| channel.id == message.channel);
            if !in_broadcast_channel {
                session.reply(message, "I uploaded the prompt. :ham:");
            }

            let Some(prompt) = dispatcher.handler_mut::<Prompt>() else {
                warn!("Prompt handler missing; upload from {} not recorded", message.user);
                return;
            };
            prompt.limiter.record(&message.user);

            let announcement = format!(
                "New prompt submitted by {}:\n:sparkles:*{}*:sparkles:\n{}\nHam a nice day. :ham:",
                mention(&message.user),
                submission.display_prompt,
                prompt.hamagrams_url
            );
            if let Err(e) = session.announce(&announcement) {
                warn!("Prompt announcement failed: {}", e);
            }
        }
        UploadOutcome::Failed(e) => {
            error!("Upload failed: {}", e);
            session.reply(message, "Sorry, I couldn't upload the prompt. :ham:");
        }
    }
}

impl Handler for Prompt {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn handle(&mut self, message: &Message, session: &mut Session) -> bool {
        let Some(caps) = self.re_prompt.captures(&message.direct_text) else {
            return false;
        };
        let unfiltered = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let prompt = filter_prompt(unfiltered, false);
        if let Some(reason) = self.validate(&prompt, &message.user, session) {
            session.reply(message, reason);
            return true;
        }

        let payload = match (HamagramConfig { prompt: &prompt }).to_script() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to build prompt config: {}", e);
                session.reply(message, "Sorry, something went wrong. :ham:");
                return true;
            }
        };

        info!(
            "Prompt from @{}: {}",
            session.user_name(&message.user),
            String::from_utf8_lossy(&payload)
        );

        let Some(token) = session.begin_upload() else {
            session.reply(message, BUSY_REPLY);
            return true;
        };
        let submission = Submission {
            message: message.clone(),
            display_prompt: filter_prompt(unfiltered, true),
        };
        self.spawn_upload(payload, submission, token, session);
        true
    }
}
