//! Bot runtime - the single-consumer event loop.
//!
//! One task owns the session and the dispatcher. It alternates between
//! platform events and callbacks queued by background work, so nothing else
//! ever touches handler or directory state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::callbacks::{self, CALLBACK_CAPACITY};
use super::directory::EntityKind;
use super::dispatcher::{DispatchError, Dispatcher};
use super::session::Session;
use crate::config::Config;
use crate::platform::{ConnectInfo, Event, Outgoing};
use crate::plugins;
use crate::storage::Uploader;

/// Run the event loop until the event stream ends or a fatal error arrives.
pub async fn run(
    config: &Config,
    mut events: mpsc::Receiver<Event>,
    outgoing: Arc<dyn Outgoing>,
    uploader: Arc<dyn Uploader>,
) -> anyhow::Result<()> {
    let (callback_tx, mut callback_rx) = callbacks::channel(CALLBACK_CAPACITY);
    let mut session = Session::new(outgoing, callback_tx, config.ham_base.clone());
    let mut dispatcher: Option<Dispatcher> = None;

    loop {
        tokio::select! {
            Some(callback) = callback_rx.recv() => {
                match dispatcher.as_mut() {
                    Some(dispatcher) => callback(dispatcher, &mut session),
                    None => warn!("Dropping callback received before connect"),
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    info!("Event stream closed");
                    break;
                };

                match event {
                    Event::Connected(info) => {
                        dispatcher = Some(connect(&mut session, &info, config, &uploader)?);
                    }
                    Event::Message(message) => match dispatcher.as_mut() {
                        Some(dispatcher) => {
                            if let Some(handler) = dispatcher.dispatch(&message, &mut session) {
                                debug!("Message from {} handled by {}", message.user, handler);
                            }
                        }
                        None => debug!("Ignoring message received before connect"),
                    },
                    Event::Error(e) if e.is_fatal() => {
                        error!("Fatal error: {}", e);
                        return Err(e.into());
                    }
                    Event::Error(e) => warn!("Error: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Start a new connection epoch: rebuild the directory and the handlers.
fn connect(
    session: &mut Session,
    info: &ConnectInfo,
    config: &Config,
    uploader: &Arc<dyn Uploader>,
) -> Result<Dispatcher, DispatchError> {
    session.start(info);

    let directory = session.directory();
    info!(
        "Connected as @{} ({} users, {} channels, {} groups, {} direct sessions)",
        session.bot().name,
        directory.len(EntityKind::User),
        directory.len(EntityKind::Channel),
        directory.len(EntityKind::Group),
        directory.len(EntityKind::DirectSession),
    );

    let mut dispatcher = Dispatcher::new(&session.bot().id)?;
    plugins::register_all(&mut dispatcher, config, Arc::clone(uploader))?;
    debug!("Handlers: {:?}", dispatcher.handler_names());

    Ok(dispatcher)
}
