//! Plugin system for command handlers.
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Registering the handler in `register_all()`
//!
//! Registration order is priority order.

pub mod announce;
pub mod echo;
pub mod prompt;
pub mod rate_limit;

use std::sync::Arc;

use crate::bot::dispatcher::Dispatcher;
use crate::config::Config;
use crate::storage::{Destination, Uploader};

pub use announce::Announce;
pub use echo::Echo;
pub use prompt::Prompt;

/// Register every plugin with a fresh dispatcher.
pub fn register_all(
    dispatcher: &mut Dispatcher,
    config: &Config,
    uploader: Arc<dyn Uploader>,
) -> Result<(), regex::Error> {
    dispatcher
        .register(Echo::new())
        .register(Prompt::new(
            uploader,
            Destination::new(config.storage.key.clone()),
            config.hamagrams_url.clone(),
        )?)
        .register(Announce::new(config.announcer.clone())?);
    Ok(())
}
