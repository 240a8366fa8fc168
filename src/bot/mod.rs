//! Bot module - Core bot functionality.

pub mod callbacks;
pub mod directory;
pub mod dispatcher;
pub mod normalizer;
mod runtime;
pub mod session;

pub use runtime::run;
