//! Bot-level error types.
//!
//! Each boundary gets its own enum; `anyhow` carries arbitrary failures
//! out of handlers and plugin hooks, and these wrappers classify them at
//! the bus and runtime edges.

use thiserror::Error;

/// Event bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// A handler returned an error while fault suppression was disabled.
    #[error("event handler failed: {0}")]
    Handler(anyhow::Error),

    /// A handler panicked while running in isolated mode.
    #[error("event handler panicked: {0}")]
    HandlerPanic(String),
}

/// Plugin lifecycle errors.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no plugin registered as {0}")]
    Unknown(String),

    #[error("plugin {0} is not loaded")]
    NotLoaded(String),

    #[error("plugin {name} failed to start: {cause}")]
    Start {
        name: String,
        cause: anyhow::Error,
    },
}
