//! Error taxonomy for the decision engine.
//!
//! Signal and dispatch failures are absorbed where they happen; configuration
//! errors reject a whole rule set or config atomically. Plumbing code (database
//! worker, config file I/O, CLI) uses `anyhow` instead.

use thiserror::Error;

/// A poller could not produce a reading this cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{signal} signal unavailable: {reason}")]
pub struct SignalUnavailable {
    pub signal: &'static str,
    pub reason: String,
}

impl SignalUnavailable {
    pub fn new(signal: &'static str, reason: impl Into<String>) -> Self {
        Self {
            signal,
            reason: reason.into(),
        }
    }
}

/// A delivery or batch flush could not be handed to the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    SignalUnavailable(#[from] SignalUnavailable),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error(transparent)]
    DispatchFailed(#[from] DispatchError),

    #[error("notification {notification_id} already {state}; ignoring {attempted}")]
    SchedulerStateConflict {
        notification_id: String,
        state: &'static str,
        attempted: &'static str,
    },
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::ConfigInvalid(message.into())
    }
}
