//! # Runtime Errors
//!
//! Two error surfaces exist in this system and they must not be conflated:
//!
//! - [`ClusterError`] is the infrastructure error type (broker, registry,
//!   codec). It is what the runtime's own plumbing returns.
//! - [`ActorFailure`] is the *actor-level* failure value. Whether an actor
//!   dies because a handler returned an error or because someone called
//!   `exit` explicitly, the same value travels through the scheduler's
//!   termination path, across the wire in parent-exit notifications, and
//!   into `CHILD_PROCESS_EXIT` messages.

use serde::{Deserialize, Serialize};

/// Errors that can occur within the cluster runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("broker closed")]
    BrokerClosed,
    #[error("registry closed")]
    RegistryClosed,
    #[error("malformed envelope: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("module not registered: {0}")]
    ModuleNotFound(String),
}

/// The unified failure value carried by a terminating actor.
///
/// An actor that exits cleanly carries no cause; an actor that exits because
/// a hook failed (or because a peer asked it to die) carries a human-readable
/// cause string. The value is serializable because it crosses the broker in
/// parent-exit envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}", cause.as_deref().unwrap_or("process exited"))]
pub struct ActorFailure {
    pub cause: Option<String>,
}

impl ActorFailure {
    /// A failure with a cause, used for every error-driven exit.
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: Some(cause.into()),
        }
    }

    /// A clean exit with no cause attached.
    pub fn clean() -> Self {
        Self { cause: None }
    }
}

impl From<ClusterError> for ActorFailure {
    fn from(err: ClusterError) -> Self {
        Self::new(err.to_string())
    }
}
