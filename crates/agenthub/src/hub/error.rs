//! Error type for hub operations.

use std::time::Duration;

use thiserror::Error;

/// Boxed transport error from the underlying connection.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to callers of the hub.
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum HubError {
    /// No live registration for the agent identifier.
    #[error("agent {0:?} not found")]
    NotFound(String),

    /// Writing to the agent's connection failed.
    #[error("sending {operation} to agent {agent:?} failed: {source}")]
    Transport {
        agent: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// No correlated reply arrived in time.
    #[error("timeout waiting for {operation} from agent {agent:?} after {}s", .elapsed.as_secs())]
    Timeout {
        agent: String,
        operation: &'static str,
        elapsed: Duration,
    },

    /// The request payload was rejected before any network interaction.
    #[error("invalid payload: {0}")]
    MalformedInput(String),

    /// The reply slot was dropped without a value.
    #[error("reply channel for agent {0:?} closed")]
    ReplyDropped(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HubError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn transport(
        agent: impl Into<String>,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Transport {
            agent: agent.into(),
            operation,
            source: source.into(),
        }
    }
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;
