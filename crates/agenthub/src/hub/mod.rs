//! Realtime agent orchestration hub.
//!
//! Remote agents hold one WebSocket each. The hub keeps a registry of who is
//! connected, lets callers push commands to a named agent, and matches each
//! agent's asynchronous result back to the caller waiting on it.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP handlers                                   agent connections
//!  ─────────────                                   ─────────────────
//!  Dispatcher ──lookup──▶ AgentHub ◀──register──── MessageRouter (1 per conn)
//!      │                     │                          │
//!      │ register rid        │ Arc<AgentConnection>     │ resolve rid
//!      ▼                     ▼                          ▼
//!  PendingRequests ◀── send(frame) under write lock ── PendingRequests
//! ```
//!
//! Nothing here is global: an [`Orchestrator`] is built once at startup and
//! handed to whatever mounts the HTTP routes and accepts connections.

mod connection;
mod dispatcher;
mod error;
mod payload;
mod pending;
mod registry;
mod router;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use connection::{AgentConnection, FrameSink};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, HubError, HubResult};
pub use payload::normalize_ids;
pub use pending::{PendingReply, PendingRequests, WaitError};
pub use registry::{AgentHub, AgentSummary};
pub use router::MessageRouter;

/// Hub tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// How long a request/await call waits for its correlated result.
    pub request_timeout_secs: u64,
    /// Log-tail length used when a request omits `lines` or sends <= 0.
    pub default_log_lines: u32,
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            default_log_lines: 200,
        }
    }
}

/// The hub's shared state and the two components built on it.
#[derive(Clone)]
pub struct Orchestrator {
    pub hub: Arc<AgentHub>,
    pub pending: PendingRequests,
    pub dispatcher: Dispatcher,
    pub router: MessageRouter,
}

impl Orchestrator {
    /// Empty registry and pending table.
    pub fn new(config: HubConfig) -> Self {
        let hub = Arc::new(AgentHub::new());
        let pending = PendingRequests::new();
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&hub), pending.clone(), config),
            router: MessageRouter::new(Arc::clone(&hub), pending.clone()),
            hub,
            pending,
        }
    }
}
