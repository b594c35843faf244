//! Agent registry mapping identifiers to live connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;

use super::connection::AgentConnection;

/// One registration: a connection plus the session token it was stored with.
struct AgentEntry {
    conn: Arc<AgentConnection>,
    session: u64,
    connected_at: DateTime<Utc>,
}

/// Summary of a registered agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub session: u64,
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

/// Registry of connected agents.
///
/// Lookups and listings proceed concurrently; register and deregister take
/// the shard's write lock. Each registration gets a fresh session token so a
/// stale disconnect can never evict a newer connection for the same id.
pub struct AgentHub {
    /// Agent ID -> current registration
    agents: DashMap<String, AgentEntry>,

    /// Source of session tokens, strictly increasing
    next_session: AtomicU64,
}

impl AgentHub {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Register `conn` under `id`, replacing any existing entry.
    ///
    /// Returns the session token to hand back to [`AgentHub::deregister`].
    pub fn register(&self, id: &str, conn: Arc<AgentConnection>) -> u64 {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let peer = conn.peer().to_string();
        let previous = self.agents.insert(
            id.to_string(),
            AgentEntry {
                conn,
                session,
                connected_at: Utc::now(),
            },
        );

        match previous {
            Some(old) => info!(
                "Agent {} re-announced from {} (session {} replaces {})",
                id, peer, session, old.session
            ),
            None => info!("Registered agent {} from {} (session {})", id, peer, session),
        }
        session
    }

    /// Current connection for `id`.
    pub fn lookup(&self, id: &str) -> Option<Arc<AgentConnection>> {
        self.agents.get(id).map(|entry| Arc::clone(&entry.conn))
    }

    /// Session token of the current registration for `id`.
    pub fn session_of(&self, id: &str) -> Option<u64> {
        self.agents.get(id).map(|entry| entry.session)
    }

    /// Identifiers of all registered agents, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.agents.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Summaries of all registered agents, in no particular order.
    pub fn agents(&self) -> Vec<AgentSummary> {
        self.agents
            .iter()
            .map(|entry| AgentSummary {
                id: entry.key().clone(),
                session: entry.session,
                peer: entry.conn.peer().to_string(),
                connected_at: entry.connected_at,
            })
            .collect()
    }

    /// Remove `id` only if it is still registered with `session`.
    ///
    /// Returns whether an entry was removed.
    pub fn deregister(&self, id: &str, session: u64) -> bool {
        let removed = self
            .agents
            .remove_if(id, |_, entry| entry.session == session)
            .is_some();
        if removed {
            info!("Deregistered agent {} (session {})", id, session);
        } else {
            debug!("No registration for agent {} with session {}", id, session);
        }
        removed
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentHub {
    fn default() -> Self {
        Self::new()
    }
}
