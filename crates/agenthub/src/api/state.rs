//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::hub::{AgentHub, Dispatcher, MessageRouter, Orchestrator, PendingRequests};
use crate::scripts::ScriptService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry of connected agents.
    pub hub: Arc<AgentHub>,
    /// In-flight requests awaiting an agent result.
    pub pending: PendingRequests,
    /// Command dispatch to agents.
    pub dispatcher: Dispatcher,
    /// Reader loop run once per agent connection.
    pub router: MessageRouter,
    /// External script execution and progress.
    pub scripts: ScriptService,
    /// Effective configuration.
    pub config: Arc<AppConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create application state with a process-backed script runner.
    pub fn new(config: AppConfig) -> Self {
        let scripts = ScriptService::from_config(&config.scripts);
        Self::with_scripts(config, scripts)
    }

    /// Create application state with a caller-supplied script service.
    pub fn with_scripts(config: AppConfig, scripts: ScriptService) -> Self {
        let Orchestrator {
            hub,
            pending,
            dispatcher,
            router,
        } = Orchestrator::new(config.hub.clone());

        Self {
            hub,
            pending,
            dispatcher,
            router,
            scripts,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}
