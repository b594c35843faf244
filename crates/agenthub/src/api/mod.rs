//! HTTP API module.
//!
//! Provides the agent WebSocket endpoint, the request endpoints that dispatch
//! commands to agents, and the script-execution endpoints.

mod error;
mod handlers;
mod routes;
mod state;
mod ws;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, JsonText};
pub use routes::create_router;
pub use state::AppState;
