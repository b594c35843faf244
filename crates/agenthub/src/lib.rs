//! Agenthub: realtime orchestration of remote agents over WebSocket.

pub mod api;
pub mod config;
pub mod hub;
pub mod observability;
pub mod scripts;
