//! Typed `args` payloads for hub-to-agent commands.

use serde::{Deserialize, Serialize};

/// Arguments of `RUN_CLIENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunClientArgs {
    /// Address of the federated server the client should join.
    pub server_addr: String,
    /// Data-partition selector.
    pub dp: String,
    /// Restart the client even if one is already running.
    pub force: bool,
}

/// Arguments of `GET_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLogArgs {
    pub lines: u32,
}

/// Arguments of `CHECK_IDS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIdsArgs {
    pub column: String,
    pub ids: Vec<String>,
}
