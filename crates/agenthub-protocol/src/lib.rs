//! Wire protocol for agent hub connections.
//!
//! Agents keep one WebSocket open to the hub. Every message in either
//! direction is a single JSON object, a [`Frame`]:
//!
//! ```text
//! Agent                                   Hub
//!   | --- HELLO {id} ----------------------> |   register agent
//!   | <-- GET_STATS {rid} ------------------ |   dispatcher awaits rid
//!   | --- STATS_RESULT {rid, args} --------> |   resolve pending rid
//!   | --- CLIENT_STATUS {args} ------------> |   logged only
//! ```
//!
//! The `args` of result frames are carried as raw JSON so the hub can hand
//! them back to callers byte-for-byte.

pub mod args;
pub mod frame;

pub use args::{CheckIdsArgs, GetLogArgs, RunClientArgs};
pub use frame::{Frame, FrameType, UNKNOWN_AGENT_ID};
