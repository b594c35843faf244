//! Per-connection reader loop demultiplexing inbound frames.

use std::fmt::Display;
use std::sync::Arc;

use agenthub_protocol::{Frame, FrameType, UNKNOWN_AGENT_ID};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};

use super::connection::AgentConnection;
use super::pending::PendingRequests;
use super::registry::AgentHub;

/// Identity a connection announced, with the session it was registered under.
struct Announced {
    agent_id: String,
    session: u64,
}

/// Reads frames from one connection and feeds the registry and the
/// pending-request table.
///
/// One `run` call per live connection; it is the only reader of that
/// connection and returns when the connection ends.
#[derive(Clone)]
pub struct MessageRouter {
    hub: Arc<AgentHub>,
    pending: PendingRequests,
}

impl MessageRouter {
    pub fn new(hub: Arc<AgentHub>, pending: PendingRequests) -> Self {
        Self { hub, pending }
    }

    /// Process `inbound` text frames until the stream ends, errors, or yields
    /// a malformed frame, then deregister the announced identity and close
    /// the connection.
    pub async fn run<S, E>(&self, conn: Arc<AgentConnection>, inbound: S)
    where
        S: Stream<Item = Result<String, E>>,
        E: Display,
    {
        let mut inbound = std::pin::pin!(inbound);
        let mut announced: Option<Announced> = None;

        loop {
            let label = announced
                .as_ref()
                .map(|a| a.agent_id.as_str())
                .unwrap_or(conn.peer());

            let text = match inbound.next().await {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    warn!("Agent {} disconnected: {}", label, e);
                    break;
                }
                None => {
                    info!("Agent {} closed its connection", label);
                    break;
                }
            };

            let frame = match Frame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Malformed frame from agent {}: {} - {}", label, e, text);
                    break;
                }
            };

            self.handle_frame(&conn, &mut announced, frame);
        }

        if let Some(Announced { agent_id, session }) = announced {
            self.hub.deregister(&agent_id, session);
        }
        conn.close().await;
    }

    fn handle_frame(
        &self,
        conn: &Arc<AgentConnection>,
        announced: &mut Option<Announced>,
        frame: Frame,
    ) {
        match frame.kind {
            FrameType::Hello => {
                let agent_id = frame
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| UNKNOWN_AGENT_ID.to_string());

                if let Some(previous) = announced.take()
                    && previous.agent_id != agent_id
                {
                    info!(
                        "Connection {} renamed itself from {} to {}",
                        conn.peer(),
                        previous.agent_id,
                        agent_id
                    );
                    self.hub.deregister(&previous.agent_id, previous.session);
                }

                let session = self.hub.register(&agent_id, Arc::clone(conn));
                info!("HELLO from {}", agent_id);
                *announced = Some(Announced { agent_id, session });
            }

            kind if kind.is_result() => {
                let Some(rid) = frame.rid.as_deref() else {
                    debug!("{} frame without rid from {}, ignoring", kind, conn.peer());
                    return;
                };
                if self.pending.resolve(rid, frame.args_json().to_string()) {
                    debug!("Resolved {} for rid {}", kind, rid);
                } else {
                    debug!("Late or unknown {} for rid {}, discarded", kind, rid);
                }
            }

            FrameType::ClientStatus => {
                let agent = announced
                    .as_ref()
                    .map(|a| a.agent_id.as_str())
                    .unwrap_or(conn.peer());
                info!("CLIENT_STATUS from {}: {}", agent, frame.args_json());
            }

            other => {
                debug!("Ignoring {} frame from {}", other, conn.peer());
            }
        }
    }
}
