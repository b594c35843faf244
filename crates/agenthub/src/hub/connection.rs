//! Connection handle wrapping one agent's outbound half.

use std::pin::Pin;

use agenthub_protocol::Frame;
use futures::{Sink, SinkExt};
use log::debug;
use tokio::sync::Mutex;

use super::error::{BoxError, HubError, HubResult};

/// Outbound half of an agent connection, carrying JSON text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = BoxError> + Send>>;

/// One physical agent connection.
///
/// The underlying sink does not tolerate concurrent writers, so every write
/// goes through `writer`. Reads never happen here: each connection has exactly
/// one reader, its message router.
pub struct AgentConnection {
    /// Peer description used in log lines (e.g. remote address).
    peer: String,
    writer: Mutex<FrameSink>,
}

impl AgentConnection {
    /// Wrap an outbound sink.
    pub fn new(peer: impl Into<String>, sink: FrameSink) -> Self {
        Self {
            peer: peer.into(),
            writer: Mutex::new(sink),
        }
    }

    /// Wrap any sink of text frames whose error converts into a [`BoxError`].
    pub fn from_sink<S, E>(peer: impl Into<String>, sink: S) -> Self
    where
        S: Sink<String, Error = E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(
            peer,
            Box::pin(sink.sink_map_err(|e: E| -> BoxError { e.into() })),
        )
    }

    /// Peer description.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Serialize `frame` and write it while holding the write lock.
    ///
    /// `agent` only labels the error.
    pub async fn send(&self, agent: &str, frame: &Frame) -> HubResult<()> {
        let text = frame.to_json()?;
        let mut writer = self.writer.lock().await;
        writer
            .send(text)
            .await
            .map_err(|e| HubError::transport(agent, frame.kind.as_str(), e))?;
        debug!("sent {} to agent {} ({})", frame.kind, agent, self.peer);
        Ok(())
    }

    /// Flush and close the outbound half. Errors are ignored; the peer may
    /// already be gone.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
    }
}

impl std::fmt::Debug for AgentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConnection")
            .field("peer", &self.peer)
            .finish()
    }
}
