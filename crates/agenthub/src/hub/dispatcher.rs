//! Command dispatch: fire-and-forget sends and correlated request/await calls.

use std::sync::Arc;

use agenthub_protocol::{CheckIdsArgs, Frame, FrameType, GetLogArgs, RunClientArgs};
use log::{debug, info, warn};
use serde_json::json;

use super::HubConfig;
use super::connection::AgentConnection;
use super::error::{HubError, HubResult};
use super::payload::{self, AgentRequest, CheckIdsRequest, LogsRequest, RunRequest};
use super::pending::{PendingRequests, WaitError};
use super::registry::AgentHub;

/// Public command surface of the hub.
///
/// Typed operations take already-validated arguments; the `*_request`
/// variants take the raw JSON payload and the caller's tracking id and
/// return the response payload, which is the shape the HTTP layer mounts.
#[derive(Clone)]
pub struct Dispatcher {
    hub: Arc<AgentHub>,
    pending: PendingRequests,
    config: HubConfig,
}

impl Dispatcher {
    pub fn new(hub: Arc<AgentHub>, pending: PendingRequests, config: HubConfig) -> Self {
        Self {
            hub,
            pending,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Identifiers of connected agents.
    pub fn list_agents(&self) -> Vec<String> {
        self.hub.list()
    }

    fn connection(&self, agent: &str) -> HubResult<Arc<AgentConnection>> {
        self.hub
            .lookup(agent)
            .ok_or_else(|| HubError::NotFound(agent.to_string()))
    }

    /// Write `frame` to `agent` without waiting for any reply.
    pub async fn send(&self, agent: &str, frame: &Frame) -> HubResult<()> {
        let conn = self.connection(agent)?;
        conn.send(agent, frame).await
    }

    /// Send `frame` under a fresh correlation id and wait for the matching
    /// result, returning its `args` verbatim.
    pub async fn request(&self, agent: &str, mut frame: Frame) -> HubResult<String> {
        let conn = self.connection(agent)?;
        let operation = frame.kind.reply_type().map(|t| t.as_str()).unwrap_or("reply");

        let rid = PendingRequests::next_request_id();
        frame.rid = Some(rid.clone());
        let reply = self.pending.register(rid.clone());

        if let Err(e) = conn.send(agent, &frame).await {
            warn!("Failed to send {} to agent {}: {}", frame.kind, agent, e);
            return Err(e);
        }
        debug!(
            "{} sent to agent {}, waiting for {} (rid={})",
            frame.kind, agent, operation, rid
        );

        let timeout = self.config.request_timeout();
        match reply.wait(timeout).await {
            Ok(payload) => {
                debug!(
                    "Received {} from agent {} (rid={}, {} bytes)",
                    operation,
                    agent,
                    rid,
                    payload.len()
                );
                Ok(payload)
            }
            Err(WaitError::TimedOut) => {
                warn!("Timeout waiting for {} from agent {}", operation, agent);
                Err(HubError::Timeout {
                    agent: agent.to_string(),
                    operation,
                    elapsed: timeout,
                })
            }
            Err(WaitError::Closed) => Err(HubError::ReplyDropped(agent.to_string())),
        }
    }

    /// Start the federated client on `agent`. Fire-and-forget.
    pub async fn run_client(&self, agent: &str, args: &RunClientArgs) -> HubResult<()> {
        let frame = Frame::command_with_args(FrameType::RunClient, None, args)?;
        self.send(agent, &frame).await?;
        info!(
            "RUN_CLIENT sent to agent {} (server {}, dp {})",
            agent, args.server_addr, args.dp
        );
        Ok(())
    }

    /// Dataset statistics of `agent`.
    pub async fn stats(&self, agent: &str) -> HubResult<String> {
        self.request(agent, Frame::command(FrameType::GetStats, None))
            .await
    }

    /// Last `lines` lines of `agent`'s log.
    pub async fn logs(&self, agent: &str, lines: u32) -> HubResult<String> {
        let frame = Frame::command_with_args(FrameType::GetLog, None, &GetLogArgs { lines })?;
        self.request(agent, frame).await
    }

    /// Which of `args.ids` exist in `args.column` on `agent`.
    pub async fn check_ids(&self, agent: &str, args: &CheckIdsArgs) -> HubResult<String> {
        let frame = Frame::command_with_args(FrameType::CheckIds, None, args)?;
        self.request(agent, frame).await
    }

    // ------------------------------------------------------------------
    // String surface: (payload, tracking_id) -> payload
    // ------------------------------------------------------------------

    /// JSON array of connected agent ids. The payload is ignored.
    pub async fn agents_request(&self, _payload: &str, _tracking_id: &str) -> HubResult<String> {
        Ok(serde_json::to_string(&self.list_agents())?)
    }

    pub async fn run_request(&self, payload: &str, tracking_id: &str) -> HubResult<String> {
        let req: RunRequest = payload::parse(payload)?;
        let agent = payload::require_agent(&req.id)?;
        debug!("run-client for agent {} (tracking {})", agent, tracking_id);

        self.run_client(agent, &req.args()).await?;
        Ok(json!({ "status": "sent", "agent": agent }).to_string())
    }

    pub async fn stats_request(&self, payload: &str, tracking_id: &str) -> HubResult<String> {
        let req: AgentRequest = payload::parse(payload)?;
        let agent = payload::require_agent(&req.id)?;
        debug!("stats for agent {} (tracking {})", agent, tracking_id);

        self.stats(agent).await
    }

    pub async fn logs_request(&self, payload: &str, tracking_id: &str) -> HubResult<String> {
        let req: LogsRequest = payload::parse(payload)?;
        let agent = payload::require_agent(&req.id)?;
        let lines = req.effective_lines(self.config.default_log_lines);
        debug!(
            "log tail of {} lines for agent {} (tracking {})",
            lines, agent, tracking_id
        );

        self.logs(agent, lines).await
    }

    pub async fn check_ids_request(&self, payload: &str, tracking_id: &str) -> HubResult<String> {
        let req: CheckIdsRequest = payload::parse(payload)?;
        let agent = payload::require_agent(&req.id)?;
        let args = req.args()?;
        debug!(
            "check {} ids in column {} on agent {} (tracking {})",
            args.ids.len(),
            args.column,
            agent,
            tracking_id
        );

        self.check_ids(agent, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::connection::tests::channel_connection;
    use futures::StreamExt;
    use futures::channel::mpsc::UnboundedReceiver;
    use serde_json::Value;
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        hub: Arc<AgentHub>,
        pending: PendingRequests,
    }

    fn fixture() -> Fixture {
        let hub = Arc::new(AgentHub::new());
        let pending = PendingRequests::new();
        Fixture {
            dispatcher: Dispatcher::new(Arc::clone(&hub), pending.clone(), HubConfig::default()),
            hub,
            pending,
        }
    }

    fn connect(fx: &Fixture, agent: &str) -> UnboundedReceiver<String> {
        let (conn, rx) = channel_connection(agent);
        fx.hub.register(agent, conn);
        rx
    }

    /// Answer the next command on `rx` with `args`, like an agent would.
    fn reply_with(
        pending: PendingRequests,
        mut rx: UnboundedReceiver<String>,
        args: &'static str,
    ) -> tokio::task::JoinHandle<Frame> {
        tokio::spawn(async move {
            let frame = Frame::parse(&rx.next().await.unwrap()).unwrap();
            pending.resolve(frame.rid.as_deref().unwrap(), args.to_string());
            frame
        })
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let fx = fixture();
        let err = fx.dispatcher.stats("ghost").await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(ref id) if id == "ghost"));
        assert!(fx.pending.is_empty());

        let err = fx
            .dispatcher
            .run_request(r#"{"id":"ghost"}"#, "t1")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_returns_reply_verbatim() {
        let fx = fixture();
        let rx = connect(&fx, "agent-1");
        let agent = reply_with(fx.pending.clone(), rx, r#"{"rows":100}"#);

        let payload = fx
            .dispatcher
            .stats_request(r#"{"id":"agent-1"}"#, "t1")
            .await
            .unwrap();
        assert_eq!(payload, r#"{"rows":100}"#);

        let sent = agent.await.unwrap();
        assert_eq!(sent.kind, FrameType::GetStats);
        assert!(sent.rid.unwrap().starts_with("req-"));
        assert!(fx.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_agent_times_out() {
        let fx = fixture();
        let _rx = connect(&fx, "agent-1");

        let err = fx.dispatcher.stats("agent-1").await.unwrap_err();
        assert!(matches!(err, HubError::Timeout { .. }));
        assert!(err.to_string().contains("agent-1"));
        assert!(fx.pending.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let fx = fixture();
        let rx = connect(&fx, "agent-1");
        drop(rx);

        let err = fx.dispatcher.stats("agent-1").await.unwrap_err();
        assert!(matches!(err, HubError::Transport { .. }));
        assert!(fx.pending.is_empty());
    }

    #[tokio::test]
    async fn test_logs_uses_default_line_count() {
        let fx = fixture();
        let rx = connect(&fx, "agent-1");
        let agent = reply_with(fx.pending.clone(), rx, r#"{"text":"hello"}"#);

        let payload = fx
            .dispatcher
            .logs_request(r#"{"id":"agent-1","lines":0}"#, "t1")
            .await
            .unwrap();
        assert_eq!(payload, r#"{"text":"hello"}"#);

        let sent = agent.await.unwrap();
        assert_eq!(sent.kind, FrameType::GetLog);
        let args: Value = serde_json::from_str(sent.args_json()).unwrap();
        assert_eq!(args["lines"], 200);
    }

    #[tokio::test]
    async fn test_check_ids_sends_normalized_ids() {
        let fx = fixture();
        let rx = connect(&fx, "agent-1");
        let agent = reply_with(fx.pending.clone(), rx, r#"{"exists_all":false}"#);

        fx.dispatcher
            .check_ids_request(
                r#"{"id":"agent-1","column":"PatientID","ids":"A1, B2 ,,C3"}"#,
                "t1",
            )
            .await
            .unwrap();

        let sent = agent.await.unwrap();
        assert_eq!(sent.kind, FrameType::CheckIds);
        let args: Value = serde_json::from_str(sent.args_json()).unwrap();
        assert_eq!(args["column"], "PatientID");
        assert_eq!(args["ids"], serde_json::json!(["A1", "B2", "C3"]));
    }

    #[tokio::test]
    async fn test_check_ids_rejects_empty_set_before_sending() {
        let fx = fixture();
        let mut rx = connect(&fx, "agent-1");

        let err = fx
            .dispatcher
            .check_ids_request(r#"{"id":"agent-1","column":"PatientID","ids":[]}"#, "t1")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::MalformedInput(_)));
        assert!(rx.try_recv().is_err(), "nothing should have been sent");
    }

    #[tokio::test]
    async fn test_run_client_is_fire_and_forget() {
        let fx = fixture();
        let mut rx = connect(&fx, "agent-1");

        let payload = fx
            .dispatcher
            .run_request(
                r#"{"id":"agent-1","ServerAddr":"10.0.0.1:8080","DP":"train"}"#,
                "t1",
            )
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload, serde_json::json!({"status": "sent", "agent": "agent-1"}));

        let frame = Frame::parse(&rx.next().await.unwrap()).unwrap();
        assert_eq!(frame.kind, FrameType::RunClient);
        assert!(frame.rid.is_none());
        let args: RunClientArgs = serde_json::from_str(frame.args_json()).unwrap();
        assert_eq!(args.server_addr, "10.0.0.1:8080");
        assert!(args.force);
        assert!(fx.pending.is_empty());
    }

    #[tokio::test]
    async fn test_reannounced_agent_receives_commands_on_new_connection() {
        let fx = fixture();
        let mut old_rx = connect(&fx, "agent-1");
        let mut new_rx = connect(&fx, "agent-1");

        fx.dispatcher
            .run_client(
                "agent-1",
                &RunClientArgs {
                    server_addr: "s".into(),
                    dp: "d".into(),
                    force: false,
                },
            )
            .await
            .unwrap();

        assert!(new_rx.next().await.is_some());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_agents_request_lists_ids() {
        let fx = fixture();
        let _rx = connect(&fx, "agent-1");
        let payload = fx.dispatcher.agents_request("", "t1").await.unwrap();
        assert_eq!(payload, r#"["agent-1"]"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_correlated_independently() {
        let fx = fixture();
        let mut rx_a = connect(&fx, "a");
        let mut rx_b = connect(&fx, "b");
        let pending = fx.pending.clone();

        // Agent b answers, agent a stays silent.
        tokio::spawn(async move {
            let frame = Frame::parse(&rx_b.next().await.unwrap()).unwrap();
            pending.resolve(frame.rid.as_deref().unwrap(), r#""from b""#.to_string());
            let _ = rx_a.next().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let (a, b) = tokio::join!(fx.dispatcher.stats("a"), fx.dispatcher.stats("b"));
        assert!(matches!(a, Err(HubError::Timeout { .. })));
        assert_eq!(b.unwrap(), r#""from b""#);
    }
}
