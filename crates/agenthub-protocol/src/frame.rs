//! Frame envelope and type discriminator.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Identifier recorded for agents that announce themselves without one.
pub const UNKNOWN_AGENT_ID: &str = "unknown-agent";

/// Frame type discriminator (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    // ========== Agent -> Hub ==========
    /// Identity announcement, first frame on a connection.
    Hello,
    /// Unsolicited status report.
    ClientStatus,
    /// Reply to `GET_STATS`.
    StatsResult,
    /// Reply to `GET_LOG`.
    LogResult,
    /// Reply to `CHECK_IDS`.
    CheckIdsResult,

    // ========== Hub -> Agent ==========
    /// Start the federated client against a server.
    RunClient,
    /// Ask which of a set of identifiers exist in a column.
    CheckIds,
    /// Dataset statistics query.
    GetStats,
    /// Tail of the agent's log file.
    GetLog,

    /// Any type this hub does not know about.
    #[serde(other)]
    Unknown,
}

impl FrameType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::ClientStatus => "CLIENT_STATUS",
            Self::StatsResult => "STATS_RESULT",
            Self::LogResult => "LOG_RESULT",
            Self::CheckIdsResult => "CHECK_IDS_RESULT",
            Self::RunClient => "RUN_CLIENT",
            Self::CheckIds => "CHECK_IDS",
            Self::GetStats => "GET_STATS",
            Self::GetLog => "GET_LOG",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether frames of this type carry a correlated reply.
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            Self::StatsResult | Self::LogResult | Self::CheckIdsResult
        )
    }

    /// The result type an agent answers this command with, if any.
    pub fn reply_type(&self) -> Option<FrameType> {
        match self {
            Self::GetStats => Some(Self::StatsResult),
            Self::GetLog => Some(Self::LogResult),
            Self::CheckIds => Some(Self::CheckIdsResult),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,

    /// Announcing agent's identifier (HELLO only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Correlation identifier echoed by the agent in its result frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,

    /// Type-specific arguments, kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Box<RawValue>>,
}

impl Frame {
    /// Identity announcement for `agent_id`.
    pub fn hello(agent_id: impl Into<String>) -> Self {
        Self {
            kind: FrameType::Hello,
            id: Some(agent_id.into()),
            rid: None,
            args: None,
        }
    }

    /// Command frame without arguments.
    pub fn command(kind: FrameType, rid: Option<String>) -> Self {
        Self {
            kind,
            id: None,
            rid,
            args: None,
        }
    }

    /// Command frame with typed arguments.
    pub fn command_with_args<A: Serialize>(
        kind: FrameType,
        rid: Option<String>,
        args: &A,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            kind,
            id: None,
            rid,
            args: Some(serde_json::value::to_raw_value(args)?),
        })
    }

    /// Result frame answering `rid`; `args` must be valid JSON.
    pub fn result(kind: FrameType, rid: impl Into<String>, args: &str) -> serde_json::Result<Self> {
        Ok(Self {
            kind,
            id: None,
            rid: Some(rid.into()),
            args: Some(RawValue::from_string(args.to_string())?),
        })
    }

    /// Decode a frame from its JSON text.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Encode the frame as JSON text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Raw JSON text of `args`, `null` when absent.
    pub fn args_json(&self) -> &str {
        self.args.as_deref().map(RawValue::get).unwrap_or("null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_parse_hello() {
        let frame = Frame::parse(r#"{"type":"HELLO","id":"agent-1"}"#).unwrap();
        assert_eq!(frame.kind, FrameType::Hello);
        assert_eq!(frame.id.as_deref(), Some("agent-1"));
        assert!(frame.rid.is_none());
        assert_eq!(frame.args_json(), "null");
    }

    #[test]
    fn test_unrecognized_type_is_not_an_error() {
        let frame = Frame::parse(r#"{"type":"SOMETHING_NEW","args":{"x":1}}"#).unwrap();
        assert_eq!(frame.kind, FrameType::Unknown);
    }

    #[test]
    fn test_missing_type_is_malformed() {
        assert!(Frame::parse(r#"{"id":"agent-1"}"#).is_err());
        assert!(Frame::parse("not json").is_err());
    }

    #[test]
    fn test_result_args_are_kept_verbatim() {
        let text = r#"{"type":"STATS_RESULT","rid":"req-42","args":{"zeta":1,"alpha":[1, 2]}}"#;
        let frame = Frame::parse(text).unwrap();
        assert!(frame.kind.is_result());
        assert_eq!(frame.rid.as_deref(), Some("req-42"));
        assert_eq!(frame.args_json(), r#"{"zeta":1,"alpha":[1, 2]}"#);
    }

    #[test]
    fn test_command_serialization_omits_absent_fields() {
        let frame = Frame::command(FrameType::GetStats, Some("req-1".into()));
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "GET_STATS", "rid": "req-1"}));
    }

    #[test]
    fn test_command_with_args() {
        let frame =
            Frame::command_with_args(FrameType::GetLog, Some("r".into()), &json!({"lines": 5}))
                .unwrap();
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "GET_LOG");
        assert_eq!(value["args"]["lines"], 5);
    }

    #[test]
    fn test_reply_types() {
        assert_eq!(FrameType::GetStats.reply_type(), Some(FrameType::StatsResult));
        assert_eq!(FrameType::GetLog.reply_type(), Some(FrameType::LogResult));
        assert_eq!(FrameType::CheckIds.reply_type(), Some(FrameType::CheckIdsResult));
        assert_eq!(FrameType::RunClient.reply_type(), None);
        assert_eq!(FrameType::CheckIdsResult.to_string(), "CHECK_IDS_RESULT");
    }
}
