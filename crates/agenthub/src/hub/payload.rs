//! Request payloads accepted by the dispatcher's string surface.
//!
//! Everything here is validated before any network interaction; failures are
//! [`HubError::MalformedInput`].

use agenthub_protocol::{CheckIdsArgs, RunClientArgs};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{HubError, HubResult};

/// `{"id": "<agent>"}`
#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub id: String,
}

/// Run-client payload. Field names follow the desktop client.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "ServerAddr", alias = "server_addr", default)]
    pub server_addr: String,
    #[serde(rename = "DP", alias = "dp", default)]
    pub dp: String,
    #[serde(default)]
    pub force: Option<bool>,
}

/// Log-tail payload; `lines` falls back to the configured default when
/// absent or non-positive.
#[derive(Debug, Deserialize)]
pub struct LogsRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub lines: Option<i64>,
}

/// Identifier-existence check payload. `ids` is either a JSON array or one
/// comma-separated string.
#[derive(Debug, Deserialize)]
pub struct CheckIdsRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub ids: Value,
}

/// Parse a JSON payload, treating an empty body as `{}`.
pub fn parse<T: DeserializeOwned>(payload: &str) -> HubResult<T> {
    let payload = payload.trim();
    let payload = if payload.is_empty() { "{}" } else { payload };
    serde_json::from_str(payload).map_err(|e| HubError::malformed(e.to_string()))
}

/// Require a non-blank agent identifier.
pub fn require_agent(id: &str) -> HubResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(HubError::malformed("missing agent id (id)"));
    }
    Ok(id)
}

impl RunRequest {
    /// Command arguments; `force` defaults to true.
    pub fn args(&self) -> RunClientArgs {
        RunClientArgs {
            server_addr: self.server_addr.clone(),
            dp: self.dp.clone(),
            force: self.force.unwrap_or(true),
        }
    }
}

impl LogsRequest {
    pub fn effective_lines(&self, default_lines: u32) -> u32 {
        match self.lines {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => default_lines,
        }
    }
}

impl CheckIdsRequest {
    /// Validated command arguments.
    pub fn args(&self) -> HubResult<CheckIdsArgs> {
        let column = self.column.trim();
        if column.is_empty() {
            return Err(HubError::malformed("missing column"));
        }
        let ids = normalize_ids(&self.ids);
        if ids.is_empty() {
            return Err(HubError::malformed("empty ids"));
        }
        Ok(CheckIdsArgs {
            column: column.to_string(),
            ids,
        })
    }
}

/// Normalize an identifier set to a trimmed, non-empty, deduplicated list in
/// first-seen order.
///
/// Accepts an array (strings, numbers, booleans, anything else as its JSON
/// text) or a single comma-separated string.
pub fn normalize_ids(ids: &Value) -> Vec<String> {
    let raw: Vec<String> = match ids {
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(items) => items.iter().filter_map(id_from_value).collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for id in raw {
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comma_string_is_split_and_trimmed() {
        assert_eq!(normalize_ids(&json!("A1, B2 ,,C3")), vec!["A1", "B2", "C3"]);
    }

    #[test]
    fn test_duplicates_are_removed_in_first_seen_order() {
        assert_eq!(normalize_ids(&json!(["A1", "A1"])), vec!["A1"]);
        assert_eq!(
            normalize_ids(&json!(["B", " A ", "B", "A"])),
            vec!["B", "A"]
        );
    }

    #[test]
    fn test_mixed_array_values() {
        assert_eq!(
            normalize_ids(&json!([12, 3.0, 2.5, true, null, "", {"k": 1}])),
            vec!["12", "3", "2.5", "true", r#"{"k":1}"#]
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert!(normalize_ids(&json!([])).is_empty());
        assert!(normalize_ids(&json!(" , ,")).is_empty());
        assert!(normalize_ids(&Value::Null).is_empty());
    }

    #[test]
    fn test_check_ids_validation() {
        let req: CheckIdsRequest =
            parse(r#"{"id":"agent-1","column":"  ","ids":["A"]}"#).unwrap();
        assert!(matches!(req.args(), Err(HubError::MalformedInput(_))));

        let req: CheckIdsRequest = parse(r#"{"id":"agent-1","column":"PatientID","ids":[]}"#).unwrap();
        assert!(matches!(req.args(), Err(HubError::MalformedInput(_))));

        let req: CheckIdsRequest =
            parse(r#"{"id":"agent-1","column":"PatientID","ids":"A1, B2 ,,C3"}"#).unwrap();
        let args = req.args().unwrap();
        assert_eq!(args.column, "PatientID");
        assert_eq!(args.ids, vec!["A1", "B2", "C3"]);
    }

    #[test]
    fn test_log_lines_default() {
        let req: LogsRequest = parse(r#"{"id":"a"}"#).unwrap();
        assert_eq!(req.effective_lines(200), 200);
        let req: LogsRequest = parse(r#"{"id":"a","lines":-4}"#).unwrap();
        assert_eq!(req.effective_lines(200), 200);
        let req: LogsRequest = parse(r#"{"id":"a","lines":50}"#).unwrap();
        assert_eq!(req.effective_lines(200), 50);
    }

    #[test]
    fn test_run_request_field_names() {
        let req: RunRequest =
            parse(r#"{"id":"agent-1","ServerAddr":"10.0.0.1:8080","DP":"train"}"#).unwrap();
        let args = req.args();
        assert_eq!(args.server_addr, "10.0.0.1:8080");
        assert_eq!(args.dp, "train");
        assert!(args.force);
    }

    #[test]
    fn test_invalid_json_and_missing_agent() {
        assert!(matches!(
            parse::<AgentRequest>("{oops"),
            Err(HubError::MalformedInput(_))
        ));
        let req: AgentRequest = parse("").unwrap();
        assert!(require_agent(&req.id).is_err());
        assert_eq!(require_agent(" agent-1 ").unwrap(), "agent-1");
    }
}
