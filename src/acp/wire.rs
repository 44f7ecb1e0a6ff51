//! JSON-RPC 2.0 frame model for the agent wire.
//!
//! Outbound frames are built with [`serde_json::json!`] so the exact shape
//! stays visible at the call site. Inbound lines are classified into one of
//! three frame kinds:
//!
//! - a **response** (`id` + `result`/`error`) routed to the pending caller,
//! - a **server request** (`id` + `method`) that the driver must answer,
//! - a **notification** (`method`, no `id`).
//!
//! The agent assigns string or integer ids to its own requests, so inbound
//! ids are modeled as [`RpcId`]; the gateway's own ids are always integers.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppError, Result};

/// Protocol version the gateway speaks.
pub const PROTOCOL_VERSION: u64 = 1;

/// JSON-RPC id as the agent may produce it: integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    /// Numeric id.
    Num(u64),
    /// String id.
    Str(String),
}

impl RpcId {
    /// The id as a JSON value, for embedding into a response frame.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Num(n) => json!(n),
            Self::Str(s) => json!(s),
        }
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Error object from a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcError {
    /// Extract a session-lock holder pid from the error payload.
    ///
    /// Checks `data.pid` / `data.processId` / `data.holderPid` first, then
    /// falls back to the first integer following "pid" in the message text.
    #[must_use]
    pub fn holder_pid(&self) -> Option<u32> {
        if let Some(data) = &self.data {
            for key in ["pid", "processId", "holderPid"] {
                if let Some(pid) = data.get(key).and_then(Value::as_u64) {
                    return u32::try_from(pid).ok();
                }
            }
        }
        let lower = self.message.to_lowercase();
        let idx = lower.find("pid")?;
        let tail = &self.message[idx + 3..];
        let digits: String = tail
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

/// One classified inbound frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// Response to a gateway-issued request.
    Response {
        /// The gateway-assigned integer id.
        id: u64,
        /// `Ok(result)` or the agent's error object.
        result: std::result::Result<Value, RpcError>,
    },
    /// Agent-initiated request the gateway must answer.
    ServerRequest {
        /// Agent-assigned id, echoed back in the reply.
        id: RpcId,
        /// Request method name.
        method: String,
        /// Request parameters.
        params: Value,
    },
    /// Agent-initiated notification.
    Notification {
        /// Notification method name.
        method: String,
        /// Notification parameters.
        params: Value,
    },
}

/// Raw envelope used for classification.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<RpcId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Classify a single inbound line.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns `AppError::Protocol` when the line is not valid JSON, when a
/// response id is not an integer, or when the envelope fits no frame kind.
pub fn classify_line(line: &str) -> Result<Option<InboundFrame>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let env: Envelope = serde_json::from_str(line)
        .map_err(|err| AppError::Protocol(format!("malformed json: {err}")))?;

    match (env.id, env.method) {
        (Some(id), Some(method)) => Ok(Some(InboundFrame::ServerRequest {
            id,
            method,
            params: env.params.unwrap_or(Value::Null),
        })),
        (None, Some(method)) => Ok(Some(InboundFrame::Notification {
            method,
            params: env.params.unwrap_or(Value::Null),
        })),
        (Some(id), None) => {
            let RpcId::Num(id) = id else {
                return Err(AppError::Protocol(format!(
                    "response with non-integer id '{id}'"
                )));
            };
            let result = match (env.result, env.error) {
                (_, Some(err)) => Err(err),
                (Some(result), None) => Ok(result),
                (None, None) => Ok(Value::Null),
            };
            Ok(Some(InboundFrame::Response { id, result }))
        }
        (None, None) => Err(AppError::Protocol(
            "envelope has neither id nor method".into(),
        )),
    }
}

// ── Outbound frame builders ──────────────────────────────────────────────────

/// Build a request frame with a gateway-assigned integer id.
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

/// Build a notification frame (no id, no response expected).
#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Build a success response to an agent-initiated request.
#[must_use]
pub fn response(id: &RpcId, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id.to_value(), "result": result })
}

/// Build an error response to an agent-initiated request.
#[must_use]
pub fn error_response(id: &RpcId, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.to_value(),
        "error": { "code": code, "message": message }
    })
}

// ── session/update payloads ──────────────────────────────────────────────────

/// Parsed `session/update` notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Incremental agent text. Fragments are deltas, not cumulative.
    MessageChunk(String),
    /// Tool invocation started. Observed, never surfaced.
    ToolCall,
    /// Tool invocation progressed. Observed, never surfaced.
    ToolCallUpdate,
    /// Plan update. Observed, never surfaced.
    Plan,
    /// The turn is complete.
    TurnEnd,
    /// Unknown update kind, retained for logging.
    Other(String),
}

/// Parse the nested `sessionUpdate` discriminator of a `session/update`
/// notification. Returns `None` when the payload has no recognizable shape.
#[must_use]
pub fn parse_session_update(params: &Value) -> Option<SessionUpdate> {
    let update = params.get("update")?;
    let kind = update.get("sessionUpdate").and_then(Value::as_str)?;
    let parsed = match kind {
        "agent_message_chunk" => {
            let text = update
                .get("content")
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            SessionUpdate::MessageChunk(text.to_owned())
        }
        "tool_call" => SessionUpdate::ToolCall,
        "tool_call_update" => SessionUpdate::ToolCallUpdate,
        "plan" => SessionUpdate::Plan,
        "turn_end" => SessionUpdate::TurnEnd,
        other => SessionUpdate::Other(other.to_owned()),
    };
    Some(parsed)
}

/// The session a `session/update` notification belongs to.
#[must_use]
pub fn update_session_id(params: &Value) -> Option<&str> {
    params.get("sessionId").and_then(Value::as_str)
}

// ── Permission requests ──────────────────────────────────────────────────────

/// One selectable option in a `session/request_permission` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Identifier echoed back in the outcome.
    pub option_id: String,
    /// Option kind, e.g. `allow_once`, `allow_always`, `reject_once`.
    pub kind: String,
}

/// Parse the option list of a `session/request_permission` request.
#[must_use]
pub fn parse_permission_options(params: &Value) -> Vec<PermissionOption> {
    params
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|o| serde_json::from_value(o.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Select the option to auto-approve: `allow_once` if present, else the
/// first option whose kind starts with `allow`.
#[must_use]
pub fn choose_allow_option(options: &[PermissionOption]) -> Option<&PermissionOption> {
    options
        .iter()
        .find(|o| o.kind == "allow_once")
        .or_else(|| options.iter().find(|o| o.kind.starts_with("allow")))
}

/// Build the result payload selecting `option_id`.
#[must_use]
pub fn permission_selected(option_id: &str) -> Value {
    json!({ "outcome": { "outcome": "selected", "optionId": option_id } })
}

/// Build the result payload for a cancelled prompt turn.
#[must_use]
pub fn permission_cancelled() -> Value {
    json!({ "outcome": { "outcome": "cancelled" } })
}
