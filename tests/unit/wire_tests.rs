//! Unit tests for JSON-RPC frame classification and the session/update
//! payload model.

use serde_json::{json, Value};

use agent_switchboard::acp::wire::{
    choose_allow_option, classify_line, error_response, notification, parse_permission_options,
    parse_session_update, permission_cancelled, permission_selected, request, response,
    InboundFrame, RpcId, SessionUpdate,
};
use agent_switchboard::AppError;

// ── Classification ──────────────────────────────────────────────────────────

#[test]
fn blank_line_classifies_to_none() {
    assert!(classify_line("").expect("blank is fine").is_none());
    assert!(classify_line("   ").expect("whitespace is fine").is_none());
}

#[test]
fn response_with_result_routes_by_integer_id() {
    let line = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;
    match classify_line(line).expect("valid frame") {
        Some(InboundFrame::Response { id, result }) => {
            assert_eq!(id, 7);
            assert_eq!(result.expect("success")["ok"], json!(true));
        }
        other => panic!("expected response frame, got {other:?}"),
    }
}

#[test]
fn response_with_error_carries_the_error_object() {
    let line = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32000,"message":"nope"}}"#;
    match classify_line(line).expect("valid frame") {
        Some(InboundFrame::Response { id, result }) => {
            assert_eq!(id, 3);
            let err = result.expect_err("error response");
            assert_eq!(err.code, -32000);
            assert_eq!(err.message, "nope");
        }
        other => panic!("expected response frame, got {other:?}"),
    }
}

#[test]
fn id_plus_method_is_a_server_request() {
    let line = r#"{"jsonrpc":"2.0","id":"perm-1","method":"session/request_permission","params":{}}"#;
    match classify_line(line).expect("valid frame") {
        Some(InboundFrame::ServerRequest { id, method, .. }) => {
            assert_eq!(id, RpcId::Str("perm-1".into()));
            assert_eq!(method, "session/request_permission");
        }
        other => panic!("expected server request, got {other:?}"),
    }
}

#[test]
fn method_without_id_is_a_notification() {
    let line = r#"{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s"}}"#;
    match classify_line(line).expect("valid frame") {
        Some(InboundFrame::Notification { method, params }) => {
            assert_eq!(method, "session/update");
            assert_eq!(params["sessionId"], json!("s"));
        }
        other => panic!("expected notification, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_a_protocol_error() {
    let result = classify_line("not json {{{");
    assert!(
        matches!(result, Err(AppError::Protocol(_))),
        "got {result:?}"
    );
}

#[test]
fn response_with_string_id_is_a_protocol_error() {
    let line = r#"{"jsonrpc":"2.0","id":"weird","result":{}}"#;
    let result = classify_line(line);
    assert!(
        matches!(result, Err(AppError::Protocol(_))),
        "got {result:?}"
    );
}

// ── Outbound builders ───────────────────────────────────────────────────────

#[test]
fn request_frame_carries_id_and_method() {
    let frame = request(42, "session/prompt", json!({"sessionId": "s"}));
    assert_eq!(frame["id"], json!(42));
    assert_eq!(frame["method"], json!("session/prompt"));
    assert_eq!(frame["jsonrpc"], json!("2.0"));
}

#[test]
fn notification_frame_has_no_id() {
    let frame = notification("session/cancel", json!({"sessionId": "s"}));
    assert!(frame.get("id").is_none());
    assert_eq!(frame["method"], json!("session/cancel"));
}

#[test]
fn response_frames_echo_the_original_id() {
    let ok = response(&RpcId::Str("perm-1".into()), json!({"done": true}));
    assert_eq!(ok["id"], json!("perm-1"));

    let err = error_response(&RpcId::Num(9), -32601, "method not found");
    assert_eq!(err["id"], json!(9));
    assert_eq!(err["error"]["code"], json!(-32601));
}

// ── session/update parsing ──────────────────────────────────────────────────

fn update_params(kind: &str, text: Option<&str>) -> Value {
    let mut update = json!({ "sessionUpdate": kind });
    if let Some(text) = text {
        update["content"] = json!({ "type": "text", "text": text });
    }
    json!({ "sessionId": "sess-1", "update": update })
}

#[test]
fn message_chunk_carries_incremental_text() {
    let parsed = parse_session_update(&update_params("agent_message_chunk", Some("hi")));
    assert_eq!(parsed, Some(SessionUpdate::MessageChunk("hi".into())));
}

#[test]
fn turn_end_is_recognized() {
    let parsed = parse_session_update(&update_params("turn_end", None));
    assert_eq!(parsed, Some(SessionUpdate::TurnEnd));
}

#[test]
fn tool_and_plan_updates_are_observed_not_chunks() {
    for kind in ["tool_call", "tool_call_update", "plan"] {
        let parsed = parse_session_update(&update_params(kind, None)).expect("parsed");
        assert!(
            !matches!(parsed, SessionUpdate::MessageChunk(_)),
            "{kind} must not surface as a chunk"
        );
    }
}

#[test]
fn unknown_update_kind_is_retained_for_logging() {
    let parsed = parse_session_update(&update_params("vendor_thing", None));
    assert_eq!(parsed, Some(SessionUpdate::Other("vendor_thing".into())));
}

// ── Permission policy ───────────────────────────────────────────────────────

fn options(kinds: &[(&str, &str)]) -> Value {
    let opts: Vec<Value> = kinds
        .iter()
        .map(|(id, kind)| json!({ "optionId": id, "kind": kind, "name": id }))
        .collect();
    json!({ "options": opts })
}

#[test]
fn allow_once_is_preferred() {
    let params = options(&[("r", "reject_once"), ("aa", "allow_always"), ("ao", "allow_once")]);
    let opts = parse_permission_options(&params);
    let chosen = choose_allow_option(&opts).expect("an allow option exists");
    assert_eq!(chosen.option_id, "ao");
}

#[test]
fn first_allow_kind_is_the_fallback() {
    let params = options(&[("r", "reject_once"), ("aa", "allow_always")]);
    let opts = parse_permission_options(&params);
    let chosen = choose_allow_option(&opts).expect("an allow option exists");
    assert_eq!(chosen.option_id, "aa");
}

#[test]
fn no_allow_option_yields_none() {
    let params = options(&[("r1", "reject_once"), ("r2", "reject_always")]);
    let opts = parse_permission_options(&params);
    assert!(choose_allow_option(&opts).is_none());
}

#[test]
fn permission_outcomes_serialize_to_the_wire_shape() {
    let selected = permission_selected("opt-1");
    assert_eq!(selected["outcome"]["outcome"], json!("selected"));
    assert_eq!(selected["outcome"]["optionId"], json!("opt-1"));

    let cancelled = permission_cancelled();
    assert_eq!(cancelled["outcome"]["outcome"], json!("cancelled"));
    assert!(cancelled["outcome"].get("optionId").is_none());
}

// ── Holder pid extraction ───────────────────────────────────────────────────

#[test]
fn holder_pid_from_structured_data() {
    let line = r#"{"id":1,"error":{"code":1,"message":"locked","data":{"pid":4242}}}"#;
    let Some(InboundFrame::Response { result, .. }) = classify_line(line).expect("valid") else {
        panic!("expected response");
    };
    let err = result.expect_err("error");
    assert_eq!(err.holder_pid(), Some(4242));
}

#[test]
fn holder_pid_from_message_text() {
    let line = r#"{"id":1,"error":{"code":1,"message":"session held by PID 991 already"}}"#;
    let Some(InboundFrame::Response { result, .. }) = classify_line(line).expect("valid") else {
        panic!("expected response");
    };
    let err = result.expect_err("error");
    assert_eq!(err.holder_pid(), Some(991));
}

#[test]
fn no_pid_in_error_yields_none() {
    let line = r#"{"id":1,"error":{"code":1,"message":"something else went wrong"}}"#;
    let Some(InboundFrame::Response { result, .. }) = classify_line(line).expect("valid") else {
        panic!("expected response");
    };
    assert_eq!(result.expect_err("error").holder_pid(), None);
}
