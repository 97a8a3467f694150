//! Unit tests for JSON-RPC frame classification and error mapping.

use serde_json::json;

use agent_bridge::protocol::message::{Frame, PermissionOutcome, RpcError};
use agent_bridge::AppError;

/// A frame with `result` is a response even when a stray `method` field is
/// present — response classification runs first.
#[test]
fn response_classified_before_request() {
    let line = r#"{"jsonrpc":"2.0","id":7,"method":"stray","result":{"ok":true}}"#;

    match Frame::classify(line).expect("classify must succeed") {
        Frame::Response { id, outcome } => {
            assert_eq!(id, json!(7));
            assert_eq!(outcome.expect("success outcome"), json!({"ok": true}));
        }
        other => panic!("expected Frame::Response, got: {other:?}"),
    }
}

/// A frame with `error` is an error response carrying the structured object.
#[test]
fn error_response_carries_rpc_error() {
    let line = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"nope"}}"#;

    match Frame::classify(line).expect("classify must succeed") {
        Frame::Response { outcome, .. } => {
            let err = outcome.expect_err("error outcome");
            assert_eq!(err.code, -32601);
            assert_eq!(err.message, "nope");
        }
        other => panic!("expected Frame::Response, got: {other:?}"),
    }
}

/// A frame with a method and an id is a request.
#[test]
fn request_has_method_and_id() {
    let line = r#"{"jsonrpc":"2.0","id":"a-1","method":"session/new","params":{}}"#;

    match Frame::classify(line).expect("classify must succeed") {
        Frame::Request { id, method, params } => {
            assert_eq!(id, json!("a-1"));
            assert_eq!(method, "session/new");
            assert_eq!(params, json!({}));
        }
        other => panic!("expected Frame::Request, got: {other:?}"),
    }
}

/// A frame with a method but no id is a notification.
#[test]
fn notification_has_no_id() {
    let line = r#"{"jsonrpc":"2.0","method":"session/cancel","params":{"sessionId":"s1"}}"#;

    match Frame::classify(line).expect("classify must succeed") {
        Frame::Notification { method, params } => {
            assert_eq!(method, "session/cancel");
            assert_eq!(params["sessionId"], "s1");
        }
        other => panic!("expected Frame::Notification, got: {other:?}"),
    }
}

/// Invalid JSON and shapeless frames are protocol errors, not panics.
#[test]
fn malformed_frames_are_protocol_errors() {
    assert!(matches!(
        Frame::classify("not json at all {{{"),
        Err(AppError::Protocol(_))
    ));
    assert!(matches!(
        Frame::classify(r#"{"jsonrpc":"2.0","params":{}}"#),
        Err(AppError::Protocol(_))
    ));
    // A response without an id cannot be correlated.
    assert!(matches!(
        Frame::classify(r#"{"jsonrpc":"2.0","result":{}}"#),
        Err(AppError::Protocol(_))
    ));
}

/// Permission outcomes parse from their documented wire shape, with the
/// selected option carried under `optionId`.
#[test]
fn permission_outcome_parses_wire_shape() {
    let selected: PermissionOutcome =
        serde_json::from_value(json!({"outcome": "selected", "optionId": "allow_once"}))
            .expect("selected outcome must parse");
    assert!(
        matches!(selected, PermissionOutcome::Selected { option_id } if option_id == "allow_once")
    );

    let cancelled: PermissionOutcome = serde_json::from_value(json!({"outcome": "cancelled"}))
        .expect("cancelled outcome must parse");
    assert!(matches!(cancelled, PermissionOutcome::Cancelled));
}

/// `RpcError::from_app` keeps protocol violations in the reserved range and
/// everything else in the implementation-defined range.
#[test]
fn app_errors_map_to_rpc_codes() {
    assert_eq!(
        RpcError::from_app(&AppError::Protocol("bad".into())).code,
        -32600
    );
    assert_eq!(
        RpcError::from_app(&AppError::NotFound("x".into())).code,
        -32001
    );
    assert_eq!(
        RpcError::from_app(&AppError::Session("busy".into())).code,
        -32002
    );
    assert_eq!(
        RpcError::from_app(&AppError::Tool("failed".into())).code,
        -32000
    );
}
