//! Unit tests for the tool-call lifecycle tracker.

use agent_bridge::tools::catalog::ToolKind;
use agent_bridge::tools::tracker::{call_id, ToolCallStatus, ToolCallTracker};
use agent_bridge::AppError;

/// `start` on a live call id fails; after `forget` a fresh `start` with the
/// same id succeeds.
#[test]
fn duplicate_start_fails_until_forget() {
    let mut tracker = ToolCallTracker::new();
    let id = call_id("fs/write", "src/main.rs");

    tracker
        .start(&id, "write main.rs", ToolKind::Edit, Vec::new())
        .expect("first start must succeed");

    let collision = tracker.start(&id, "write main.rs", ToolKind::Edit, Vec::new());
    assert!(
        matches!(collision, Err(AppError::Tool(_))),
        "colliding start while the prior record is live must fail, got: {collision:?}"
    );

    tracker.forget(&id);

    tracker
        .start(&id, "write main.rs", ToolKind::Edit, Vec::new())
        .expect("start after forget must succeed");
}

/// `progress` on an unknown id fails.
#[test]
fn progress_on_unknown_id_fails() {
    let mut tracker = ToolCallTracker::new();

    let result = tracker.progress("missing:id", ToolCallStatus::InProgress, None);
    assert!(
        matches!(result, Err(AppError::Tool(_))),
        "progress on absent id must fail, got: {result:?}"
    );
}

/// `progress` after a terminal transition fails until the record is
/// forgotten.
#[test]
fn progress_after_terminal_fails() {
    let mut tracker = ToolCallTracker::new();
    let id = call_id("process/run", "cargo check");

    tracker
        .start(&id, "run cargo check", ToolKind::Execute, Vec::new())
        .expect("start");
    tracker
        .progress(&id, ToolCallStatus::Completed, Some("ok".into()))
        .expect("terminal progress");

    let late = tracker.progress(&id, ToolCallStatus::InProgress, None);
    assert!(
        matches!(late, Err(AppError::Tool(_))),
        "progress on a terminal record must fail, got: {late:?}"
    );
}

/// `forget` is idempotent: unknown ids are a no-op because unconditional
/// cleanup paths call it regardless of how execution ended.
#[test]
fn forget_unknown_id_is_noop() {
    let mut tracker = ToolCallTracker::new();

    tracker.forget("never:started");
    tracker.forget("never:started");

    assert_eq!(tracker.live_count(), 0);
}

/// Start events serialize with the external `camelCase` field convention.
#[test]
fn start_event_serializes_camel_case() {
    let mut tracker = ToolCallTracker::new();
    let event = tracker
        .start("fs/read:README.md", "read README", ToolKind::Read, Vec::new())
        .expect("start");

    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["sessionUpdate"], "tool_call");
    assert_eq!(value["toolCallId"], "fs/read:README.md");
    assert_eq!(value["kind"], "read");
    assert_eq!(value["status"], "pending");
}

/// Progress output replaces the recorded summary and appears on the event.
#[test]
fn progress_updates_output_summary() {
    let mut tracker = ToolCallTracker::new();
    let id = call_id("fs/read", "Cargo.toml");
    tracker
        .start(&id, "read Cargo.toml", ToolKind::Read, Vec::new())
        .expect("start");

    let event = tracker
        .progress(&id, ToolCallStatus::Completed, Some("42 lines".into()))
        .expect("progress");

    assert_eq!(event.output.as_deref(), Some("42 lines"));
    let record = tracker.get(&id).expect("record still present until forget");
    assert_eq!(record.output.as_deref(), Some("42 lines"));
    assert_eq!(record.status, ToolCallStatus::Completed);
}
