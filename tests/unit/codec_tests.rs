//! Unit tests for the newline-delimited JSON codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use agent_bridge::protocol::codec::{LineCodec, MAX_LINE_BYTES};
use agent_bridge::AppError;

/// A complete JSON object on a single newline-terminated line is decoded
/// without error and returned without the `\n`.
#[test]
fn single_line_decodes() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"method\":\"initialize\"}\n");

    let result = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        result,
        Some("{\"jsonrpc\":\"2.0\",\"method\":\"initialize\"}".to_owned()),
        "codec must return the line content without the trailing newline"
    );
}

/// Two frames delivered in one buffer are decoded as two separate items.
#[test]
fn batched_lines_decode_separately() {
    let mut codec = LineCodec::new();
    let raw = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"session/new\"}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"session/cancel\"}\n",
    );
    let mut buf = BytesMut::from(raw);

    assert!(codec.decode(&mut buf).expect("first decode").is_some());
    assert!(codec.decode(&mut buf).expect("second decode").is_some());
    assert!(
        codec.decode(&mut buf).expect("empty decode").is_none(),
        "no further lines must be present"
    );
}

/// A frame that arrives without its terminating `\n` is buffered until the
/// newline arrives.
#[test]
fn partial_line_is_buffered() {
    let mut codec = LineCodec::new();

    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\"");
    assert!(
        codec.decode(&mut buf).expect("partial decode").is_none(),
        "partial line must not be emitted before the newline"
    );

    buf.extend_from_slice(b",\"method\":\"initialize\"}\n");
    assert!(
        codec.decode(&mut buf).expect("completed decode").is_some(),
        "complete line must be emitted after the newline arrives"
    );
}

/// A line exceeding `MAX_LINE_BYTES` returns `AppError::Transport` rather
/// than allocating.
#[test]
fn oversized_line_is_rejected() {
    let mut codec = LineCodec::new();
    let big_line = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big_line.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Transport(msg)) => assert!(
            msg.contains("line too long"),
            "error must mention 'line too long', got: {msg}"
        ),
        other => panic!("expected Err(AppError::Transport), got: {other:?}"),
    }
}

/// The encoder terminates each frame with a single newline.
#[test]
fn encoder_appends_newline() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"jsonrpc\":\"2.0\"}".to_owned(), &mut buf)
        .expect("encode must succeed");

    assert_eq!(&buf[..], b"{\"jsonrpc\":\"2.0\"}\n");
}
