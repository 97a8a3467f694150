//! Byte-stream transport adapter.
//!
//! Drives one peer connection over any `AsyncRead`/`AsyncWrite` pair framed
//! by [`LineCodec`]. The stdio transport is this driver applied to
//! stdin/stdout; the socket transport applies it to each accepted socket
//! stream.
//!
//! Inbound frames are classified by [`Frame::classify`] — responses first —
//! and routed either into the connection's pending-request map or into the
//! bridge dispatch. Requests are handled on spawned tasks so a long-running
//! `session/prompt` never blocks this loop from delivering the permission
//! responses that prompt is suspended on.
//!
//! Malformed frames are logged and skipped; they never terminate the loop.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::bridge::Bridge;
use crate::protocol::codec::LineCodec;
use crate::protocol::message::Frame;
use crate::transport::conn::Connection;
use crate::{AppError, Result};

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

/// Run the bridge over stdin/stdout until EOF or cancellation.
///
/// # Errors
///
/// Propagates fatal I/O failures from the underlying stream; clean EOF and
/// cancellation return `Ok(())`.
pub async fn run_stdio(bridge: Arc<Bridge>, cancel: CancellationToken) -> Result<()> {
    run_connection(
        tokio::io::stdin(),
        tokio::io::stdout(),
        bridge,
        "stdio".to_owned(),
        cancel,
    )
    .await
}

/// Drive one connection over a reader/writer pair.
///
/// Returns when the peer closes the stream, the writer fails, or `cancel`
/// fires. On exit every outstanding request is failed with a synthetic
/// disconnect and the bridge is told the connection is gone so its sessions
/// enter the disconnect grace window.
///
/// # Errors
///
/// Returns `Ok(())` for clean EOF and cancellation; unrecoverable I/O errors
/// on the read side also resolve to `Ok(())` after cleanup, matching the
/// rule that a transport fault must never escape to tear down the process.
pub async fn run_connection<R, W>(
    reader: R,
    writer: W,
    bridge: Arc<Bridge>,
    conn_id: String,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let span = info_span!("connection", conn = %conn_id);
    async move {
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let conn = Arc::new(Connection::new(conn_id, outbound_tx));

        let writer_cancel = cancel.clone();
        let writer_handle = tokio::spawn(run_writer(writer, outbound_rx, writer_cancel));

        let mut framed = FramedRead::new(reader, LineCodec::new());

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("cancellation received, stopping read loop");
                    break;
                }

                item = framed.next() => {
                    match item {
                        None => {
                            debug!("peer closed the stream");
                            break;
                        }
                        Some(Err(AppError::Transport(msg))) => {
                            // Oversized line: recoverable, skip the frame.
                            warn!(error = %msg, "framing error, skipping");
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "stream read error, stopping");
                            break;
                        }
                        Some(Ok(line)) => {
                            dispatch_line(&bridge, &conn, &line).await;
                        }
                    }
                }
            }
        }

        conn.fail_all_pending("stream closed");
        bridge.connection_closed(conn.id()).await;
        writer_handle.abort();
        Ok(())
    }
    .instrument(span)
    .await
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Classify one line and route it.
async fn dispatch_line(bridge: &Arc<Bridge>, conn: &Arc<Connection>, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    match Frame::classify(line) {
        Err(err) => {
            warn!(error = %err, raw = line, "malformed frame, skipping");
        }
        Ok(Frame::Response { id, outcome }) => {
            conn.accept_response(&id, outcome);
        }
        Ok(Frame::Request { id, method, params }) => {
            let bridge = Arc::clone(bridge);
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                bridge.handle_request(&conn, &id, &method, params).await;
            });
        }
        Ok(Frame::Notification { method, params }) => {
            bridge.handle_notification(conn, &method, params).await;
        }
    }
}

/// Writer task: drain the outbound queue into the framed sink.
async fn run_writer<W>(
    writer: W,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = FramedWrite::new(writer, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("writer: cancellation received, stopping");
                break;
            }

            frame = outbound_rx.recv() => {
                match frame {
                    None => {
                        debug!("writer: outbound queue closed, stopping");
                        break;
                    }
                    Some(line) => {
                        if let Err(err) = sink.send(line).await {
                            warn!(error = %err, "writer: send failed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}
