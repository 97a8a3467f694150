//! Local socket transport adapter.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate and drives each accepted stream through
//! the shared connection driver in [`crate::transport::stream`], so both
//! transports speak the identical newline-delimited JSON-RPC shape.

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::bridge::Bridge;
use crate::transport::stream::run_connection;
use crate::{AppError, Result};

/// Spawn the socket listener task.
///
/// Each accepted stream becomes its own [`Connection`] with an independent
/// request-id space and pending map.
///
/// # Errors
///
/// Returns `AppError::Transport` if the listener cannot be created.
///
/// [`Connection`]: crate::transport::conn::Connection
pub fn spawn_socket_listener(
    bridge: Arc<Bridge>,
    socket_name: &str,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = socket_name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Transport(format!("invalid socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Transport(format!("failed to create socket listener: {err}")))?;

    info!(socket = %name, "socket transport listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("socket_listener", socket = %name);
        async move {
            let mut next_conn = 0_u64;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("socket listener shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                next_conn += 1;
                                let conn_id = format!("socket-{next_conn}");
                                let bridge = Arc::clone(&bridge);
                                let cancel = cancel.clone();
                                tokio::spawn(async move {
                                    let (reader, writer) = stream.split();
                                    if let Err(err) =
                                        run_connection(reader, writer, bridge, conn_id, cancel).await
                                    {
                                        warn!(error = %err, "socket connection ended with error");
                                    }
                                });
                            }
                            Err(err) => {
                                warn!(%err, "socket accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}
