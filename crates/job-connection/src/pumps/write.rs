//! Outbound half of a job status connection.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use pitchdeck_protocol::JobId;

/// Drains the outbound queue into the sink, then says goodbye with a close
/// frame. Stops on cancellation, when every queue sender is gone, or on the
/// first write error.
pub(crate) async fn write_pump<S>(
    job_id: JobId,
    mut sink: S,
    mut outbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let mut sent: u64 = 0;

    let reason = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break "cancelled",
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            break "queue closed";
        };
        if let Err(e) = sink.send(frame).await {
            error!(job = %job_id, error = %e, "WebSocket write error");
            break "write failed";
        }
        sent += 1;
    };
    debug!(job = %job_id, sent, reason, "write pump stopping");

    match sink.send(Message::Close(None)).await {
        Ok(()) => trace!(job = %job_id, "close frame sent"),
        Err(e) => trace!(job = %job_id, error = %e, "close frame not sent"),
    }
}
