//! WebSocket read pump — decodes and dispatches inbound status frames.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pitchdeck_protocol::constants::WS_MAX_MESSAGE_SIZE;
use pitchdeck_protocol::{JobId, StatusMessage};

use crate::types::{ConnectionEvent, MessageHandler};
use crate::ws_client::Dispatch;

/// Reads frames from the WebSocket and dispatches them.
///
/// When the stream ends on its own (close frame, error, EOF) the write pump is
/// stopped and the disconnect callback runs. When the loop ends because of
/// `cancel`, the close was requested locally and the callback is skipped.
pub(crate) async fn read_pump<S>(
    mut read: S,
    dispatch: Dispatch,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let Dispatch {
        job_id,
        handler,
        events_tx,
        on_disconnect,
    } = dispatch;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_message(&job_id, &text, &handler, &events_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!(job = %job_id, "received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(job = %job_id, ?frame, "received close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        trace!(job = %job_id, "ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        warn!(job = %job_id, error = %e, "WebSocket read error");
                        break;
                    }
                    None => {
                        debug!(job = %job_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return;
    }
    cancel.cancel();
    on_disconnect();
}

/// Decodes one text frame and hands it to the handler.
///
/// Undecodable frames are logged, reported as [`ConnectionEvent::MalformedFrame`]
/// and dropped; the connection stays up.
fn handle_text_message(
    job_id: &JobId,
    text: &str,
    handler: &MessageHandler,
    events_tx: &mpsc::Sender<ConnectionEvent>,
) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!(job = %job_id, "message too large ({} bytes), dropping", text.len());
        report_malformed(job_id, format!("frame of {} bytes exceeds limit", text.len()), events_tx);
        return;
    }

    let msg = match StatusMessage::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(job = %job_id, error = %e, "failed to parse status message");
            report_malformed(job_id, e.to_string(), events_tx);
            return;
        }
    };

    trace!(job = %job_id, kind = %msg.kind, "received status message");
    handler(msg);
}

fn report_malformed(job_id: &JobId, error: String, events_tx: &mpsc::Sender<ConnectionEvent>) {
    let event = ConnectionEvent::MalformedFrame {
        job_id: job_id.clone(),
        error,
    };
    if let Err(e) = events_tx.try_send(event) {
        trace!(job = %job_id, "connection event dropped: {e}");
    }
}
