//! WebSocket client for one job status stream.
//!
//! Owns the read and write pumps of a single live connection. Inbound
//! frames are decoded and handed to the [`MessageHandler`]; outbound frames
//! are queued without waiting.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pitchdeck_protocol::{JobId, StatusMessage};

use crate::transport::Connector;
use crate::types::{ConnectionEvent, MessageHandler};

/// Capacity of the outbound frame queue.
const WRITE_QUEUE_CAPACITY: usize = 64;

/// Errors from the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

/// Callback run once when the connection ends without an explicit close.
pub(crate) type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// Where the read pump delivers what it receives.
pub(crate) struct Dispatch {
    pub(crate) job_id: JobId,
    pub(crate) handler: MessageHandler,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) on_disconnect: DisconnectCallback,
}

/// A live connection to one job's status stream.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Opens a connection and starts its pumps.
    pub(crate) async fn connect(
        connector: &dyn Connector,
        url: &str,
        dispatch: Dispatch,
    ) -> Result<Self, WsError> {
        let (write, read) = connector.connect(url).await?;

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            let job_id = dispatch.job_id.clone();
            tokio::spawn(crate::pumps::write::write_pump(job_id, write, write_rx, cancel))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(read, dispatch, write_tx, cancel))
        };

        Ok(Self {
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        })
    }

    /// Queues a text frame. Fails if the queue is full or the pumps stopped.
    pub fn send_text(&self, text: String) -> Result<(), WsError> {
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|_| WsError::Closed)
    }

    /// Encodes a status message and queues it.
    pub fn send_status(&self, message: &StatusMessage) -> Result<(), WsError> {
        let json = message.to_json()?;
        self.send_text(json)
    }

    /// Whether the pumps are still running.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.write_tx.is_closed()
    }

    /// Closes the connection. The disconnect callback does not fire.
    pub fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("closing job status connection");
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        // The write pump sends the close frame on cancellation; let it finish.
        self._read_handle.abort();
    }
}
