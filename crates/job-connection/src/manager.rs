//! Connection manager for one job's status stream.
//!
//! Opens the WebSocket for a job, tracks its lifecycle state, dispatches
//! inbound status messages to the handler, and reconnects on a fixed delay
//! after any close that was not requested locally.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use pitchdeck_protocol::{JobId, StatusMessage};

use crate::reconnection::{
    WsContext, cancel_reconnect, open_connection, schedule_reconnect, send_status, teardown,
};
use crate::transport::{Connector, TungsteniteConnector};
use crate::types::{ChannelConfig, ConnectionEvent, ConnectionState, MessageHandler};

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Connection manager for a single job.
///
/// Dropping the manager tears the channel down.
pub struct ConnectionManager {
    ctx: WsContext,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager that connects with `tokio-tungstenite`.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn new(job_id: JobId, config: &ChannelConfig, handler: MessageHandler) -> Self {
        Self::with_connector(job_id, config, handler, Arc::new(TungsteniteConnector))
    }

    /// Creates a manager over a custom transport.
    pub fn with_connector(
        job_id: JobId,
        config: &ChannelConfig,
        handler: MessageHandler,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let url: Arc<str> = config.endpoint_for(&job_id).into();

        Self {
            ctx: WsContext {
                job_id,
                url,
                connector,
                policy: config.reconnect.clone(),
                handler,
                ws_client: Arc::new(std::sync::Mutex::new(None)),
                state: Arc::new(state_tx),
                events_tx,
                connect_lock: Arc::new(Mutex::new(())),
                reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
                torn_down: Arc::new(AtomicBool::new(false)),
                generation: Arc::new(AtomicU64::new(0)),
            },
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.ctx.job_id
    }

    /// Streaming endpoint this manager connects to.
    pub fn endpoint(&self) -> &str {
        &self.ctx.url
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Opens the connection.
    ///
    /// A no-op while a connection is open or being opened. A failed attempt
    /// leaves the manager `Closed` with a reconnect scheduled. Calling this
    /// after [`close`](Self::close) re-arms the manager.
    pub async fn connect(&self) {
        self.ctx.torn_down.store(false, Ordering::SeqCst);
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(job = %self.ctx.job_id, state = ?self.state(), "connect ignored");
            return;
        }

        cancel_reconnect(&self.ctx.reconnect_cancel);
        if let Err(e) = open_connection(&self.ctx).await {
            warn!(job = %self.ctx.job_id, error = %e, "connection failed");
            schedule_reconnect(&self.ctx);
        }
    }

    /// Sends a status message if the channel is open. Otherwise the
    /// message is dropped without error.
    pub fn send(&self, message: &StatusMessage) {
        send_status(&self.ctx, message);
    }

    /// Cloneable handle for sending on this channel.
    pub fn sender(&self) -> StatusSender {
        StatusSender {
            ctx: self.ctx.clone(),
        }
    }

    /// Closes the connection and cancels any pending reconnect.
    ///
    /// Idempotent. The manager returns to `Idle`.
    pub fn close(&self) {
        if self.ctx.torn_down.load(Ordering::SeqCst) && self.state() == ConnectionState::Idle {
            return;
        }
        teardown(&self.ctx);
        info!(job = %self.ctx.job_id, "job status channel closed");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        teardown(&self.ctx);
    }
}

/// Send handle for a job's status channel.
///
/// Sends while the channel is not open are dropped; after teardown every send
/// is dropped.
#[derive(Clone)]
pub struct StatusSender {
    ctx: WsContext,
}

impl StatusSender {
    pub fn send(&self, message: &StatusMessage) {
        send_status(&self.ctx, message);
    }

    pub fn job_id(&self) -> &JobId {
        &self.ctx.job_id
    }

    pub fn is_open(&self) -> bool {
        self.ctx.state() == ConnectionState::Open
    }
}

impl std::fmt::Debug for StatusSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSender")
            .field("job_id", &self.ctx.job_id)
            .field("state", &self.ctx.state())
            .finish()
    }
}
