//! Connection lifecycle and fixed-delay reconnection.
//!
//! Contains the shared [`WsContext`], the connect/disconnect transitions and
//! the reconnect loop. Connection attempts are serialized by
//! `WsContext::connect_lock`; callbacks from retired connections are recognized
//! by their generation number and ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use pitchdeck_protocol::{JobId, StatusMessage};

use crate::transport::Connector;
use crate::types::{ConnectionEvent, ConnectionState, MessageHandler, ReconnectPolicy};
use crate::ws_client::{DisconnectCallback, Dispatch, WsClient, WsError};

/// Shared state of one job's channel, cloned into callbacks and tasks.
#[derive(Clone)]
pub(crate) struct WsContext {
    pub(crate) job_id: JobId,
    pub(crate) url: Arc<str>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) handler: MessageHandler,
    pub(crate) ws_client: Arc<std::sync::Mutex<Option<WsClient>>>,
    pub(crate) state: Arc<watch::Sender<ConnectionState>>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) connect_lock: Arc<Mutex<()>>,
    pub(crate) reconnect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    /// Set by explicit teardown; cleared by an explicit connect.
    pub(crate) torn_down: Arc<AtomicBool>,
    /// Bumped on every connection attempt and on teardown.
    pub(crate) generation: Arc<AtomicU64>,
}

impl WsContext {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Updates the state and emits an event when it actually changed.
    pub(crate) fn set_state(&self, new_state: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            *state = new_state;
            true
        });
        if changed {
            debug!(job = %self.job_id, state = ?new_state, "connection state changed");
            self.emit(ConnectionEvent::StateChanged {
                job_id: self.job_id.clone(),
                state: new_state,
            });
        }
    }

    /// Emits an event without waiting; dropped if nobody keeps up.
    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!(job = %self.job_id, "connection event dropped: {e}");
        }
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Cancels the pending reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = reconnect_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Opens a connection unless one is already open.
///
/// On failure the state is `Closed` and the error is returned; scheduling the
/// retry is left to the caller.
pub(crate) async fn open_connection(ctx: &WsContext) -> Result<(), WsError> {
    let _guard = ctx.connect_lock.lock().await;

    if ctx.is_torn_down() {
        debug!(job = %ctx.job_id, "channel torn down, not connecting");
        return Ok(());
    }
    if ctx.state() == ConnectionState::Open {
        trace!(job = %ctx.job_id, "already open");
        return Ok(());
    }

    ctx.set_state(ConnectionState::Connecting);
    let generation = ctx.generation.fetch_add(1, Ordering::SeqCst) + 1;
    // Teardown takes no lock and may have landed since the check above.
    if ctx.is_torn_down() {
        ctx.set_state(ConnectionState::Idle);
        return Ok(());
    }
    info!(job = %ctx.job_id, url = %ctx.url, "connecting to job status stream");

    let on_disconnect: DisconnectCallback = {
        let ctx = ctx.clone();
        Box::new(move || {
            tokio::spawn(handle_disconnect(ctx, generation));
        })
    };
    let dispatch = Dispatch {
        job_id: ctx.job_id.clone(),
        handler: ctx.handler.clone(),
        events_tx: ctx.events_tx.clone(),
        on_disconnect,
    };

    match WsClient::connect(ctx.connector.as_ref(), &ctx.url, dispatch).await {
        Ok(client) => {
            if ctx.is_torn_down() || !ctx.is_current(generation) {
                debug!(job = %ctx.job_id, "channel torn down while connecting, discarding");
                client.close();
                settle_discarded(ctx);
                return Ok(());
            }
            if let Ok(mut slot) = ctx.ws_client.lock()
                && let Some(stale) = slot.replace(client)
            {
                stale.close();
            }
            ctx.set_state(ConnectionState::Open);
            info!(job = %ctx.job_id, "job status stream open");
            Ok(())
        }
        Err(e) => {
            if ctx.is_torn_down() || !ctx.is_current(generation) {
                debug!(job = %ctx.job_id, error = %e, "attempt of a torn-down channel failed");
                settle_discarded(ctx);
                return Ok(());
            }
            ctx.set_state(ConnectionState::Closed);
            Err(e)
        }
    }
}

/// A discarded attempt must not leave a torn-down channel in `Connecting`.
fn settle_discarded(ctx: &WsContext) {
    if ctx.is_torn_down() {
        ctx.set_state(ConnectionState::Idle);
    }
}

/// Runs when a connection ends without an explicit close.
async fn handle_disconnect(ctx: WsContext, generation: u64) {
    let _guard = ctx.connect_lock.lock().await;

    if ctx.is_torn_down() || !ctx.is_current(generation) {
        debug!(job = %ctx.job_id, generation, "ignoring disconnect of a retired connection");
        return;
    }

    if let Ok(mut slot) = ctx.ws_client.lock() {
        slot.take();
    }
    info!(job = %ctx.job_id, "job status stream disconnected");
    ctx.set_state(ConnectionState::Closed);
    schedule_reconnect(&ctx);
}

/// Starts a reconnect loop, replacing any pending one.
pub(crate) fn schedule_reconnect(ctx: &WsContext) {
    let cancel = CancellationToken::new();
    if let Ok(mut guard) = ctx.reconnect_cancel.lock()
        && let Some(previous) = guard.replace(cancel.clone())
    {
        previous.cancel();
    }
    tokio::spawn(reconnect_loop(ctx.clone(), cancel));
}

/// Reconnection loop with a fixed delay and no attempt limit.
///
/// Returns a boxed future to break the recursive type cycle with
/// `open_connection` (whose disconnect callback leads back here).
pub(crate) fn reconnect_loop(
    ctx: WsContext,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let delay = ctx.policy.delay_for_attempt(attempt);
            let delay_secs = delay.as_secs_f64();

            ctx.emit(ConnectionEvent::Reconnecting {
                job_id: ctx.job_id.clone(),
                attempt,
                next_retry_secs: delay_secs,
            });
            info!(
                job = %ctx.job_id,
                attempt,
                delay_secs = format_args!("{delay_secs:.1}"),
                "reconnecting"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(job = %ctx.job_id, "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if cancel.is_cancelled() || ctx.is_torn_down() {
                return;
            }

            match open_connection(&ctx).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        job = %ctx.job_id,
                        attempt,
                        error = %e,
                        "reconnect attempt failed"
                    );
                }
            }

            if cancel.is_cancelled() {
                return;
            }
        }
    })
}

/// Explicit teardown: close the connection and suppress reconnection.
pub(crate) fn teardown(ctx: &WsContext) {
    ctx.torn_down.store(true, Ordering::SeqCst);
    ctx.generation.fetch_add(1, Ordering::SeqCst);
    cancel_reconnect(&ctx.reconnect_cancel);
    if let Ok(mut slot) = ctx.ws_client.lock()
        && let Some(client) = slot.take()
    {
        client.close();
    }
    ctx.set_state(ConnectionState::Idle);
}

/// Transmits a status message if the channel is open; drops it otherwise.
pub(crate) fn send_status(ctx: &WsContext, message: &StatusMessage) {
    if ctx.state() != ConnectionState::Open {
        debug!(job = %ctx.job_id, kind = %message.kind, "channel not open, dropping outbound message");
        return;
    }
    let Ok(slot) = ctx.ws_client.lock() else {
        return;
    };
    if let Some(client) = slot.as_ref()
        && let Err(e) = client.send_status(message)
    {
        warn!(job = %ctx.job_id, kind = %message.kind, error = %e, "outbound message dropped");
    }
}
