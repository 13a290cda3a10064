//! In-memory transport for exercising the connection state machine.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::transport::{BoxSink, BoxStream, ConnectFuture, Connector};
use crate::ws_client::WsError;

type Frame = Result<tungstenite::Message, tungstenite::Error>;

/// Server side of one mock connection.
///
/// Dropping `inbound` ends the client's read stream, which looks like an
/// abrupt close from the client's point of view.
pub(crate) struct MockPeer {
    pub(crate) url: String,
    pub(crate) inbound: mpsc::UnboundedSender<Frame>,
    pub(crate) outbound: mpsc::UnboundedReceiver<tungstenite::Message>,
}

impl MockPeer {
    pub(crate) fn push_text(&self, text: &str) {
        let _ = self
            .inbound
            .send(Ok(tungstenite::Message::Text(text.into())));
    }

    /// Server-initiated close handshake.
    pub(crate) fn push_close(&self) {
        let _ = self.inbound.send(Ok(tungstenite::Message::Close(None)));
    }

    /// Transport failure surfacing on the client's read stream.
    pub(crate) fn push_read_error(&self) {
        let _ = self.inbound.send(Err(tungstenite::Error::ConnectionClosed));
    }
}

type ConnectHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct MockConnector {
    attempts: AtomicUsize,
    failing: AtomicBool,
    peers: Mutex<VecDeque<MockPeer>>,
    on_connect: Mutex<Option<ConnectHook>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of connection attempts so far, successful or not.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Runs `hook` inside every attempt, before it resolves.
    pub(crate) fn set_on_connect(&self, hook: Option<ConnectHook>) {
        *self.on_connect.lock().unwrap() = hook;
    }

    /// Takes the oldest connection not yet taken by the test.
    pub(crate) fn take_peer(&self) -> Option<MockPeer> {
        self.peers.lock().unwrap().pop_front()
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = self.on_connect.lock().unwrap().as_ref() {
                hook();
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(WsError::Ws(tungstenite::Error::ConnectionClosed));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Frame>();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

            let read: BoxStream = Box::pin(stream::unfold(inbound_rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            }));
            let write: BoxSink = Box::pin(sink::unfold(
                outbound_tx,
                |tx, msg: tungstenite::Message| async move {
                    let _ = tx.send(msg);
                    Ok::<_, tungstenite::Error>(tx)
                },
            ));

            self.peers.lock().unwrap().push_back(MockPeer {
                url: url.to_string(),
                inbound: inbound_tx,
                outbound: outbound_rx,
            });
            Ok((write, read))
        })
    }
}
