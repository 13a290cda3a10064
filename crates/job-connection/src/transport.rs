//! Transport seam for opening WebSocket connections.
//!
//! [`TungsteniteConnector`] is the production transport. Tests substitute an
//! in-memory [`Connector`] to drive the connection state machine.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use pitchdeck_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ws_client::WsError;

/// Outbound half of an open connection.
pub type BoxSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of an open connection.
pub type BoxStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// Future returned by [`Connector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(BoxSink, BoxStream), WsError>> + Send + 'a>>;

/// Opens a bidirectional message stream to a URL.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
            ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (write, read) = ws_stream.split();
            let sink: BoxSink = Box::pin(write);
            let stream: BoxStream = Box::pin(read);
            Ok((sink, stream))
        })
    }
}
