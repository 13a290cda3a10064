//! Job status channel for the pitch deck analyzer.
//!
//! One reconnecting WebSocket connection per analysis job, inbound status
//! dispatch to a caller-supplied handler, and the subscription contract
//! consumers use to open and release the channel.

pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod ws_client;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{ConnectionManager, StatusSender};
pub use subscription::JobSubscription;
pub use transport::{Connector, TungsteniteConnector};
pub use types::{ChannelConfig, ConnectionEvent, ConnectionState, MessageHandler, ReconnectPolicy};
pub use ws_client::{WsClient, WsError};
