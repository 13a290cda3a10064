//! Consumer-side subscription to a job's status stream.
//!
//! A [`JobSubscription`] owns at most one [`ConnectionManager`]. Subscribing
//! again replaces it, so stale connections and handlers never accumulate.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use pitchdeck_protocol::{JobId, StatusMessage};

use crate::manager::{ConnectionManager, StatusSender};
use crate::transport::{Connector, TungsteniteConnector};
use crate::types::{ChannelConfig, ConnectionState, MessageHandler};

pub struct JobSubscription {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    active: Option<ConnectionManager>,
}

impl JobSubscription {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            active: None,
        }
    }

    /// Opens the status stream for `job_id`, delivering messages to `handler`.
    ///
    /// Any previous subscription is torn down first. The returned sender is
    /// bound to this subscription only.
    pub async fn subscribe(&mut self, job_id: JobId, handler: MessageHandler) -> StatusSender {
        self.unsubscribe();

        let manager = ConnectionManager::with_connector(
            job_id,
            &self.config,
            handler,
            self.connector.clone(),
        );
        manager.connect().await;
        let sender = manager.sender();
        self.active = Some(manager);
        sender
    }

    /// Like [`subscribe`](Self::subscribe), but delivers messages on a channel.
    pub async fn subscribe_channel(
        &mut self,
        job_id: JobId,
    ) -> (StatusSender, mpsc::UnboundedReceiver<StatusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |msg: StatusMessage| {
            let _ = tx.send(msg);
        });
        let sender = self.subscribe(job_id, handler).await;
        (sender, rx)
    }

    /// Closes the stream and suppresses reconnection. No-op when idle.
    pub fn unsubscribe(&mut self) {
        if let Some(manager) = self.active.take() {
            debug!(job = %manager.job_id(), "releasing job subscription");
            manager.close();
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.active.as_ref().map(ConnectionManager::job_id)
    }

    pub fn state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map_or(ConnectionState::Idle, ConnectionManager::state)
    }

    /// The active manager, for observing state and events.
    pub fn manager(&self) -> Option<&ConnectionManager> {
        self.active.as_ref()
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite;

    fn subscription(connector: &Arc<MockConnector>) -> JobSubscription {
        JobSubscription::with_connector(ChannelConfig::new("ws://analyzer.test"), connector.clone())
    }

    fn counting_handler() -> (MessageHandler, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let handler: MessageHandler = Arc::new(move |_: StatusMessage| *c.lock().unwrap() += 1);
        (handler, count)
    }

    #[tokio::test]
    async fn idle_before_subscribe() {
        let connector = Arc::new(MockConnector::new());
        let sub = subscription(&connector);
        assert_eq!(sub.state(), ConnectionState::Idle);
        assert!(sub.job_id().is_none());
        assert!(sub.manager().is_none());
    }

    #[tokio::test]
    async fn subscribe_opens_stream() {
        let connector = Arc::new(MockConnector::new());
        let mut sub = subscription(&connector);
        let (handler, count) = counting_handler();

        let sender = sub.subscribe(JobId::from("job-1"), handler).await;

        assert!(sender.is_open());
        assert_eq!(sub.state(), ConnectionState::Open);
        assert_eq!(sub.job_id(), Some(&JobId::from("job-1")));

        let peer = connector.take_peer().unwrap();
        peer.push_text(r#"{"type":"status","data":"processing"}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribe_replaces_connection() {
        let connector = Arc::new(MockConnector::new());
        let mut sub = subscription(&connector);
        let (old_handler, old_count) = counting_handler();
        let (new_handler, new_count) = counting_handler();

        let old_sender = sub.subscribe(JobId::from("job-1"), old_handler).await;
        let mut old_peer = connector.take_peer().unwrap();

        let new_sender = sub.subscribe(JobId::from("job-2"), new_handler).await;
        let new_peer = connector.take_peer().unwrap();
        assert_eq!(new_peer.url, "ws://analyzer.test/ws/job-2");
        assert_eq!(connector.attempts(), 2);

        // The old connection was closed, not left to linger.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut old_frames = Vec::new();
        while let Ok(frame) = old_peer.outbound.try_recv() {
            old_frames.push(frame);
        }
        assert!(matches!(old_frames.last(), Some(tungstenite::Message::Close(_))));

        // The stale sender is inert.
        assert!(!old_sender.is_open());
        old_sender.send(&StatusMessage::status(json!("stale")));
        assert!(new_sender.is_open());

        // Only the new handler hears the new stream.
        old_peer.push_text(r#"{"type":"status","data":"stale"}"#);
        new_peer.push_text(r#"{"type":"status","data":"fresh"}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*old_count.lock().unwrap(), 0);
        assert_eq!(*new_count.lock().unwrap(), 1);

        // No reconnects for the replaced job.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_suppresses_reconnect() {
        let connector = Arc::new(MockConnector::new());
        let mut sub = subscription(&connector);
        let (handler, _) = counting_handler();
        sub.subscribe(JobId::from("job-1"), handler).await;

        drop(connector.take_peer());
        tokio::time::sleep(Duration::from_secs(2)).await;
        sub.unsubscribe();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(sub.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_subscription_releases_stream() {
        let connector = Arc::new(MockConnector::new());
        let mut sub = subscription(&connector);
        let (handler, _) = counting_handler();
        let sender = sub.subscribe(JobId::from("job-1"), handler).await;

        drop(sub);
        assert!(!sender.is_open());

        drop(connector.take_peer());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn subscribe_channel_delivers_messages() {
        let connector = Arc::new(MockConnector::new());
        let mut sub = subscription(&connector);

        let (_sender, mut rx) = sub.subscribe_channel(JobId::from("job-9")).await;
        let peer = connector.take_peer().unwrap();
        peer.push_text(r#"{"type":"progress","data":{"pct":42}}"#);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, StatusMessage::progress(json!({"pct": 42})));
    }
}
