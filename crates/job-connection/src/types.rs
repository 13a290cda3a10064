//! Public types for the job status channel.

use std::sync::Arc;
use std::time::Duration;

use pitchdeck_protocol::constants::{DEFAULT_WS_URL, RECONNECT_DELAY, WS_JOB_PATH};
use pitchdeck_protocol::{JobId, StatusMessage};

/// Lifecycle state of a job's streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempted, or the channel was torn down.
    Idle,
    /// Connection attempt in flight.
    Connecting,
    /// Connected; messages flow both ways.
    Open,
    /// Connection lost while still wanted; a reconnect is scheduled.
    Closed,
}

/// Events emitted by a connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection moved to a new lifecycle state.
    StateChanged {
        job_id: JobId,
        state: ConnectionState,
    },
    /// A reconnection attempt has been scheduled.
    Reconnecting {
        job_id: JobId,
        attempt: u32,
        next_retry_secs: f64,
    },
    /// An inbound frame could not be decoded and was dropped.
    MalformedFrame { job_id: JobId, error: String },
}

/// Handler invoked for every decoded inbound status message, in arrival order.
pub type MessageHandler = Arc<dyn Fn(StatusMessage) + Send + Sync>;

/// Fixed-delay, unbounded reconnection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay between a disconnect (or failed attempt) and the next attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the given attempt (1-based). Constant: no backoff growth.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Where and how to open job status streams.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket base URL, e.g. `ws://localhost:8000`.
    pub ws_base_url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_base_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChannelConfig {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            ..Self::default()
        }
    }

    /// Streaming endpoint for a job: `{base}/ws/{job_id}`.
    pub fn endpoint_for(&self, job_id: &JobId) -> String {
        format!(
            "{}{}{}",
            self.ws_base_url.trim_end_matches('/'),
            WS_JOB_PATH,
            job_id.path_segment()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_policy_defaults_to_five_seconds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn reconnect_policy_does_not_back_off() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(250));
        for attempt in [1, 2, 10, 1_000] {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn endpoint_substitutes_job_id() {
        let config = ChannelConfig::new("ws://analyzer.local:8000/");
        assert_eq!(
            config.endpoint_for(&JobId::from("job-42")),
            "ws://analyzer.local:8000/ws/job-42"
        );
    }

    #[test]
    fn endpoint_uses_default_base() {
        let config = ChannelConfig::default();
        assert_eq!(
            config.endpoint_for(&JobId::from("abc")),
            "ws://localhost:8000/ws/abc"
        );
    }

    #[test]
    fn connection_state_equality() {
        assert_eq!(ConnectionState::Open, ConnectionState::Open);
        assert_ne!(ConnectionState::Open, ConnectionState::Connecting);
    }
}
