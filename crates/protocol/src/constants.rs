use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay between a disconnect and the next reconnection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Maximum inbound frame size in bytes (1 MB).
///
/// Status frames are small JSON objects; anything larger is a broken peer.
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Path prefix of the per-job status stream. The job identifier follows it.
pub const WS_JOB_PATH: &str = "/ws/";

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default WebSocket base URL.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

/// Largest deck or knowledge file accepted for upload (10 MiB).
pub const MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// Discriminant of a [`StatusMessage`](crate::envelope::StatusMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Progress,
    Status,
    Error,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Status => "status",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
