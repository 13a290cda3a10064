use serde_json::Value;
use tracing::debug;

use pitchdeck_protocol::{JobStatus, MessageKind, StatusMessage};

/// Progress of one analysis job as seen on its status stream.
///
/// Payloads are loosely shaped, so each kind accepts a bare value or an
/// object carrying it. Anything unrecognised is counted and otherwise ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub status: JobStatus,
    /// Completion percentage in `0..=100`, once reported.
    pub percent: Option<f64>,
    /// Latest free-form status text.
    pub detail: Option<String>,
    pub error: Option<String>,
    /// Messages applied so far.
    pub updates: u64,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            status: JobStatus::Pending,
            percent: None,
            detail: None,
            error: None,
            updates: 0,
        }
    }
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one status message into the progress.
    pub fn apply(&mut self, msg: &StatusMessage) {
        self.updates += 1;
        match msg.kind {
            MessageKind::Progress => self.apply_progress(&msg.data),
            MessageKind::Status => self.apply_status(&msg.data),
            MessageKind::Error => self.apply_error(&msg.data),
        }
    }

    /// Whether the job has completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn apply_progress(&mut self, data: &Value) {
        let pct = data.as_f64().or_else(|| {
            ["pct", "percent", "progress"]
                .iter()
                .find_map(|key| data.get(key).and_then(Value::as_f64))
        });
        let Some(pct) = pct else {
            debug!(?data, "progress without a percentage");
            return;
        };
        self.percent = Some(pct.clamp(0.0, 100.0));
        if !self.is_terminal() {
            self.status = JobStatus::Processing;
        }
    }

    fn apply_status(&mut self, data: &Value) {
        let text = data
            .as_str()
            .or_else(|| data.get("status").and_then(Value::as_str));
        let Some(text) = text else {
            debug!(?data, "status without a status string");
            return;
        };

        match JobStatus::parse(text) {
            Some(status) => {
                self.status = status;
                if status == JobStatus::Completed {
                    self.percent = Some(100.0);
                }
            }
            None => self.detail = Some(text.to_string()),
        }
        if let Some(message) = data.get("message").and_then(Value::as_str) {
            self.detail = Some(message.to_string());
        }
    }

    fn apply_error(&mut self, data: &Value) {
        let message = data
            .as_str()
            .or_else(|| data.get("message").and_then(Value::as_str))
            .unwrap_or("analysis failed");
        self.error = Some(message.to_string());
        self.status = JobStatus::Failed;
    }
}
