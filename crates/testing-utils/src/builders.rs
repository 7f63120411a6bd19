//! Test data builders for tasks and slave reports
//!
//! Reports are produced in the wire format slaves send, so tests exercise the
//! same decoding path as production traffic.

use master_domain::{ReportMessage, TaskMessage};

/// Builder for creating test TaskMessage values
pub struct TaskMessageBuilder {
    task: TaskMessage,
}

impl TaskMessageBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskMessage::new("test_listener", serde_json::json!({})),
        }
    }

    pub fn with_listener(mut self, listener: &str) -> Self {
        self.task.listener = listener.to_string();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.task.payload = payload;
        self
    }

    pub fn with_history_uid(mut self, uid: u64) -> Self {
        self.task.history_uid = Some(uid);
        self
    }

    pub fn with_role_name(mut self, role: &str) -> Self {
        self.task.role_name = Some(role.to_string());
        self
    }

    pub fn build(self) -> TaskMessage {
        self.task
    }
}

impl Default for TaskMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating wire-format slave reports
pub struct ReportBuilder {
    report: ReportMessage,
}

impl ReportBuilder {
    pub fn new(uid: u64) -> Self {
        Self {
            report: ReportMessage {
                uid,
                listener: "test_listener".to_string(),
                start_time: 0,
                end_time: 0,
                piece_first: None,
                piece_size: None,
            },
        }
    }

    pub fn with_listener(mut self, listener: &str) -> Self {
        self.report.listener = listener.to_string();
        self
    }

    /// Slave-side timestamps in milliseconds
    pub fn with_times(mut self, start_time: i64, end_time: i64) -> Self {
        self.report.start_time = start_time;
        self.report.end_time = end_time;
        self
    }

    pub fn with_piece(mut self, piece_first: u64, piece_size: u64) -> Self {
        self.report.piece_first = Some(piece_first);
        self.report.piece_size = Some(piece_size);
        self
    }

    pub fn build(self) -> ReportMessage {
        self.report
    }

    pub fn to_json(self) -> String {
        serde_json::to_string(&self.report).unwrap()
    }
}
