//! Mock implementations of the slave-facing traits
//!
//! These doubles keep everything in memory so dispatch, failover and reply
//! routing can be tested without real slave sessions.

use std::sync::{Arc, Mutex};

use master_dispatcher::{ReplyHandler, SlaveTransport};
use master_domain::{SlaveId, TaskMessage};
use master_errors::{MasterError, MasterResult};

/// Transport that records every task it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<TaskMessage>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<TaskMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<TaskMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn uids(&self) -> Vec<u64> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|task| task.history_uid)
            .collect()
    }
}

impl SlaveTransport for RecordingTransport {
    fn send(&self, task: &TaskMessage) -> MasterResult<()> {
        self.sent.lock().unwrap().push(task.clone());
        Ok(())
    }
}

/// Transport whose session is already gone
#[derive(Debug, Clone, Default)]
pub struct FailingTransport {
    attempts: Arc<Mutex<usize>>,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl SlaveTransport for FailingTransport {
    fn send(&self, _task: &TaskMessage) -> MasterResult<()> {
        *self.attempts.lock().unwrap() += 1;
        Err(MasterError::transport("mock session closed"))
    }
}

/// A reply as seen by a role's handler
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedReply {
    pub role: String,
    pub from: SlaveId,
    pub message: TaskMessage,
}

/// Reply handler that records every routed reply
#[derive(Debug, Clone, Default)]
pub struct RecordingReplyHandler {
    replies: Arc<Mutex<Vec<ReceivedReply>>>,
}

impl RecordingReplyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<ReceivedReply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl ReplyHandler for RecordingReplyHandler {
    fn on_reply(&self, role: &str, from: SlaveId, message: &TaskMessage) {
        self.replies.lock().unwrap().push(ReceivedReply {
            role: role.to_string(),
            from,
            message: message.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_transport() {
        let transport = RecordingTransport::new();
        let mut task = TaskMessage::new("render", json!({}));
        task.history_uid = Some(7);

        transport.send(&task).unwrap();
        assert_eq!(transport.count(), 1);
        assert_eq!(transport.uids(), vec![7]);
        assert_eq!(transport.last(), Some(task));
    }

    #[test]
    fn test_failing_transport() {
        let transport = FailingTransport::new();
        assert!(transport.send(&TaskMessage::new("render", json!({}))).is_err());
        assert_eq!(transport.attempts(), 1);
    }
}
