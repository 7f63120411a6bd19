use tokio::sync::mpsc;

use master_domain::TaskMessage;
use master_errors::{MasterError, MasterResult};

use crate::traits::SlaveTransport;

/// 基于进程内通道的传输层
///
/// 会话任务持有接收端并把消息写到真实连接上；接收端被丢弃后发送立即失败。
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<TaskMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl SlaveTransport for ChannelTransport {
    fn send(&self, task: &TaskMessage) -> MasterResult<()> {
        self.sender
            .send(task.clone())
            .map_err(|_| MasterError::transport("从节点会话已关闭"))
    }
}
