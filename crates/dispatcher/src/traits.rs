use chrono::{DateTime, Utc};

use master_domain::{HistoryRecord, SlaveId, TaskMessage};
use master_errors::MasterResult;

/// 从节点的传输层会话
///
/// `send` 只负责投递，不等待回复；回复以入站事件的形式另行到达。
pub trait SlaveTransport: Send + Sync {
    fn send(&self, task: &TaskMessage) -> MasterResult<()>;
}

/// 可以接收任务
pub trait Dispatchable {
    fn deliver(&self, task: &TaskMessage) -> MasterResult<()>;
}

/// 可以把一个 uid 的报告解析为已完成的记录
pub trait Reportable {
    /// 在途记录中存在该 uid 时，以 `at` 完成记录并移入已完成集合；否则返回 None 且不改变状态
    fn resolve(&mut self, uid: u64, at: DateTime<Utc>) -> Option<HistoryRecord>;
}

/// 持有一个可重估的指数（从节点的性能指数、角色的资源指数）
pub trait PerformanceTracked {
    fn index(&self) -> f64;

    /// 写入重估后的指数，返回是否实际生效
    fn revalue(&mut self, value: f64) -> bool;
}

/// 从节点发回的非报告消息的接收方，按角色注册
pub trait ReplyHandler: Send + Sync {
    fn on_reply(&self, role: &str, from: SlaveId, message: &TaskMessage);
}
