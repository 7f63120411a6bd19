use std::mem;

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};

use master_domain::{SlaveId, TaskMessage};
use master_errors::{MasterError, MasterResult};

use crate::registry::Registry;
use crate::role::Dispatched;

/// 暂时无法重新派发的任务，等待新的从节点接入
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanedTask {
    pub role: String,
    pub task: TaskMessage,
}

/// 一次从节点断开的处理结果，uid 均按升序排列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailoverReport {
    pub slave: SlaveId,
    /// (uid, 新的执行从节点)
    pub redispatched: Vec<(u64, SlaveId)>,
    /// 没有可用从节点，已挂起
    pub orphaned: Vec<u64>,
    /// 按配置放弃，或所属角色已不存在
    pub abandoned: Vec<u64>,
}

impl FailoverReport {
    fn new(slave: SlaveId) -> Self {
        Self {
            slave,
            ..Default::default()
        }
    }

    pub fn affected(&self) -> usize {
        self.redispatched.len() + self.orphaned.len() + self.abandoned.len()
    }
}

impl Registry {
    /// 处理从节点断开
    ///
    /// 先把从节点标记为待移除，使其不再被选中；随后清空它的在途集合。每个在途任务
    /// 带着原 uid 经所属角色重新派发（续传分支会顺带清掉角色上的旧在途记录），没有
    /// 可用从节点的任务挂起为孤儿。关闭重新派发时，任务连同角色上的在途记录一并放弃。
    /// 最后从注册表中移除该从节点，它之后发来的报告按过期处理。
    pub fn disconnect_slave(&mut self, id: SlaveId) -> MasterResult<FailoverReport> {
        let slave = self
            .slaves
            .get_mut(&id)
            .ok_or_else(|| MasterError::slave_not_found(id.value()))?;
        slave.mark_excluded();
        let entries = slave.drain_in_flight();
        self.slaves.remove(&id);

        info!("从节点 {} 已断开，处理 {} 个在途任务", id, entries.len());

        let mut report = FailoverReport::new(id);
        for entry in entries {
            let uid = entry.record.uid();
            let Some(role_name) = entry.record.role().map(str::to_string) else {
                report.abandoned.push(uid);
                continue;
            };

            if !self.options.redispatch_on_disconnect || !self.roles.contains_key(&role_name) {
                if let Some(role) = self.roles.get_mut(&role_name) {
                    role.forget_in_flight(uid);
                }
                debug!("放弃从节点 {} 上的 uid {}", id, uid);
                report.abandoned.push(uid);
                continue;
            }

            match self.dispatch_task(&role_name, entry.task) {
                Ok(dispatched) => {
                    debug!("uid {} 已重新派发到从节点 {}", uid, dispatched.slave);
                    report.redispatched.push((uid, dispatched.slave));
                }
                Err((error, task)) => {
                    warn!("uid {} 重新派发失败，挂起等待新从节点: {}", uid, error);
                    self.orphans.insert(uid, OrphanedTask { role: role_name, task });
                    report.orphaned.push(uid);
                }
            }
        }

        counter!("master_slaves_disconnected_total").increment(1);
        counter!("master_tasks_redispatched_total").increment(report.redispatched.len() as u64);
        counter!("master_tasks_abandoned_total").increment(report.abandoned.len() as u64);
        gauge!("master_live_slaves").set(self.live_slave_count() as f64);
        gauge!("master_orphaned_tasks").set(self.orphans.len() as f64);

        info!(
            "从节点 {} 故障转移完成: 重新派发 {}, 挂起 {}, 放弃 {}",
            id,
            report.redispatched.len(),
            report.orphaned.len(),
            report.abandoned.len()
        );
        Ok(report)
    }

    /// 按 uid 升序重试挂起的孤儿任务，仍然失败的继续挂起
    pub fn retry_orphans(&mut self) -> Vec<Dispatched> {
        if self.orphans.is_empty() {
            return Vec::new();
        }

        let pending = mem::take(&mut self.orphans);
        let mut dispatched = Vec::new();
        for (uid, orphan) in pending {
            match self.dispatch_task(&orphan.role, orphan.task) {
                Ok(result) => dispatched.push(result),
                Err((MasterError::RoleNotFound { .. }, _)) => {
                    warn!("孤儿任务 uid {} 的角色 {} 已不存在，放弃", uid, orphan.role);
                }
                Err((_, task)) => {
                    self.orphans.insert(
                        uid,
                        OrphanedTask {
                            role: orphan.role,
                            task,
                        },
                    );
                }
            }
        }

        if !dispatched.is_empty() {
            info!("重新派发了 {} 个孤儿任务", dispatched.len());
        }
        gauge!("master_orphaned_tasks").set(self.orphans.len() as f64);
        dispatched
    }

    pub fn orphaned_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn orphaned_uids(&self) -> impl Iterator<Item = u64> + '_ {
        self.orphans.keys().copied()
    }
}
