use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use master_domain::{HistoryRecord, SlaveId, TaskMessage, DEFAULT_INDEX};
use master_errors::MasterError;

use crate::sequence::UidSequence;
use crate::slave::SlaveConnection;
use crate::strategies::SlaveSelector;
use crate::traits::{Dispatchable, PerformanceTracked, ReplyHandler, Reportable};

/// 一次成功派发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispatched {
    pub uid: u64,
    pub slave: SlaveId,
}

/// 派发失败时把任务交还调用方，便于故障转移把它挂起
#[derive(Debug)]
pub(crate) struct DispatchFailure {
    pub error: MasterError,
    pub task: TaskMessage,
}

/// 角色派发时可见的注册表部分
pub(crate) struct DispatchScope<'a> {
    pub slaves: &'a mut BTreeMap<SlaveId, SlaveConnection>,
    pub sequence: &'a mut UidSequence,
    pub selector: &'a dyn SlaveSelector,
    pub now: DateTime<Utc>,
}

/// 一类工作
///
/// 角色不拥有任何从节点，派发时经注册表选择；同一 uid 在任一时刻最多出现在
/// `in_flight` 与 `completed` 之一。
pub struct DispatchRole {
    name: String,
    resource: f64,
    enforced: bool,
    in_flight: HashMap<u64, HistoryRecord>,
    completed: BTreeMap<u64, HistoryRecord>,
    reply_handler: Option<Arc<dyn ReplyHandler>>,
}

impl DispatchRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: DEFAULT_INDEX,
            enforced: false,
            in_flight: HashMap::new(),
            completed: BTreeMap::new(),
            reply_handler: None,
        }
    }

    pub fn with_reply_handler(mut self, handler: Arc<dyn ReplyHandler>) -> Self {
        self.reply_handler = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 资源指数，越高表示该角色的工作越重
    pub fn resource(&self) -> f64 {
        self.resource
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// 设置资源指数，后续完成报告仍可重估
    pub fn set_resource(&mut self, value: f64) {
        self.resource = value;
        self.enforced = false;
    }

    /// 固定资源指数，不再参与重估
    pub fn enforce_resource(&mut self, value: f64) {
        self.resource = value;
        self.enforced = true;
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn has_in_flight(&self, uid: u64) -> bool {
        self.in_flight.contains_key(&uid)
    }

    pub fn has_completed(&self, uid: u64) -> bool {
        self.completed.contains_key(&uid)
    }

    pub fn in_flight_record(&self, uid: u64) -> Option<&HistoryRecord> {
        self.in_flight.get(&uid)
    }

    pub fn completed_records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.completed.values()
    }

    pub fn reply_handler(&self) -> Option<&Arc<dyn ReplyHandler>> {
        self.reply_handler.as_ref()
    }

    /// 已完成记录的平均归一化耗时：Σ(耗时 × 执行从节点性能指数) / 计数
    ///
    /// 3 秒完成于性能指数为 5 的从节点上的任务，按 15 秒计入角色的资源消耗。
    /// 执行从节点已不在注册表中的记录被跳过；没有可用记录时返回 None。
    pub fn compute_average_elapsed<F>(&self, slave_performance: F) -> Option<f64>
    where
        F: Fn(SlaveId) -> Option<f64>,
    {
        let mut sum = 0.0;
        let mut denominator = 0usize;

        for record in self.completed.values() {
            let Some(elapsed) = record.elapsed() else {
                continue;
            };
            let Some(performance) = record.slave().and_then(&slave_performance) else {
                continue;
            };

            sum += elapsed as f64 * performance;
            denominator += 1;
        }

        (denominator > 0).then(|| sum / denominator as f64)
    }

    // ---- registry-scoped accessors ----

    /// 派发任务到最空闲的从节点
    ///
    /// 任务已带 uid 时走续传分支：序列前移到该 uid，并丢弃本角色上该 uid 的旧在途记录。
    /// 旧记录所在的从节点在新尝试送达后同样清除该 uid，保证任一 uid 最多在一个从节点上在途。
    /// 新任务只有在选出从节点之后才分配 uid，失败的派发不会产生任何记录。
    pub(crate) fn dispatch(
        &mut self,
        mut task: TaskMessage,
        scope: DispatchScope<'_>,
    ) -> Result<Dispatched, DispatchFailure> {
        let mut previous_owner = None;
        if let Some(uid) = task.history_uid {
            scope.sequence.observe(uid);
            if let Some(stale) = self.in_flight.remove(&uid) {
                debug!("角色 {} 丢弃 uid {} 的旧在途记录", self.name, uid);
                previous_owner = stale.slave();
            }
        }

        task.attach_role_name(&self.name);

        let Some(slave_id) = scope.selector.select(&mut scope.slaves.values()) else {
            return Err(DispatchFailure {
                error: MasterError::no_available_slave(&self.name),
                task,
            });
        };
        let Some(slave) = scope.slaves.get_mut(&slave_id) else {
            return Err(DispatchFailure {
                error: MasterError::slave_not_found(slave_id.value()),
                task,
            });
        };

        let uid = match task.history_uid {
            Some(uid) => uid,
            None => task.attach_history_uid(scope.sequence.next_uid()),
        };

        if let Err(error) = slave.deliver(&task) {
            return Err(DispatchFailure { error, task });
        }

        let record =
            HistoryRecord::linked(uid, task.listener.clone(), scope.now, &self.name, slave_id);
        self.completed.remove(&uid);
        self.in_flight.insert(uid, record.clone());
        slave.track(task, record);

        debug!(
            "角色 {} 派发 uid {} 到从节点 {} (在途: {}, 性能指数: {:.3})",
            self.name,
            uid,
            slave_id,
            slave.in_flight_count(),
            slave.performance()
        );

        if let Some(owner) = previous_owner.filter(|owner| *owner != slave_id) {
            if let Some(owner) = scope.slaves.get_mut(&owner) {
                if owner.forget_in_flight(uid).is_some() {
                    debug!("从节点 {} 上 uid {} 的旧尝试已清除", owner.id(), uid);
                }
            }
        }

        Ok(Dispatched {
            uid,
            slave: slave_id,
        })
    }

    pub(crate) fn forget_in_flight(&mut self, uid: u64) -> Option<HistoryRecord> {
        self.in_flight.remove(&uid)
    }

    pub(crate) fn trim_history(&mut self, limit: usize) {
        while self.completed.len() > limit {
            self.completed.pop_first();
        }
    }
}

impl Reportable for DispatchRole {
    fn resolve(&mut self, uid: u64, at: DateTime<Utc>) -> Option<HistoryRecord> {
        let mut record = self.in_flight.remove(&uid)?;
        record.complete_at(at);
        self.completed.insert(uid, record.clone());
        Some(record)
    }
}

impl PerformanceTracked for DispatchRole {
    fn index(&self) -> f64 {
        self.resource
    }

    fn revalue(&mut self, value: f64) -> bool {
        if self.enforced || !value.is_finite() || value <= 0.0 {
            return false;
        }
        self.resource = value;
        true
    }
}

impl fmt::Debug for DispatchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRole")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("enforced", &self.enforced)
            .field("in_flight", &self.in_flight.len())
            .field("completed", &self.completed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::IdleSlaveSelector;
    use crate::traits::SlaveTransport;
    use chrono::Duration;
    use master_errors::MasterResult;
    use serde_json::json;

    struct NullTransport;

    impl SlaveTransport for NullTransport {
        fn send(&self, _task: &TaskMessage) -> MasterResult<()> {
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(2_000_000).unwrap()
    }

    fn pool(count: u64) -> BTreeMap<SlaveId, SlaveConnection> {
        (1..=count)
            .map(|id| {
                let slave = SlaveConnection::new(
                    SlaveId(id),
                    format!("node-{id}"),
                    Arc::new(NullTransport),
                );
                (SlaveId(id), slave)
            })
            .collect()
    }

    fn dispatch(
        role: &mut DispatchRole,
        task: TaskMessage,
        slaves: &mut BTreeMap<SlaveId, SlaveConnection>,
        sequence: &mut UidSequence,
    ) -> Result<Dispatched, DispatchFailure> {
        role.dispatch(
            task,
            DispatchScope {
                slaves,
                sequence,
                selector: &IdleSlaveSelector,
                now: t0(),
            },
        )
    }

    #[test]
    fn test_new_role_defaults() {
        let role = DispatchRole::new("video");
        assert_eq!(role.resource(), 1.0);
        assert!(!role.is_enforced());
    }

    #[test]
    fn test_set_and_enforce_resource() {
        let mut role = DispatchRole::new("video");
        role.enforce_resource(3.0);
        assert!(role.is_enforced());
        assert!(!role.revalue(9.0));
        assert_eq!(role.resource(), 3.0);

        role.set_resource(2.0);
        assert!(!role.is_enforced());
        assert!(role.revalue(9.0));
        assert_eq!(role.resource(), 9.0);
    }

    #[test]
    fn test_dispatch_tags_task_and_records_on_both_sides() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(1);
        let mut sequence = UidSequence::new();

        let dispatched = dispatch(
            &mut role,
            TaskMessage::new("render", json!({})),
            &mut slaves,
            &mut sequence,
        )
        .unwrap();

        assert_eq!(dispatched, Dispatched { uid: 1, slave: SlaveId(1) });
        assert!(role.has_in_flight(1));

        let entry = slaves[&SlaveId(1)].in_flight_entry(1).unwrap();
        assert_eq!(entry.task.history_uid, Some(1));
        assert_eq!(entry.task.role_name.as_deref(), Some("video"));
        assert_eq!(entry.record.role(), Some("video"));
        assert_eq!(entry.record.slave(), Some(SlaveId(1)));
    }

    #[test]
    fn test_dispatch_keeps_foreign_role_name() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(1);
        let mut sequence = UidSequence::new();

        let mut task = TaskMessage::new("render", json!({}));
        task.role_name = Some("upstream".to_string());
        dispatch(&mut role, task, &mut slaves, &mut sequence).unwrap();

        let entry = slaves[&SlaveId(1)].in_flight_entry(1).unwrap();
        assert_eq!(entry.task.role_name.as_deref(), Some("upstream"));
    }

    #[test]
    fn test_dispatch_without_slaves_creates_nothing() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(0);
        let mut sequence = UidSequence::new();

        let failure = dispatch(
            &mut role,
            TaskMessage::new("render", json!({})),
            &mut slaves,
            &mut sequence,
        )
        .unwrap_err();

        assert!(matches!(failure.error, MasterError::NoAvailableSlave { .. }));
        assert_eq!(failure.task.history_uid, None);
        assert_eq!(role.in_flight_count(), 0);
        assert_eq!(sequence.current(), 0);
    }

    #[test]
    fn test_resume_dispatch_preserves_uid() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(1);
        let mut sequence = UidSequence::new();

        let mut task = TaskMessage::new("render", json!({}));
        task.history_uid = Some(41);
        let dispatched = dispatch(&mut role, task, &mut slaves, &mut sequence).unwrap();

        assert_eq!(dispatched.uid, 41);
        assert_eq!(sequence.current(), 41);
        assert!(role.has_in_flight(41));
    }

    #[test]
    fn test_resume_on_new_slave_clears_old_attempt() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(2);
        let mut sequence = UidSequence::new();
        dispatch(
            &mut role,
            TaskMessage::new("render", json!({})),
            &mut slaves,
            &mut sequence,
        )
        .unwrap();

        if let Some(first) = slaves.get_mut(&SlaveId(1)) {
            first.mark_excluded();
        }
        let mut task = TaskMessage::new("render", json!({}));
        task.history_uid = Some(1);
        let resumed = dispatch(&mut role, task, &mut slaves, &mut sequence).unwrap();

        assert_eq!(resumed, Dispatched { uid: 1, slave: SlaveId(2) });
        assert!(!slaves[&SlaveId(1)].has_in_flight(1));
        assert!(slaves[&SlaveId(2)].has_in_flight(1));
        assert_eq!(role.in_flight_record(1).unwrap().slave(), Some(SlaveId(2)));
    }

    #[test]
    fn test_failed_resume_keeps_old_attempt() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(1);
        let mut sequence = UidSequence::new();
        dispatch(
            &mut role,
            TaskMessage::new("render", json!({})),
            &mut slaves,
            &mut sequence,
        )
        .unwrap();

        if let Some(first) = slaves.get_mut(&SlaveId(1)) {
            first.mark_excluded();
        }
        let mut task = TaskMessage::new("render", json!({}));
        task.history_uid = Some(1);
        let failure = dispatch(&mut role, task, &mut slaves, &mut sequence).unwrap_err();

        assert!(matches!(failure.error, MasterError::NoAvailableSlave { .. }));
        assert!(slaves[&SlaveId(1)].has_in_flight(1));
    }

    #[test]
    fn test_resource_average_weights_by_slave_performance() {
        let mut role = DispatchRole::new("video");
        let mut slaves = pool(1);
        let mut sequence = UidSequence::new();
        dispatch(
            &mut role,
            TaskMessage::new("render", json!({})),
            &mut slaves,
            &mut sequence,
        )
        .unwrap();

        assert_eq!(role.compute_average_elapsed(|_| Some(5.0)), None);

        role.resolve(1, t0() + Duration::milliseconds(3000));
        assert_eq!(role.compute_average_elapsed(|_| Some(5.0)), Some(15000.0));
        assert_eq!(role.compute_average_elapsed(|_| None), None);
    }
}
