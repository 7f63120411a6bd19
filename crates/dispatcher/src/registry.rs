use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tracing::{debug, error, info, warn};

use master_config::{AppConfig, MasterConfig};
use master_domain::{
    Clock, HistoryRecord, PieceReport, Report, ReportMessage, SlaveId, SystemClock, TaskMessage,
};
use master_errors::{MasterError, MasterResult};

use crate::failover::OrphanedTask;
use crate::revaluation;
use crate::role::{DispatchRole, DispatchScope, Dispatched};
use crate::sequence::UidSequence;
use crate::slave::SlaveConnection;
use crate::strategies::{selector_for, IdleSlaveSelector, SlaveSelector};
use crate::traits::{PerformanceTracked, Reportable, SlaveTransport};

/// 注册表行为开关，来自 [`MasterConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOptions {
    pub normalize_indices: bool,
    pub redispatch_on_disconnect: bool,
    pub history_limit: Option<usize>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from(&MasterConfig::default())
    }
}

impl From<&MasterConfig> for RegistryOptions {
    fn from(config: &MasterConfig) -> Self {
        Self {
            normalize_indices: config.normalize_indices,
            redispatch_on_disconnect: config.redispatch_on_disconnect,
            history_limit: config.history_limit,
        }
    }
}

/// 一份报告的处理结果。过期报告不是错误
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Completed {
        uid: u64,
        slave: SlaveId,
        role: Option<String>,
        elapsed: i64,
    },
    /// uid 不在该从节点的在途集合中（重复投递、故障转移后迟到的报告等）
    Stale { uid: u64, slave: SlaveId },
    /// 分片报告属于并行分片派发器，原样交还调用方
    Piece(PieceReport),
}

/// 一个主控进程内全部角色、从节点与全局 uid 序列的持有者
///
/// 所有修改都必须串行进行：要么只在一个任务里访问，要么在整个派发/报告处理步骤中
/// 持有同一把锁（见 [`MasterService`](crate::service::MasterService)）。
pub struct Registry {
    pub(crate) sequence: UidSequence,
    pub(crate) slaves: BTreeMap<SlaveId, SlaveConnection>,
    pub(crate) roles: BTreeMap<String, DispatchRole>,
    pub(crate) orphans: BTreeMap<u64, OrphanedTask>,
    pub(crate) next_slave_id: u64,
    pub(crate) completed_total: u64,
    pub(crate) options: RegistryOptions,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) selector: Arc<dyn SlaveSelector>,
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            sequence: UidSequence::new(),
            slaves: BTreeMap::new(),
            roles: BTreeMap::new(),
            orphans: BTreeMap::new(),
            next_slave_id: 0,
            completed_total: 0,
            options,
            clock: Arc::new(SystemClock),
            selector: Arc::new(IdleSlaveSelector),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn SlaveSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// 按配置创建注册表并注册配置期角色
    pub fn from_config(config: &AppConfig) -> MasterResult<Self> {
        let mut registry = Self::new(RegistryOptions::from(&config.master))
            .with_selector(selector_for(config.master.selection));

        for role_config in &config.roles {
            let mut role = DispatchRole::new(&role_config.name);
            match (role_config.resource, role_config.enforced) {
                (Some(resource), true) => role.enforce_resource(resource),
                (Some(resource), false) => role.set_resource(resource),
                (None, _) => {}
            }
            registry.add_role(role)?;
        }

        info!(
            "注册表初始化完成: {} 个角色, 选择策略 {}",
            registry.roles.len(),
            registry.selector.name()
        );
        Ok(registry)
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// 最近发放或观察到的 uid
    pub fn uid_counter(&self) -> u64 {
        self.sequence.current()
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total
    }

    // ---- roles ----

    pub fn add_role(&mut self, role: DispatchRole) -> MasterResult<()> {
        if self.roles.contains_key(role.name()) {
            return Err(MasterError::duplicate_role(role.name()));
        }
        debug!("注册角色 {} (资源指数: {})", role.name(), role.resource());
        self.roles.insert(role.name().to_string(), role);
        Ok(())
    }

    pub fn role(&self, name: &str) -> Option<&DispatchRole> {
        self.roles.get(name)
    }

    pub fn role_mut(&mut self, name: &str) -> Option<&mut DispatchRole> {
        self.roles.get_mut(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &DispatchRole> {
        self.roles.values()
    }

    // ---- slaves ----

    /// 接入一个从节点，返回其句柄。句柄按接入顺序递增，也是选择时的枚举顺序
    pub fn add_slave(&mut self, name: impl Into<String>, transport: Arc<dyn SlaveTransport>) -> SlaveId {
        self.next_slave_id += 1;
        let id = SlaveId(self.next_slave_id);
        let slave = SlaveConnection::new(id, name, transport);

        info!("从节点 {} ({}) 已接入", id, slave.name());
        gauge!("master_slave_performance", "slave" => id.to_string()).set(slave.performance());
        self.slaves.insert(id, slave);
        gauge!("master_live_slaves").set(self.live_slave_count() as f64);
        id
    }

    pub fn slave(&self, id: SlaveId) -> Option<&SlaveConnection> {
        self.slaves.get(&id)
    }

    pub fn slave_mut(&mut self, id: SlaveId) -> Option<&mut SlaveConnection> {
        self.slaves.get_mut(&id)
    }

    pub fn slaves(&self) -> impl Iterator<Item = &SlaveConnection> {
        self.slaves.values()
    }

    pub fn live_slave_count(&self) -> usize {
        self.slaves.values().filter(|slave| !slave.is_excluded()).count()
    }

    /// 标记从节点为待移除，此后不再参与选择；在途记录保持不动
    pub fn exclude_slave(&mut self, id: SlaveId) -> MasterResult<()> {
        let slave = self
            .slaves
            .get_mut(&id)
            .ok_or_else(|| MasterError::slave_not_found(id.value()))?;
        slave.mark_excluded();
        gauge!("master_live_slaves").set(self.live_slave_count() as f64);
        Ok(())
    }

    // ---- dispatch ----

    /// 由指定角色派发任务，返回分配的 uid 与选中的从节点
    ///
    /// 没有可用从节点时立即失败，不在内部重试。
    pub fn dispatch(&mut self, role: &str, task: TaskMessage) -> MasterResult<Dispatched> {
        self.dispatch_task(role, task).map_err(|(error, _)| error)
    }

    pub(crate) fn dispatch_task(
        &mut self,
        role_name: &str,
        task: TaskMessage,
    ) -> Result<Dispatched, (MasterError, TaskMessage)> {
        let now = self.clock.now();
        let Registry {
            sequence,
            slaves,
            roles,
            selector,
            ..
        } = self;

        let Some(role) = roles.get_mut(role_name) else {
            return Err((MasterError::role_not_found(role_name), task));
        };

        let scope = DispatchScope {
            slaves,
            sequence,
            selector: &**selector,
            now,
        };
        match role.dispatch(task, scope) {
            Ok(dispatched) => {
                counter!("master_tasks_dispatched_total", "role" => role_name.to_string())
                    .increment(1);
                Ok(dispatched)
            }
            Err(failure) => {
                match &failure.error {
                    MasterError::Transport(_) => {
                        error!("角色 {} 派发失败: {}", role_name, failure.error)
                    }
                    _ => warn!("角色 {} 派发失败: {}", role_name, failure.error),
                }
                counter!("master_dispatch_failures_total", "role" => role_name.to_string())
                    .increment(1);
                Err((failure.error, failure.task))
            }
        }
    }

    // ---- completion ----

    /// 处理从节点上报的原始 JSON 报告
    pub fn handle_report_json(&mut self, slave: SlaveId, raw: &str) -> MasterResult<ReportOutcome> {
        let message = ReportMessage::from_json(raw)?;
        self.handle_report(slave, message)
    }

    /// 处理从节点上报的历史记录
    ///
    /// uid 不在该从节点在途集合中时静默丢弃，不改变任何状态。找到时：完成记录，
    /// 在从节点与所属角色上同时移入已完成集合，重估性能指数与资源指数，最后触发
    /// 注册表级的完成钩子。
    pub fn handle_report(
        &mut self,
        slave_id: SlaveId,
        message: ReportMessage,
    ) -> MasterResult<ReportOutcome> {
        let report = match message.into_report()? {
            Report::Piece(piece) => {
                debug!("从节点 {} 的分片报告 uid {} 交由分片派发器处理", slave_id, piece.uid);
                return Ok(ReportOutcome::Piece(piece));
            }
            Report::Role(report) => report,
        };
        let uid = report.uid;

        let Some(slave) = self.slaves.get_mut(&slave_id) else {
            if slave_id.value() <= self.next_slave_id {
                // 已断开并移除的从节点发来的迟到报告
                return Ok(self.stale(uid, slave_id));
            }
            return Err(MasterError::slave_not_found(slave_id.value()));
        };

        let Some(entry) = slave.in_flight_entry(uid) else {
            return Ok(self.stale(uid, slave_id));
        };

        // 角色上的在途记录已指向别的从节点：这是被续传取代的旧尝试
        let superseded = entry.record.role().and_then(|name| self.roles.get(name)).is_some_and(
            |role| role.in_flight_record(uid).and_then(HistoryRecord::slave) != Some(slave_id),
        );
        if superseded {
            slave.forget_in_flight(uid);
            debug!("从节点 {} 上 uid {} 的尝试已被续传取代", slave_id, uid);
            return Ok(self.stale(uid, slave_id));
        }

        let now = self.clock.now();
        let Some(record) = slave.resolve(uid, now) else {
            return Ok(self.stale(uid, slave_id));
        };

        let role_name = record.role().map(str::to_string);
        if let Some(name) = role_name.as_deref() {
            match self.roles.get_mut(name) {
                Some(role) => {
                    role.resolve(uid, now);
                }
                None => warn!("uid {} 关联的角色 {} 不存在", uid, name),
            }
        }

        if let Some(limit) = self.options.history_limit {
            if let Some(slave) = self.slaves.get_mut(&slave_id) {
                slave.trim_history(limit);
            }
            if let Some(role) = role_name.as_deref().and_then(|n| self.roles.get_mut(n)) {
                role.trim_history(limit);
            }
        }

        revaluation::revalue_after_completion(
            &mut self.slaves,
            &mut self.roles,
            slave_id,
            role_name.as_deref(),
        );
        self.on_history_completed(&record);

        let elapsed = record.elapsed().unwrap_or(1);
        debug!(
            "从节点 {} 完成 uid {} (耗时 {}ms, 自报耗时 {}ms)",
            slave_id,
            uid,
            elapsed,
            report.reported_elapsed()
        );

        Ok(ReportOutcome::Completed {
            uid,
            slave: slave_id,
            role: role_name,
            elapsed,
        })
    }

    // ---- replies ----

    /// 把从节点发回的普通消息交给角色的回复处理器
    ///
    /// 带角色名的消息只投递给该角色；不带角色名的消息广播给所有角色。
    /// 返回实际收到消息的处理器数量。
    pub fn route_reply(&self, from: SlaveId, message: &TaskMessage) -> usize {
        match message.role_name.as_deref() {
            Some(name) => match self.roles.get(name) {
                Some(role) => deliver_reply(role, from, message),
                None => {
                    warn!("从节点 {} 的回复指向未知角色 {}，已丢弃", from, name);
                    0
                }
            },
            None => self
                .roles
                .values()
                .map(|role| deliver_reply(role, from, message))
                .sum(),
        }
    }

    fn stale(&self, uid: u64, slave: SlaveId) -> ReportOutcome {
        debug!("丢弃从节点 {} 关于 uid {} 的过期报告", slave, uid);
        counter!("master_stale_reports_total").increment(1);
        ReportOutcome::Stale { uid, slave }
    }

    /// 注册表级完成钩子：汇总计数、可选的指数归一化与指标上报
    fn on_history_completed(&mut self, record: &HistoryRecord) {
        self.completed_total += 1;

        if self.options.normalize_indices {
            revaluation::normalize_indices(&mut self.slaves, &mut self.roles);
        }

        if let Some(role) = record.role() {
            counter!("master_tasks_completed_total", "role" => role.to_string()).increment(1);
        }
        for slave in self.slaves.values() {
            gauge!("master_slave_performance", "slave" => slave.id().to_string())
                .set(slave.index());
        }
        for role in self.roles.values() {
            gauge!("master_role_resource", "role" => role.name().to_string()).set(role.index());
        }
    }
}

fn deliver_reply(role: &DispatchRole, from: SlaveId, message: &TaskMessage) -> usize {
    match role.reply_handler() {
        Some(handler) => {
            handler.on_reply(role.name(), from, message);
            1
        }
        None => 0,
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("uid_counter", &self.sequence.current())
            .field("slaves", &self.slaves)
            .field("roles", &self.roles)
            .field("orphans", &self.orphans.len())
            .field("options", &self.options)
            .finish()
    }
}
