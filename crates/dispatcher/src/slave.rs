use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use master_domain::{HistoryRecord, SlaveId, TaskMessage, DEFAULT_INDEX, NO_DATA_SENTINEL};
use master_errors::MasterResult;

use crate::traits::{Dispatchable, PerformanceTracked, Reportable, SlaveTransport};

/// 在途条目：原始任务与其历史记录。任务保留下来，以便故障转移时原样重新派发
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightEntry {
    pub task: TaskMessage,
    pub record: HistoryRecord,
}

/// 一个已连接的从节点
///
/// 同一 uid 在任一时刻最多出现在 `in_flight` 与 `completed` 之一。
pub struct SlaveConnection {
    id: SlaveId,
    name: String,
    transport: Arc<dyn SlaveTransport>,
    performance: f64,
    in_flight: HashMap<u64, InFlightEntry>,
    completed: BTreeMap<u64, HistoryRecord>,
    excluded: bool,
}

impl SlaveConnection {
    pub fn new(id: SlaveId, name: impl Into<String>, transport: Arc<dyn SlaveTransport>) -> Self {
        Self {
            id,
            name: name.into(),
            transport,
            performance: DEFAULT_INDEX,
            in_flight: HashMap::new(),
            completed: BTreeMap::new(),
            excluded: false,
        }
    }

    pub fn id(&self) -> SlaveId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 性能指数，越低越快/越空闲
    pub fn performance(&self) -> f64 {
        self.performance
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
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

    pub fn in_flight_entry(&self, uid: u64) -> Option<&InFlightEntry> {
        self.in_flight.get(&uid)
    }

    pub fn completed_record(&self, uid: u64) -> Option<&HistoryRecord> {
        self.completed.get(&uid)
    }

    pub fn completed_records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.completed.values()
    }

    /// 已完成记录的平均归一化耗时：Σ(耗时 / 所属角色资源指数) / 计数
    ///
    /// 没有可用记录时返回 [`NO_DATA_SENTINEL`]。未关联角色、角色已不存在或资源指数
    /// 非正的记录不计入分子与分母。
    pub fn compute_average_elapsed<F>(&self, role_resource: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut sum = 0.0;
        let mut denominator = 0usize;

        for record in self.completed.values() {
            let Some(elapsed) = record.elapsed() else {
                continue;
            };
            let Some(resource) = record.role().and_then(&role_resource) else {
                continue;
            };
            if !(resource.is_finite() && resource > 0.0) {
                continue;
            }

            sum += elapsed as f64 / resource;
            denominator += 1;
        }

        if denominator == 0 {
            NO_DATA_SENTINEL
        } else {
            sum / denominator as f64
        }
    }

    // ---- registry-scoped accessors ----

    pub(crate) fn track(&mut self, task: TaskMessage, record: HistoryRecord) {
        let uid = record.uid();
        self.completed.remove(&uid);
        self.in_flight.insert(uid, InFlightEntry { task, record });
    }

    pub(crate) fn forget_in_flight(&mut self, uid: u64) -> Option<InFlightEntry> {
        self.in_flight.remove(&uid)
    }

    pub(crate) fn mark_excluded(&mut self) {
        self.excluded = true;
    }

    /// 清空在途集合，按 uid 升序返回
    pub(crate) fn drain_in_flight(&mut self) -> Vec<InFlightEntry> {
        let mut entries: Vec<InFlightEntry> = self.in_flight.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|entry| entry.record.uid());
        entries
    }

    pub(crate) fn trim_history(&mut self, limit: usize) {
        while self.completed.len() > limit {
            self.completed.pop_first();
        }
    }
}

impl Dispatchable for SlaveConnection {
    fn deliver(&self, task: &TaskMessage) -> MasterResult<()> {
        self.transport.send(task)
    }
}

impl Reportable for SlaveConnection {
    fn resolve(&mut self, uid: u64, at: DateTime<Utc>) -> Option<HistoryRecord> {
        let mut entry = self.in_flight.remove(&uid)?;
        entry.record.complete_at(at);
        self.completed.insert(uid, entry.record.clone());
        Some(entry.record)
    }
}

impl PerformanceTracked for SlaveConnection {
    fn index(&self) -> f64 {
        self.performance
    }

    fn revalue(&mut self, value: f64) -> bool {
        if !value.is_finite() || value <= 0.0 {
            return false;
        }
        self.performance = value;
        true
    }
}

impl fmt::Debug for SlaveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("performance", &self.performance)
            .field("in_flight", &self.in_flight.len())
            .field("completed", &self.completed.len())
            .field("excluded", &self.excluded)
            .finish()
    }
}
