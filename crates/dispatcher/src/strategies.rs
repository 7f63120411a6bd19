use std::sync::Arc;

use master_config::SelectionMode;
use master_domain::SlaveId;

use crate::slave::SlaveConnection;

/// 从候选从节点中选出派发目标；被排除的从节点一律跳过
pub trait SlaveSelector: Send + Sync {
    fn select<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = &'a SlaveConnection>,
    ) -> Option<SlaveId>;

    fn name(&self) -> &str;
}

/// 默认选择方式
///
/// 维护一个当前最佳候选：尚无候选，或者新候选的在途数更少，或者新候选的性能指数更低，
/// 三者任一成立即替换。这不是字典序比较，性能指数可以压过更多的在途数，反之亦然。
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleSlaveSelector;

/// 严格优先级：先比较在途数，相同时比较性能指数，再相同时保留先枚举到的从节点
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPrioritySelector;

impl SlaveSelector for IdleSlaveSelector {
    fn select<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = &'a SlaveConnection>,
    ) -> Option<SlaveId> {
        let mut idle: Option<&SlaveConnection> = None;

        for slave in candidates {
            if slave.is_excluded() {
                continue;
            }

            let replace = match idle {
                None => true,
                Some(best) => {
                    slave.in_flight_count() < best.in_flight_count()
                        || slave.performance() < best.performance()
                }
            };
            if replace {
                idle = Some(slave);
            }
        }

        idle.map(SlaveConnection::id)
    }

    fn name(&self) -> &str {
        "Idle"
    }
}

impl SlaveSelector for StrictPrioritySelector {
    fn select<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = &'a SlaveConnection>,
    ) -> Option<SlaveId> {
        let mut idle: Option<&SlaveConnection> = None;

        for slave in candidates {
            if slave.is_excluded() {
                continue;
            }

            let replace = match idle {
                None => true,
                Some(best) => match slave.in_flight_count().cmp(&best.in_flight_count()) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Equal => slave.performance() < best.performance(),
                    std::cmp::Ordering::Greater => false,
                },
            };
            if replace {
                idle = Some(slave);
            }
        }

        idle.map(SlaveConnection::id)
    }

    fn name(&self) -> &str {
        "StrictPriority"
    }
}

pub fn selector_for(mode: SelectionMode) -> Arc<dyn SlaveSelector> {
    match mode {
        SelectionMode::Idle => Arc::new(IdleSlaveSelector),
        SelectionMode::StrictPriority => Arc::new(StrictPrioritySelector),
    }
}
