//! 性能指数与资源指数的重估
//!
//! 从节点的性能指数由其已完成记录的耗时按角色资源指数归一化得到，角色的资源指数
//! 由其已完成记录的耗时按从节点性能指数加权得到。两者互为输入，因此总是先重估
//! 从节点、再重估角色。

use std::collections::BTreeMap;

use tracing::debug;

use master_domain::{SlaveId, NO_DATA_SENTINEL};

use crate::role::DispatchRole;
use crate::slave::SlaveConnection;
use crate::traits::PerformanceTracked;

pub(crate) fn slave_average(
    slave: &SlaveConnection,
    roles: &BTreeMap<String, DispatchRole>,
) -> Option<f64> {
    let average = slave.compute_average_elapsed(|name| roles.get(name).map(DispatchRole::resource));
    (average != NO_DATA_SENTINEL).then_some(average)
}

pub(crate) fn role_average(
    role: &DispatchRole,
    slaves: &BTreeMap<SlaveId, SlaveConnection>,
) -> Option<f64> {
    role.compute_average_elapsed(|id| slaves.get(&id).map(SlaveConnection::performance))
}

/// 一次完成之后，重估报告方从节点与所属角色
pub(crate) fn revalue_after_completion(
    slaves: &mut BTreeMap<SlaveId, SlaveConnection>,
    roles: &mut BTreeMap<String, DispatchRole>,
    slave_id: SlaveId,
    role_name: Option<&str>,
) {
    if let Some(slave) = slaves.get_mut(&slave_id) {
        if let Some(average) = slave_average(slave, roles) {
            slave.revalue(average);
        }
    }

    let Some(role) = role_name.and_then(|name| roles.get_mut(name)) else {
        return;
    };
    if role.is_enforced() {
        return;
    }
    if let Some(average) = role_average(role, slaves) {
        role.revalue(average);
    }
}

/// 把有数据的从节点性能指数、未固定且有数据的角色资源指数分别缩放到均值 1.0
pub(crate) fn normalize_indices(
    slaves: &mut BTreeMap<SlaveId, SlaveConnection>,
    roles: &mut BTreeMap<String, DispatchRole>,
) {
    let raw_slaves: Vec<(SlaveId, f64)> = slaves
        .values()
        .filter_map(|slave| slave_average(slave, roles).map(|avg| (slave.id(), avg)))
        .collect();
    if let Some(mean) = positive_mean(raw_slaves.iter().map(|(_, avg)| *avg)) {
        for (id, average) in &raw_slaves {
            if let Some(slave) = slaves.get_mut(id) {
                slave.revalue(average / mean);
            }
        }
        debug!("已归一化 {} 个从节点的性能指数", raw_slaves.len());
    }

    let raw_roles: Vec<(String, f64)> = roles
        .values()
        .filter(|role| !role.is_enforced())
        .filter_map(|role| role_average(role, slaves).map(|avg| (role.name().to_string(), avg)))
        .collect();
    if let Some(mean) = positive_mean(raw_roles.iter().map(|(_, avg)| *avg)) {
        for (name, average) in &raw_roles {
            if let Some(role) = roles.get_mut(name) {
                role.revalue(average / mean);
            }
        }
        debug!("已归一化 {} 个角色的资源指数", raw_roles.len());
    }
}

fn positive_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    (mean.is_finite() && mean > 0.0).then_some(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_mean() {
        assert_eq!(positive_mean([2.0, 4.0].into_iter()), Some(3.0));
        assert_eq!(positive_mean(std::iter::empty()), None);
        assert_eq!(positive_mean([0.0, 0.0].into_iter()), None);
    }
}
