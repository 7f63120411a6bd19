use std::fmt;

use serde::{Deserialize, Serialize};

/// 从节点句柄，由注册表按连接顺序单调分配
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlaveId(pub u64);

impl SlaveId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slave-{}", self.0)
    }
}

impl From<u64> for SlaveId {
    fn from(value: u64) -> Self {
        SlaveId(value)
    }
}

/// 性能指数与资源指数的默认值（集群平均水平）
pub const DEFAULT_INDEX: f64 = 1.0;

/// 从节点尚无已完成记录时，平均耗时计算返回的哨兵值
pub const NO_DATA_SENTINEL: f64 = -1.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_id_display_and_order() {
        let a = SlaveId(1);
        let b = SlaveId::from(2);
        assert_eq!(a.to_string(), "slave-1");
        assert!(a < b);
        assert_eq!(b.value(), 2);
    }

    #[test]
    fn test_slave_id_serializes_transparently() {
        let json = serde_json::to_string(&SlaveId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
