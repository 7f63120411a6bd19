use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::SlaveId;

/// 一次派发的历史记录
///
/// 派发时创建（开始时间为当前时间），收到对应 uid 的报告时完成（设置结束时间），
/// 此后不再变化。角色与从节点各自持有一份，二者通过 uid 关联。
///
/// `role` 与 `slave` 是查找句柄而非所有权：只用于性能/资源公式中查询对方的指数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    uid: u64,
    listener: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    role: Option<String>,
    slave: Option<SlaveId>,
}

impl HistoryRecord {
    /// 创建未关联角色与从节点的记录
    pub fn new(uid: u64, listener: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            uid,
            listener: listener.into(),
            start_time,
            end_time: None,
            role: None,
            slave: None,
        }
    }

    /// 创建同时关联派发角色与执行从节点的记录
    pub fn linked(
        uid: u64,
        listener: impl Into<String>,
        start_time: DateTime<Utc>,
        role: impl Into<String>,
        slave: SlaveId,
    ) -> Self {
        Self {
            role: Some(role.into()),
            slave: Some(slave),
            ..Self::new(uid, listener, start_time)
        }
    }

    /// 以当前系统时间完成记录
    pub fn complete(&mut self) -> bool {
        self.complete_at(Utc::now())
    }

    /// 完成记录。结束时间只能设置一次，重复调用返回 false 且不修改记录
    pub fn complete_at(&mut self, end_time: DateTime<Utc>) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(end_time);
        true
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn slave(&self) -> Option<SlaveId> {
        self.slave
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    /// 耗时（毫秒），下限为 1；未完成时返回 None
    pub fn elapsed(&self) -> Option<i64> {
        self.end_time
            .map(|end| elapsed_millis(self.start_time, end))
    }
}

/// 两个时间点之间的毫秒数，至少为 1，避免下游比值除零
pub fn elapsed_millis(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_elapsed_after_completion() {
        let mut record = HistoryRecord::new(7, "render", t0());
        assert!(record.elapsed().is_none());

        assert!(record.complete_at(t0() + Duration::milliseconds(5000)));
        assert_eq!(record.elapsed(), Some(5000));
    }

    #[test]
    fn test_elapsed_floor_is_one() {
        let mut record = HistoryRecord::new(7, "render", t0());
        record.complete_at(t0());
        assert_eq!(record.elapsed(), Some(1));

        // 时钟回拨也不会出现非正耗时
        let mut skewed = HistoryRecord::new(8, "render", t0());
        skewed.complete_at(t0() - Duration::milliseconds(30));
        assert_eq!(skewed.elapsed(), Some(1));
    }

    #[test]
    fn test_complete_is_single_transition() {
        let mut record = HistoryRecord::new(1, "render", t0());
        assert!(record.complete_at(t0() + Duration::milliseconds(10)));
        assert!(!record.complete_at(t0() + Duration::milliseconds(99)));
        assert_eq!(record.elapsed(), Some(10));
    }

    #[test]
    fn test_linked_record_keeps_handles() {
        let record = HistoryRecord::linked(3, "encode", t0(), "video", SlaveId(2));
        assert_eq!(record.uid(), 3);
        assert_eq!(record.listener(), "encode");
        assert_eq!(record.role(), Some("video"));
        assert_eq!(record.slave(), Some(SlaveId(2)));
        assert!(!record.is_completed());
    }
}
