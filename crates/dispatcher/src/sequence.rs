/// 全局历史 uid 序列
///
/// 先自增再发放，首个 uid 为 1。观察到外部 uid（续传或上游转发的任务）时
/// 只会前移到该值，从不后退。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidSequence {
    current: u64,
}

impl UidSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_uid(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn observe(&mut self, uid: u64) {
        self.current = self.current.max(uid);
    }

    pub fn current(&self) -> u64 {
        self.current
    }
}
