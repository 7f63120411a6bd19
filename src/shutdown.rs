use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

/// 主控事件循环的停止信号
///
/// 信号只会发出一次。触发之后再订阅得到的接收器会立即收到停止通知，
/// 所以迟到的事件循环也能退出。
pub struct StopSignal {
    tx: broadcast::Sender<()>,
    fired: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.fired.load(Ordering::Acquire) {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.tx.subscribe()
    }

    /// 通知所有事件循环停止，返回收到通知的订阅者数量；重复触发返回 0
    pub fn fire(&self) -> usize {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("停止信号已经发出过");
            return 0;
        }
        let notified = self.tx.send(()).unwrap_or(0);
        info!("停止信号已发送给 {} 个事件循环", notified);
        notified
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_loop_receives_stop() {
        let signal = StopSignal::new();
        let mut rx = signal.subscribe();

        assert_eq!(signal.fire(), 1);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_late_subscriber_stops_immediately() {
        let signal = StopSignal::new();
        assert_eq!(signal.fire(), 0);
        assert_eq!(signal.fire(), 0);

        let mut rx = signal.subscribe();
        assert!(rx.recv().await.is_ok());
    }
}
