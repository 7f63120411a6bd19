use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use master_domain::{SlaveId, TaskMessage};
use master_errors::{MasterError, MasterResult};

use crate::failover::FailoverReport;
use crate::registry::{Registry, ReportOutcome};
use crate::role::Dispatched;
use crate::snapshot::RegistrySnapshot;
use crate::traits::SlaveTransport;

/// 从节点会话投递到主控邮箱的入站事件
#[derive(Debug, Clone, PartialEq)]
pub enum SlaveEvent {
    /// 原始 JSON 历史记录
    Report { slave: SlaveId, payload: String },
    /// 非报告消息，按角色名路由给回复处理器
    Reply { slave: SlaveId, message: TaskMessage },
    Disconnected { slave: SlaveId },
}

/// 主控派发服务接口
#[async_trait]
pub trait MasterDispatchService: Send + Sync {
    /// 接入从节点，并尝试派发挂起的孤儿任务
    async fn connect_slave(&self, name: String, transport: Arc<dyn SlaveTransport>) -> SlaveId;

    async fn dispatch(&self, role: &str, task: TaskMessage) -> MasterResult<Dispatched>;

    async fn handle_report(&self, slave: SlaveId, payload: &str) -> MasterResult<ReportOutcome>;

    async fn disconnect_slave(&self, slave: SlaveId) -> MasterResult<FailoverReport>;

    async fn snapshot(&self) -> RegistrySnapshot;
}

/// 以单把异步锁串行化全部注册表访问的主控服务
///
/// 每个派发、报告处理或断开处理都在一次加锁内完成，不会交错。
pub struct MasterService {
    registry: Arc<Mutex<Registry>>,
    events_tx: mpsc::Sender<SlaveEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SlaveEvent>>>,
}

impl MasterService {
    pub fn new(registry: Registry, event_buffer: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        Self {
            registry: Arc::new(Mutex::new(registry)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// 供从节点会话使用的邮箱发送端
    pub fn event_sender(&self) -> mpsc::Sender<SlaveEvent> {
        self.events_tx.clone()
    }

    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        Arc::clone(&self.registry)
    }

    pub async fn handle_event(&self, event: SlaveEvent) -> MasterResult<()> {
        match event {
            SlaveEvent::Report { slave, payload } => {
                match self.handle_report(slave, &payload).await? {
                    ReportOutcome::Completed { uid, elapsed, .. } => {
                        debug!("uid {} 完成于从节点 {} ({}ms)", uid, slave, elapsed);
                    }
                    ReportOutcome::Stale { .. } => {}
                    ReportOutcome::Piece(piece) => {
                        debug!(
                            "收到分片报告 uid {} [{}, +{})",
                            piece.uid, piece.piece_first, piece.piece_size
                        );
                    }
                }
            }
            SlaveEvent::Reply { slave, message } => {
                let delivered = self.registry.lock().await.route_reply(slave, &message);
                debug!("来自从节点 {} 的回复投递给了 {} 个处理器", slave, delivered);
            }
            SlaveEvent::Disconnected { slave } => {
                self.disconnect_slave(slave).await?;
            }
        }
        Ok(())
    }

    /// 消费邮箱直到收到关闭信号。单个事件的错误只记录，不终止循环
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> MasterResult<()> {
        let mut events_rx = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MasterError::Internal("主控事件循环已在运行".to_string()))?;

        info!("主控事件循环已启动");
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        warn!("主控邮箱已关闭");
                        break;
                    };
                    if let Err(e) = self.handle_event(event).await {
                        error!("处理从节点事件失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("主控事件循环收到关闭信号");
                    break;
                }
            }
        }

        *self.events_rx.lock().await = Some(events_rx);
        Ok(())
    }
}

#[async_trait]
impl MasterDispatchService for MasterService {
    async fn connect_slave(&self, name: String, transport: Arc<dyn SlaveTransport>) -> SlaveId {
        let mut registry = self.registry.lock().await;
        let id = registry.add_slave(name, transport);
        let retried = registry.retry_orphans();
        if !retried.is_empty() {
            info!("从节点 {} 接入后重新派发了 {} 个孤儿任务", id, retried.len());
        }
        id
    }

    async fn dispatch(&self, role: &str, task: TaskMessage) -> MasterResult<Dispatched> {
        self.registry.lock().await.dispatch(role, task)
    }

    async fn handle_report(&self, slave: SlaveId, payload: &str) -> MasterResult<ReportOutcome> {
        self.registry.lock().await.handle_report_json(slave, payload)
    }

    async fn disconnect_slave(&self, slave: SlaveId) -> MasterResult<FailoverReport> {
        self.registry.lock().await.disconnect_slave(slave)
    }

    async fn snapshot(&self) -> RegistrySnapshot {
        self.registry.lock().await.snapshot()
    }
}
