use std::sync::Arc;

use anyhow::{Context, Result};
use master_config::AppConfig;
use master_dispatcher::{MasterDispatchService, MasterService, Registry};
use tokio::sync::broadcast;
use tracing::info;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    service: Arc<MasterService>,
}

impl Application {
    /// 按配置创建注册表与主控服务
    pub fn new(config: AppConfig) -> Result<Self> {
        let registry = Registry::from_config(&config).context("创建注册表失败")?;
        info!(
            "主控服务初始化完成: 归一化 {}, 断开时重新派发 {}, 历史上限 {:?}",
            config.master.normalize_indices,
            config.master.redispatch_on_disconnect,
            config.master.history_limit
        );

        let service = Arc::new(MasterService::new(registry, config.master.event_buffer));
        Ok(Self { config, service })
    }

    /// 运行主控事件循环直到收到关闭信号，退出前记录最终状态
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("已配置 {} 个角色", self.config.roles.len());

        self.service
            .run(shutdown_rx)
            .await
            .context("主控事件循环异常退出")?;

        let snapshot = self.service.snapshot().await;
        info!(
            "最终状态: {}",
            serde_json::to_string(&snapshot).context("序列化注册表快照失败")?
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use master_config::RoleConfig;

    #[tokio::test]
    async fn test_application_runs_until_shutdown() {
        let mut config = AppConfig::default();
        config.roles.push(RoleConfig::new("video"));

        let app = Arc::new(Application::new(config).unwrap());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let runner = Arc::clone(&app);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let snapshot = app.service.snapshot().await;
        assert_eq!(snapshot.roles.len(), 1);
    }

    #[test]
    fn test_application_rejects_duplicate_roles() {
        let mut config = AppConfig::default();
        config.roles.push(RoleConfig::new("video"));
        config.roles.push(RoleConfig::new("video"));

        assert!(Application::new(config).is_err());
    }
}
