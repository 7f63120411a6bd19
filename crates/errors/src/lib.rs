use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("没有可用的从节点: 角色 {role}")]
    NoAvailableSlave { role: String },
    #[error("角色未找到: {name}")]
    RoleNotFound { name: String },
    #[error("从节点未找到: {id}")]
    SlaveNotFound { id: u64 },
    #[error("角色已存在: {name}")]
    DuplicateRole { name: String },
    #[error("传输错误: {0}")]
    Transport(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("无效的报告: {0}")]
    InvalidReport(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type MasterResult<T> = Result<T, MasterError>;

impl MasterError {
    pub fn no_available_slave<S: Into<String>>(role: S) -> Self {
        Self::NoAvailableSlave { role: role.into() }
    }
    pub fn role_not_found<S: Into<String>>(name: S) -> Self {
        Self::RoleNotFound { name: name.into() }
    }
    pub fn slave_not_found(id: u64) -> Self {
        Self::SlaveNotFound { id }
    }
    pub fn duplicate_role<S: Into<String>>(name: S) -> Self {
        Self::DuplicateRole { name: name.into() }
    }
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
    pub fn invalid_report<S: Into<String>>(msg: S) -> Self {
        Self::InvalidReport(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MasterError::Internal(_) | MasterError::Configuration(_)
        )
    }
    /// 调用方可以稍后重试的错误（派发本身从不内部重试）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MasterError::NoAvailableSlave { .. } | MasterError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for MasterError {
    fn from(err: serde_json::Error) -> Self {
        MasterError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for MasterError {
    fn from(err: anyhow::Error) -> Self {
        MasterError::Internal(err.to_string())
    }
}
