use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use master_errors::{MasterError, MasterResult};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 从节点选择方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// 在途数更少或性能指数更低，任一成立即替换当前候选
    #[default]
    Idle,
    /// 先比较在途数，相同时再比较性能指数
    StrictPriority,
}

/// 主控节点的派发与故障转移配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    /// 每次完成后把性能指数与资源指数重新缩放到均值 1.0
    pub normalize_indices: bool,
    /// 从节点断开时，是否经由原角色重新派发其在途任务
    pub redispatch_on_disconnect: bool,
    /// 每个角色/从节点保留的已完成记录上限，None 表示不限
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    /// 入站事件邮箱容量
    pub event_buffer: usize,
    pub selection: SelectionMode,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            normalize_indices: true,
            redispatch_on_disconnect: true,
            history_limit: None,
            event_buffer: 1024,
            selection: SelectionMode::Idle,
        }
    }
}

impl ConfigValidator for MasterConfig {
    fn validate(&self) -> MasterResult<()> {
        if self.history_limit == Some(0) {
            return Err(MasterError::config_error("master.history_limit 必须大于0"));
        }
        if self.event_buffer == 0 {
            return Err(MasterError::config_error("master.event_buffer 必须大于0"));
        }
        Ok(())
    }
}

/// 配置期创建的角色
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleConfig {
    pub name: String,
    /// 初始资源指数，缺省为 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<f64>,
    /// 为 true 时资源指数固定，不参与重估
    #[serde(default)]
    pub enforced: bool,
}

impl RoleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: None,
            enforced: false,
        }
    }
}

impl ConfigValidator for RoleConfig {
    fn validate(&self) -> MasterResult<()> {
        ValidationUtils::validate_not_empty(&self.name, "roles.name")?;
        if let Some(resource) = self.resource {
            ValidationUtils::validate_positive_index(
                resource,
                &format!("roles.{}.resource", self.name),
            )?;
        }
        if self.enforced && self.resource.is_none() {
            return Err(MasterError::config_error(format!(
                "角色 {} 声明了 enforced 但没有指定 resource",
                self.name
            )));
        }
        Ok(())
    }
}

impl ConfigValidator for [RoleConfig] {
    fn validate(&self) -> MasterResult<()> {
        let mut seen = HashSet::new();
        for role in self {
            role.validate()?;
            if !seen.insert(role.name.as_str()) {
                return Err(MasterError::config_error(format!(
                    "角色名重复: {}",
                    role.name
                )));
            }
        }
        Ok(())
    }
}
