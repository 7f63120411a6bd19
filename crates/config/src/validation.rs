// 配置验证
// 每个配置段自行实现 ConfigValidator，AppConfig 负责汇总

use master_errors::{MasterError, MasterResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> MasterResult<()>;
}

/// 通用验证工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> MasterResult<()> {
        if value.trim().is_empty() {
            return Err(MasterError::config_error(format!("{field} 不能为空")));
        }
        Ok(())
    }

    pub fn validate_positive_index(value: f64, field: &str) -> MasterResult<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(MasterError::config_error(format!(
                "{field} 必须是大于0的有限数值，当前值: {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, allowed: &[&str], field: &str) -> MasterResult<()> {
        if !allowed.contains(&value) {
            return Err(MasterError::config_error(format!(
                "无效的{field}: {value}，支持的取值: {allowed:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("render", "roles.name").is_ok());
        assert!(ValidationUtils::validate_not_empty("  ", "roles.name").is_err());
    }

    #[test]
    fn test_validate_positive_index() {
        assert!(ValidationUtils::validate_positive_index(0.5, "resource").is_ok());
        assert!(ValidationUtils::validate_positive_index(0.0, "resource").is_err());
        assert!(ValidationUtils::validate_positive_index(-2.0, "resource").is_err());
        assert!(ValidationUtils::validate_positive_index(f64::NAN, "resource").is_err());
        assert!(ValidationUtils::validate_positive_index(f64::INFINITY, "resource").is_err());
    }
}
