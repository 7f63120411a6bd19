use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use master_errors::MasterResult;

use super::{
    master::{MasterConfig, RoleConfig},
    observability::ObservabilityConfig,
};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：显式路径或默认搜索路径下的 TOML 文件，随后叠加 `MASTER_` 前缀的环境变量
    /// （层级分隔符为 `__`，例如 `MASTER_MASTER__EVENT_BUFFER=64`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/master.toml",
                "master.toml",
                "/etc/dispatch-master/config.toml",
            ];

            let mut config_file_found = false;
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    config_file_found = true;
                    break;
                }
            }

            if !config_file_found {
                builder = builder
                    .set_default("master.normalize_indices", true)?
                    .set_default("master.redispatch_on_disconnect", true)?
                    .set_default("master.event_buffer", 1024)?
                    .set_default("master.selection", "idle")?
                    .set_default("observability.log_level", "info")?
                    .set_default("observability.log_format", "pretty")?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("MASTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> MasterResult<()> {
        self.master.validate()?;
        self.roles.as_slice().validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use std::io::Write;

    const SAMPLE: &str = r#"
[master]
normalize_indices = false
redispatch_on_disconnect = true
history_limit = 500
event_buffer = 64

[[roles]]
name = "render"
resource = 2.5

[[roles]]
name = "encode"
resource = 4.0
enforced = true

[observability]
log_level = "debug"
log_format = "json"
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.roles.is_empty());
        assert!(config.master.normalize_indices);
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert!(!config.master.normalize_indices);
        assert_eq!(config.master.history_limit, Some(500));
        assert_eq!(config.master.event_buffer, 64);
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.roles[0].resource, Some(2.5));
        assert!(!config.roles[0].enforced);
        assert!(config.roles[1].enforced);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_toml_rejects_duplicate_roles() {
        let toml_str = r#"
[[roles]]
name = "render"

[[roles]]
name = "render"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_toml_round_trip_preserves_roles() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap();
        let config = AppConfig::load(Some(path)).unwrap();
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/master.toml")).is_err());
    }
}
