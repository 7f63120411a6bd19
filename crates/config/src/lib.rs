pub mod models;
pub mod validation;

pub use models::{AppConfig, LogFormat, MasterConfig, ObservabilityConfig, RoleConfig, SelectionMode};
pub use validation::{ConfigValidator, ValidationUtils};
