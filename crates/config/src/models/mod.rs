pub mod app_config;
pub mod master;
pub mod observability;

pub use app_config::*;
pub use master::*;
pub use observability::*;
