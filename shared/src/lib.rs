pub mod config;
pub mod models;
pub mod telemetry;
pub mod utils;

pub use config::{BeirConfig, ConfigError};
pub use models::*;
