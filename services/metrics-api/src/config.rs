use shared::BeirConfig;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("METRICS_API_PORT must be a valid port number, got {0}")]
    InvalidPort(String),
    #[error(transparent)]
    Beir(#[from] shared::ConfigError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub beir: BeirConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("METRICS_API_PORT") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => 8000,
        };

        Ok(Self {
            host: env::var("METRICS_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            beir: BeirConfig::from_env()?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
