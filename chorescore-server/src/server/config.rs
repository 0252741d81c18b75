use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
    /// New accounts stay unconfirmed, and get no token at sign-up, until an
    /// operator runs `confirm-user`.
    #[serde(default)]
    pub require_email_confirmation: bool,
    /// bcrypt work factor for new password hashes.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("jwt_secret must not be empty")]
    EmptySecret,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        if cfg.jwt_secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(cfg)
    }
}
