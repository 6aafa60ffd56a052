use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config.yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment error: {0}")]
    Env(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
