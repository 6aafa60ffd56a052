//! Process-adjacent utilities shared across the dagu workspace.
//!
//! This crate provides the control socket client used by the Agent (C7) and
//! `dagu-cli` to poll a run's status or request a stop, plus environment
//! variable and config-file loading helpers.
//!
//! # Modules
//!
//! ## Client (`client`)
//!
//! A client for the Agent's Unix domain control socket:
//!
//! ```rust,ignore
//! use dagu_support::client::{ControlClient, ControlClientConfig};
//!
//! let client = ControlClient::new(ControlClientConfig::default());
//! let response = client.get("/tmp/dagu/sockets/run.sock", "/status").await?;
//! ```
//!
//! ## Config (`config`)
//!
//! Configuration management utilities for environment variables and file loading:
//!
//! ```rust,ignore
//! use dagu_support::config::{get_env, get_env_parse, load_config_file};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct BaseConfig {
//!     dags_dir: String,
//!     port: u16,
//! }
//!
//! // Load from environment
//! let dags_dir = get_env("DAGU_DAGS")?;
//! let port = get_env_parse::<u16>("DAGU_PORT")?;
//!
//! // Load from file
//! let config: BaseConfig = load_config_file("base-config.yaml")?;
//! ```
//!
//! # Features
//!
//! - `client` - Control socket client (enabled by default)
//! - `config` - Configuration utilities (enabled by default)

pub mod error;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "config")]
pub mod config;

// Re-export commonly used types
pub use error::{Result, UtilsError};

#[cfg(feature = "client")]
pub use client::{AuthHelper, ControlClient, ControlClientConfig, ControlResponse};

#[cfg(feature = "config")]
pub use config::{
    get_env, get_env_bool, get_env_bool_or, get_env_or, get_env_parse, get_env_parse_or,
    load_config_file, load_json_config, load_yaml_config, merge_configs, ConfigBuilder, FromEnv,
    ValidateConfig,
};
