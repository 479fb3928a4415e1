//! Configuration module for pointflow
//!
//! The engine reads one TOML file with three sections:
//!
//! ```toml
//! [pipeline]
//! ignore_status = ["debug"]
//! script_dirs = [{ path = "/etc/pointflow/pipeline", namespace = "default" }]
//!
//! [offload]
//! receiver = "datakit"
//! addresses = ["10.0.0.1:9529", "10.0.0.2:9529"]
//!
//! [log]
//! level = "info,pointflow=debug"
//! ```
//!
//! # Config Location
//!
//! Without an explicit path the file is looked up in the platform config
//! directory:
//! - **Linux**: `~/.config/pointflow/pointflow.toml`
//! - **macOS**: `~/Library/Application Support/pointflow/pointflow.toml`
//! - **Windows**: `%APPDATA%\pointflow\pointflow.toml`
//!
//! # Environment
//!
//! `ENV_PIPELINE_OFFLOAD_RECEIVER` and `ENV_PIPELINE_OFFLOAD_ADDRESSES`
//! (comma separated) override the `[offload]` section and enable it when the
//! file has none.

pub mod settings;

pub use settings::*;

use crate::error::{EngineError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "pointflow";

/// Config filename
pub const CONFIG_FILE: &str = "pointflow.toml";

pub const ENV_OFFLOAD_RECEIVER: &str = "ENV_PIPELINE_OFFLOAD_RECEIVER";
pub const ENV_OFFLOAD_ADDRESSES: &str = "ENV_PIPELINE_OFFLOAD_ADDRESSES";

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Forwarding is disabled without this section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offload: Option<OffloadSettings>,

    #[serde(default)]
    pub log: LogSettings,
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content).with_context(|| path.display().to_string())
    }

    /// Load `path`, or the default location when `None`. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    /// Environment overrides are applied in both cases.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::load(p)?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EngineError::Config(format!("Failed to create directory: {}", e))
                })?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))
    }

    /// Apply `ENV_PIPELINE_OFFLOAD_*` variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let receiver = non_empty_env(ENV_OFFLOAD_RECEIVER);
        let addresses = non_empty_env(ENV_OFFLOAD_ADDRESSES);
        if receiver.is_none() && addresses.is_none() {
            return Ok(());
        }

        let offload = self.offload.get_or_insert_with(OffloadSettings::default);
        if let Some(kind) = receiver {
            offload.receiver = kind.parse().map_err(EngineError::Config)?;
        }
        if let Some(list) = addresses {
            offload.addresses = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        tracing::debug!(
            receiver = ?offload.receiver,
            addresses = ?offload.addresses,
            "offload settings overridden from environment"
        );
        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(offload) = &self.offload {
            if offload.addresses.is_empty() {
                return Err(EngineError::Config(
                    "[offload] requires at least one address".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
