//! Configuration sections of `pointflow.toml`
//!
//! # Main Types
//!
//! - [`PipelineSettings`] - Script directories, status handling and script cache
//! - [`OffloadSettings`] - Remote receiver, categories and batching knobs
//! - [`LogSettings`] - Log filter and optional rolling log file
//!
//! Every field has a default so a partial file is valid.

use crate::offload::{ReceiverKind, WorkerOptions, BATCH_CAPACITY, FLUSH_INTERVAL, RETRY_DELAY, SEND_ATTEMPTS};
use crate::pipeline::RunOptions;
use crate::scripting::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::scripting::CompileOptions;
use crate::types::{Category, Namespace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// One script directory and the namespace it loads into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDir {
    pub path: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
}

fn default_namespace() -> Namespace {
    Namespace::Default
}

/// `[pipeline]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directories loaded at startup
    pub script_dirs: Vec<ScriptDir>,

    /// Script used for a category when the requested one is missing,
    /// keyed by category name
    pub default_scripts: BTreeMap<String, String>,

    /// Skip status normalization of Logging points
    pub disable_status_processing: bool,

    /// Statuses whose Logging points are dropped
    pub ignore_status: Vec<String>,

    /// Entries per script cache
    pub cache_capacity: usize,

    /// Default cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            script_dirs: Vec::new(),
            default_scripts: BTreeMap::new(),
            disable_status_processing: false,
            ignore_status: Vec::new(),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl PipelineSettings {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            disable_status_processing: self.disable_status_processing,
            ignore_status: self.ignore_status.clone(),
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            cache_capacity: self.cache_capacity,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            stats: None,
        }
    }

    /// Default scripts with parsed categories; unknown names are skipped
    pub fn default_scripts(&self) -> Vec<(Category, String)> {
        self.default_scripts
            .iter()
            .filter_map(|(cat, name)| match cat.parse::<Category>() {
                Ok(c) => Some((c, name.clone())),
                Err(e) => {
                    tracing::warn!("Ignoring default script for {}: {}", cat, e);
                    None
                }
            })
            .collect()
    }
}

/// `[offload]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadSettings {
    pub receiver: ReceiverKind,

    /// `host:port` of each receiver, used round-robin
    pub addresses: Vec<String>,

    /// Categories forwarded; empty means every scriptable category
    pub categories: Vec<Category>,

    /// Concurrent producers, also the queue capacity per category
    pub producers: usize,

    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub send_attempts: usize,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for OffloadSettings {
    fn default() -> Self {
        Self {
            receiver: ReceiverKind::default(),
            addresses: Vec::new(),
            categories: Vec::new(),
            producers: 1,
            batch_size: BATCH_CAPACITY,
            flush_interval_secs: FLUSH_INTERVAL.as_secs(),
            send_attempts: SEND_ATTEMPTS,
            retry_delay_ms: RETRY_DELAY.as_millis() as u64,
            request_timeout_secs: 30,
        }
    }
}

impl OffloadSettings {
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            producers: self.producers.max(1),
            batch_capacity: self.batch_size.max(1),
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            attempts: self.send_attempts.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Categories to spawn consumers for
    pub fn effective_categories(&self) -> Vec<Category> {
        if self.categories.is_empty() {
            Category::SCRIPTABLE.to_vec()
        } else {
            self.categories.clone()
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,

    /// Directory of the rolling log file; stderr only when unset
    pub dir: Option<PathBuf>,

    pub file_name: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info,pointflow=debug".to_string(),
            dir: None,
            file_name: "pointflow.log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::default();
        assert!(!settings.disable_status_processing);
        assert_eq!(settings.cache_capacity, 1000);
        assert_eq!(settings.compile_options().cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_default_scripts_skip_unknown_categories() {
        let settings = PipelineSettings {
            default_scripts: BTreeMap::from([
                ("logging".to_string(), "default.p".to_string()),
                ("bogus".to_string(), "x.p".to_string()),
            ]),
            ..Default::default()
        };
        assert_eq!(
            settings.default_scripts(),
            vec![(Category::Logging, "default.p".to_string())]
        );
    }

    #[test]
    fn test_offload_worker_options() {
        let settings = OffloadSettings {
            producers: 0,
            retry_delay_ms: 250,
            ..Default::default()
        };
        let opts = settings.worker_options();
        assert_eq!(opts.producers, 1);
        assert_eq!(opts.batch_capacity, 128);
        assert_eq!(opts.attempts, 4);
        assert_eq!(opts.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.effective_categories().len(), 11);
    }
}
