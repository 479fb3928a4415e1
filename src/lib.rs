//! # pointflow: telemetry point pipeline engine
//!
//! Collected telemetry points are transformed by small user scripts and then
//! forwarded downstream in batches.
//!
//! ## Architecture
//!
//! - **Point**: tags + typed fields with strict bucket rules ([`point`])
//! - **Scripting**: lexer, Pratt parser, checked builtins and a tree-walking
//!   interpreter with per-script cache, windows and aggregation ([`scripting`])
//! - **Pipeline**: namespace-aware script stores, the execution runtime and
//!   run statistics ([`pipeline`])
//! - **Offload**: per-category bounded queues, 128-point batches, retrying
//!   HTTP receiver ([`offload`])
//! - **Communication**: crossbeam channels between the input thread and the
//!   engine loop, tokio tasks for offloading
//!
//! ## Configuration
//!
//! `pointflow.toml` lives in the platform config directory under
//! `pointflow/`; see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use pointflow::{
//!     pipeline::{Manager, RunOptions},
//!     point::Point,
//!     scripting::CompileOptions,
//!     types::{Category, Namespace},
//! };
//! use std::collections::HashMap;
//!
//! let manager = Manager::new(CompileOptions::default());
//! manager.update_scripts(
//!     Category::Logging,
//!     Namespace::Default,
//!     HashMap::from([("nginx.p".into(), r#"grok(_, "%{IP:client} %{GREEDYDATA:rest}")"#.into())]),
//! )?;
//!
//! let script = manager.query_script(Category::Logging, "nginx.p").unwrap();
//! let mut point = Point::new("nginx", Category::Logging).with_field("message", "10.0.0.1 GET /");
//! script.run(&mut point, None, &RunOptions::default())?;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod offload;
pub mod pipeline;
pub mod point;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use agent::{Agent, Input};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use offload::{OffloadWorker, Receiver};
pub use pipeline::{Manager, PipelineError, RunOptions};
pub use point::{DType, Point, Value};
pub use scripting::{CompileOptions, CompiledScript};
pub use types::{Category, Namespace};
