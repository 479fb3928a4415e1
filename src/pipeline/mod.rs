//! Script pipeline: storage, resolution and execution of compiled scripts.
//!
//! Points flow through the engine as follows:
//!
//! ```text
//! collector ──► Manager::query_script(category, name)
//!                   │
//!                   ▼
//!           CompiledScript::run(point) ──► status / stats / time
//!                   │
//!                   ├──► kept points ──────► OffloadWorker::send
//!                   └──► window + aggregate releases (take_released)
//! ```
//!
//! # Design
//!
//! - **Explicit manager**: one [`Manager`] owns a [`ScriptStore`] per category.
//! - **Namespace priority**: `default < gitrepo < confd < remote`; the index
//!   always holds the highest definition of a name.
//! - **Whole-bucket updates**: a namespace is replaced at once; removed and
//!   replaced scripts have their side tables stopped.

pub mod error;
pub mod manager;
pub mod runtime;
pub mod stats;
pub mod store;

pub use error::{PipelineError, PipelineResult};
pub use manager::{read_script_dir, Manager, ScriptSources};
pub use runtime::{normalize_status, process_status, run_script, RunOptions};
pub use stats::{ChangeEvent, ChangeOp, ScriptStats, Stats};
pub use store::ScriptStore;
