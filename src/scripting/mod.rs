//! Pipeline script language
//!
//! Scripts are small line-oriented programs that transform one [`Point`] per
//! run. A script is lexed, parsed and checked once into a [`CompiledScript`],
//! which owns everything a run needs: the statement tree, precompiled
//! patterns and the side tables (cache, point windows, aggregation buckets)
//! that persist between runs.
//!
//! ## Language
//!
//! - identifiers resolve to local variables first, then to point keys;
//!   `_` names the `message` key
//! - `if` / `elif` / `else`, C-style `for init; cond; step { }`,
//!   `for x in list { }`, `break`, `continue`
//! - int/float/string/bool/nil literals, `[list]` and `{"map": literals}`
//! - `+ - * / %`, comparisons, `&& || !`, `in`, indexing, slicing, `.attr`
//!
//! ## Example
//!
//! ```text
//! grok(_, "%{IPV4:client} %{WORD:method} %{URIPATH:path} %{INT:status:int}")
//! if status >= 500 {
//!     set_tag(level, "error")
//! } elif path in ["/health", "/ready"] {
//!     drop()
//! }
//! ```

pub mod aggregate;
pub mod ast;
pub mod cache;
pub mod engine;
mod funcs;
pub mod grok;
pub mod lexer;
pub mod parser;
pub mod window;

pub use engine::{Interp, RunOutcome, RuntimeError, Signal};
pub use parser::{parse, ParseError};

use crate::pipeline::runtime::{run_script, RunOptions};
use crate::pipeline::stats::Stats;
use crate::pipeline::PipelineError;
use crate::point::Point;
use crate::types::{Category, Namespace};
use aggregate::AggBuckets;
use ast::Stmt;
use cache::Cache;
use grok::GrokPattern;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use window::WindowPool;

/// Pattern compiled ahead of time for a call site
#[derive(Debug)]
pub enum Artifact {
    Regex(Regex),
    Grok(GrokPattern),
}

/// Knobs applied when compiling a script
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Shared run statistics; a private collector is used when unset
    pub stats: Option<Arc<Stats>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            cache_capacity: cache::DEFAULT_CAPACITY,
            cache_ttl: cache::DEFAULT_TTL,
            stats: None,
        }
    }
}

/// A checked script together with its per-script state
pub struct CompiledScript {
    name: String,
    category: Category,
    ns: Namespace,
    source: String,
    stmts: Vec<Stmt>,
    artifacts: Vec<Artifact>,
    cache: Cache,
    aggregates: Option<AggBuckets>,
    window: Option<WindowPool>,
    stats_tags: BTreeMap<String, String>,
    stats: Arc<Stats>,
}

impl CompiledScript {
    pub fn compile(
        category: Category,
        ns: Namespace,
        name: &str,
        source: &str,
    ) -> Result<Self, PipelineError> {
        Self::compile_with(category, ns, name, source, &CompileOptions::default())
    }

    pub fn compile_with(
        category: Category,
        ns: Namespace,
        name: &str,
        source: &str,
        opts: &CompileOptions,
    ) -> Result<Self, PipelineError> {
        let category = category.resolve();
        if !category.is_scriptable() {
            return Err(PipelineError::UnsupportedCategory(category));
        }

        let compile_err = |e: ParseError| PipelineError::Compile {
            name: name.to_string(),
            message: e.to_string(),
        };
        let mut stmts = parse(source).map_err(compile_err)?;
        let mut artifacts = Vec::new();
        let reqs = funcs::check(&mut stmts, &mut artifacts).map_err(compile_err)?;

        let stats_tags = BTreeMap::from([
            ("category".to_string(), category.name().to_string()),
            ("namespace".to_string(), ns.name().to_string()),
            ("name".to_string(), name.to_string()),
        ]);

        Ok(Self {
            name: name.to_string(),
            category,
            ns,
            source: source.to_string(),
            stmts,
            artifacts,
            cache: Cache::new(opts.cache_capacity, opts.cache_ttl),
            aggregates: reqs.aggregate.then(AggBuckets::new),
            window: reqs.window.then(WindowPool::new),
            stats_tags,
            stats: opts.stats.clone().unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn namespace(&self) -> Namespace {
        self.ns
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn aggregates(&self) -> Option<&AggBuckets> {
        self.aggregates.as_ref()
    }

    pub fn window_pool(&self) -> Option<&WindowPool> {
        self.window.as_ref()
    }

    /// Identity tags attached to every stats sample of this script
    pub fn stats_tags(&self) -> &BTreeMap<String, String> {
        &self.stats_tags
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Run the script on one point; see [`run_script`]
    pub fn run(
        &self,
        point: &mut Point,
        signal: Option<&dyn Signal>,
        opts: &RunOptions,
    ) -> Result<(), PipelineError> {
        run_script(Some(self), Some(point), signal, opts)
    }

    /// Points released by windows and aggregation buckets since the last call
    pub fn take_released(&self) -> Vec<Point> {
        let mut out = self
            .window
            .as_ref()
            .map(WindowPool::take_released)
            .unwrap_or_default();
        if let Some(agg) = &self.aggregates {
            out.extend(agg.take_released());
        }
        out
    }

    /// Shut down the side tables. Returns whatever the aggregation buckets
    /// still held.
    pub fn stop(&self) -> Vec<Point> {
        self.cache.stop();
        if let Some(w) = &self.window {
            w.stop();
        }
        self.aggregates
            .as_ref()
            .map(AggBuckets::stop)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("ns", &self.ns)
            .field("source", &self.source)
            .finish()
    }
}
