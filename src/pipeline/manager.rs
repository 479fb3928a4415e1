//! Script manager: one [`ScriptStore`] per scriptable category.
//!
//! The manager is built once at startup and handed to everything that needs
//! to resolve or reload scripts. All stores share one [`Stats`] collector.

use super::stats::Stats;
use super::store::ScriptStore;
use super::PipelineError;
use crate::point::Point;
use crate::scripting::{CompileOptions, CompiledScript};
use crate::types::{Category, Namespace};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Extension of script files
pub const SCRIPT_EXT: &str = "p";

/// Scripts read from a directory, grouped by category
pub type ScriptSources = HashMap<Category, HashMap<String, String>>;

pub struct Manager {
    stores: HashMap<Category, ScriptStore>,
    stats: Arc<Stats>,
}

impl Manager {
    pub fn new(mut options: CompileOptions) -> Self {
        let stats = options.stats.clone().unwrap_or_default();
        options.stats = Some(stats.clone());
        let stores = Category::SCRIPTABLE
            .into_iter()
            .map(|c| (c, ScriptStore::new(c, options.clone())))
            .collect();
        Self { stores, stats }
    }

    /// Store owning `category`, after alias resolution
    pub fn store(&self, category: Category) -> Option<&ScriptStore> {
        self.stores.get(&category.resolve())
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn query_script(&self, category: Category, name: &str) -> Option<Arc<CompiledScript>> {
        self.store(category)?.query_script(name)
    }

    pub fn query_script_or_default(
        &self,
        category: Category,
        name: &str,
    ) -> Option<Arc<CompiledScript>> {
        self.store(category)?.query_script_or_default(name)
    }

    pub fn set_default_script(
        &self,
        category: Category,
        name: Option<String>,
    ) -> Result<(), PipelineError> {
        self.store(category)
            .ok_or(PipelineError::UnsupportedCategory(category))?
            .set_default_script(name);
        Ok(())
    }

    /// Points released by windows and aggregation buckets of every store
    pub fn take_released(&self) -> Vec<Point> {
        self.stores
            .values()
            .flat_map(ScriptStore::take_released)
            .collect()
    }

    /// Replace the `ns` bucket of one category
    pub fn update_scripts(
        &self,
        category: Category,
        ns: Namespace,
        scripts: HashMap<String, String>,
    ) -> Result<HashMap<String, PipelineError>, PipelineError> {
        let store = self
            .store(category)
            .ok_or(PipelineError::UnsupportedCategory(category))?;
        Ok(store.update_scripts_with_ns(ns, scripts))
    }

    /// Load a script directory into `ns`, replacing that namespace in every
    /// category. Categories without scripts in `dir` end up empty in `ns`.
    pub fn load_scripts_dir(
        &self,
        ns: Namespace,
        dir: &Path,
    ) -> Result<HashMap<Category, HashMap<String, PipelineError>>, PipelineError> {
        let mut sources = read_script_dir(dir)?;
        let mut errors = HashMap::new();
        for (category, store) in &self.stores {
            let scripts = sources.remove(category).unwrap_or_default();
            let count = scripts.len();
            let errs = store.update_scripts_with_ns(ns, scripts);
            if count > 0 {
                tracing::info!(
                    category = %category,
                    ns = %ns,
                    loaded = count - errs.len(),
                    failed = errs.len(),
                    "loaded scripts from {}",
                    dir.display()
                );
            }
            if !errs.is_empty() {
                errors.insert(*category, errs);
            }
        }
        Ok(errors)
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("stores", &self.stores.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Read `*.p` files of a script directory.
///
/// Files at the root belong to Logging; category sub-directories such as
/// `metric/` or `tracing/` hold scripts of their category.
pub fn read_script_dir(dir: &Path) -> std::io::Result<ScriptSources> {
    let mut out = ScriptSources::new();
    read_flat(dir, Category::Logging, &mut out)?;
    for category in Category::SCRIPTABLE {
        let sub = dir.join(category.dir_name());
        if sub.is_dir() {
            read_flat(&sub, category, &mut out)?;
        }
    }
    Ok(out)
}

fn read_flat(dir: &Path, category: Category, out: &mut ScriptSources) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXT) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let source = fs::read_to_string(&path)?;
        out.entry(category)
            .or_default()
            .insert(name.to_string(), source);
    }
    Ok(())
}
