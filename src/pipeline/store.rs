//! Per-category script store with namespace resolution.
//!
//! Scripts live in four namespace buckets. The index maps every name to the
//! script of the highest-priority namespace that defines it. Bucket updates
//! replace a whole namespace at once and keep the index consistent: removing
//! the active definition falls back to the next namespace down.
//!
//! Lock order is `storage` then `index`. Queries only take the index read
//! lock.

use super::stats::{ChangeEvent, ChangeOp, Stats};
use super::PipelineError;
use crate::point::Point;
use crate::scripting::{CompileOptions, CompiledScript};
use crate::types::{Category, Namespace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type Bucket = HashMap<String, Arc<CompiledScript>>;

pub struct ScriptStore {
    category: Category,
    index: RwLock<HashMap<String, Arc<CompiledScript>>>,
    storage: Mutex<HashMap<Namespace, Bucket>>,
    default_script: RwLock<Option<String>>,
    stats: Arc<Stats>,
    options: CompileOptions,
}

impl ScriptStore {
    pub fn new(category: Category, mut options: CompileOptions) -> Self {
        let stats = options.stats.clone().unwrap_or_default();
        options.stats = Some(stats.clone());
        Self {
            category: category.resolve(),
            index: RwLock::new(HashMap::new()),
            storage: Mutex::new(HashMap::new()),
            default_script: RwLock::new(None),
            stats,
            options,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Active script for `name`
    pub fn query_script(&self, name: &str) -> Option<Arc<CompiledScript>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Active script for `name`, or the store's default script
    pub fn query_script_or_default(&self, name: &str) -> Option<Arc<CompiledScript>> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(script) = index.get(name) {
            return Some(script.clone());
        }
        let default = self
            .default_script
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        default.as_ref().and_then(|d| index.get(d)).cloned()
    }

    pub fn set_default_script(&self, name: Option<String>) {
        *self
            .default_script
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name;
    }

    pub fn default_script(&self) -> Option<String> {
        self.default_script
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Script stored under `(ns, name)`, indexed or not
    pub fn get_with_ns(&self, name: &str, ns: Namespace) -> Option<Arc<CompiledScript>> {
        self.storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ns)
            .and_then(|b| b.get(name))
            .cloned()
    }

    /// Namespace of every indexed name
    pub fn index_snapshot(&self) -> HashMap<String, Namespace> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, s)| (name.clone(), s.namespace()))
            .collect()
    }

    /// Namespaces defining `name`, lowest priority first
    pub fn namespaces_of(&self, name: &str) -> Vec<Namespace> {
        let storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        Namespace::ALL
            .into_iter()
            .filter(|ns| storage.get(ns).is_some_and(|b| b.contains_key(name)))
            .collect()
    }

    /// Drain window and aggregation releases of every stored script,
    /// flushing aggregation buckets whose interval elapsed.
    pub fn take_released(&self) -> Vec<Point> {
        let storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        storage
            .values()
            .flat_map(|bucket| bucket.values())
            .flat_map(|script| script.take_released())
            .collect()
    }

    /// Remove every script of `ns`
    pub fn clean_namespace(&self, ns: Namespace) {
        self.update_scripts_with_ns(ns, HashMap::new());
    }

    /// Replace the whole `ns` bucket with `scripts` (name → source).
    ///
    /// Returns the compile errors by script name; scripts that compiled are
    /// applied regardless.
    pub fn update_scripts_with_ns(
        &self,
        ns: Namespace,
        scripts: HashMap<String, String>,
    ) -> HashMap<String, PipelineError> {
        let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);

        let old = storage.remove(&ns).unwrap_or_default();
        let mut bucket = Bucket::new();
        let mut errors = HashMap::new();

        for (name, script) in &old {
            if !scripts.contains_key(name) {
                delete_and_fallback(&mut index, &storage, name, ns);
                self.retire(script);
                self.stats
                    .write_event(ChangeEvent::new(name, self.category, ns, ChangeOp::Delete));
            }
        }

        for (name, source) in scripts {
            let prev = old.get(&name);
            if let Some(prev) = prev.filter(|p| p.source() == source) {
                bucket.insert(name, prev.clone());
                continue;
            }

            match CompiledScript::compile_with(self.category, ns, &name, &source, &self.options) {
                Ok(script) => {
                    let script = Arc::new(script);
                    let op = match prev {
                        Some(prev) => {
                            self.retire(prev);
                            ChangeOp::Update
                        }
                        None => ChangeOp::Add,
                    };
                    index_update(&mut index, &name, &script);
                    self.stats
                        .write_event(ChangeEvent::new(&name, self.category, ns, op));
                    bucket.insert(name, script);
                }
                Err(err) => {
                    tracing::warn!(
                        category = %self.category,
                        ns = %ns,
                        script = %name,
                        error = %err,
                        "script failed to compile"
                    );
                    self.stats.write_event(
                        ChangeEvent::new(&name, self.category, ns, ChangeOp::CompileError)
                            .with_compile_error(err.to_string()),
                    );
                    if let Some(prev) = prev {
                        delete_and_fallback(&mut index, &storage, &name, ns);
                        self.retire(prev);
                    }
                    errors.insert(name, err);
                }
            }
        }

        tracing::debug!(
            category = %self.category,
            ns = %ns,
            scripts = bucket.len(),
            errors = errors.len(),
            "script namespace updated"
        );
        if !bucket.is_empty() {
            storage.insert(ns, bucket);
        }
        errors
    }

    /// Stop the side tables of a script leaving its bucket
    fn retire(&self, script: &CompiledScript) {
        let discarded = script.stop();
        if !discarded.is_empty() {
            tracing::debug!(
                script = script.name(),
                points = discarded.len(),
                "discarding aggregated points of retired script"
            );
        }
    }
}

impl std::fmt::Debug for ScriptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptStore")
            .field("category", &self.category)
            .field("index", &self.index_snapshot())
            .finish()
    }
}

/// Index `script` unless a higher-priority namespace already holds the name
fn index_update(
    index: &mut HashMap<String, Arc<CompiledScript>>,
    name: &str,
    script: &Arc<CompiledScript>,
) {
    let replace = match index.get(name) {
        Some(cur) => script.namespace().priority() >= cur.namespace().priority(),
        None => true,
    };
    if replace {
        index.insert(name.to_string(), script.clone());
    }
}

/// Drop `name` from the index if `ns` holds it, falling back to the next
/// namespace down that defines the name
fn delete_and_fallback(
    index: &mut HashMap<String, Arc<CompiledScript>>,
    storage: &HashMap<Namespace, Bucket>,
    name: &str,
    ns: Namespace,
) {
    if index.get(name).map(|s| s.namespace()) != Some(ns) {
        return;
    }
    for lower in ns.fallbacks() {
        if let Some(script) = storage.get(&lower).and_then(|b| b.get(name)) {
            index.insert(name.to_string(), script.clone());
            return;
        }
    }
    index.remove(name);
}
