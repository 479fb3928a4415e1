//! Run statistics and store change events.
//!
//! Every run records one sample `(total, dropped, failed, cost)` against the
//! script's tag set. Every store mutation records a [`ChangeEvent`] in a
//! bounded ring.

use crate::types::{Category, Namespace};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Number of change events kept
pub const EVENT_RING_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Add,
    Update,
    Delete,
    CompileError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub name: String,
    pub category: Category,
    pub ns: Namespace,
    pub op: ChangeOp,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

impl ChangeEvent {
    pub fn new(name: &str, category: Category, ns: Namespace, op: ChangeOp) -> Self {
        Self {
            name: name.to_string(),
            category,
            ns,
            op,
            time: Utc::now(),
            compile_error: None,
        }
    }

    pub fn with_compile_error(mut self, err: impl Into<String>) -> Self {
        self.compile_error = Some(err.into());
        self
    }
}

/// Aggregated run counters of one script
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptStats {
    pub tags: BTreeMap<String, String>,
    pub total: u64,
    pub dropped: u64,
    pub failed: u64,
    pub cost: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    runs: BTreeMap<BTreeMap<String, String>, ScriptStats>,
    events: VecDeque<ChangeEvent>,
}

/// Shared statistics sink
#[derive(Default)]
pub struct Stats {
    inner: Mutex<Inner>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one run sample
    pub fn write_run(
        &self,
        tags: &BTreeMap<String, String>,
        total: u64,
        dropped: u64,
        failed: u64,
        cost: Duration,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = inner
            .runs
            .entry(tags.clone())
            .or_insert_with(|| ScriptStats {
                tags: tags.clone(),
                ..Default::default()
            });
        entry.total += total;
        entry.dropped += dropped;
        entry.failed += failed;
        entry.cost += cost;
        entry.last_run = Some(Utc::now());
    }

    pub fn write_event(&self, event: ChangeEvent) {
        tracing::debug!(
            name = %event.name,
            category = %event.category,
            ns = %event.ns,
            op = ?event.op,
            "script store change"
        );
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.events.len() >= EVENT_RING_SIZE {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }

    /// Change events, oldest first
    pub fn events(&self) -> Vec<ChangeEvent> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.events.iter().cloned().collect()
    }

    pub fn script_stats(&self, tags: &BTreeMap<String, String>) -> Option<ScriptStats> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.runs.get(tags).cloned()
    }

    pub fn all_script_stats(&self) -> Vec<ScriptStats> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.runs.values().cloned().collect()
    }
}

impl std::fmt::Debug for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Stats")
            .field("scripts", &inner.runs.len())
            .field("events", &inner.events.len())
            .finish()
    }
}
