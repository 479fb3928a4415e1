//! Point processing loop shared by the binary and tests.
//!
//! The agent reads one JSON [`Input`] per line, runs the matching script and
//! returns the points that should leave the engine: the processed point
//! unless dropped, its sub-points, and whatever windows and aggregation
//! buckets released.

use crate::error::{EngineError, Result, ResultExt};
use crate::pipeline::{Manager, RunOptions};
use crate::pipeline::manager::SCRIPT_EXT;
use crate::point::Point;
use crate::scripting::Signal;
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of agent input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    /// Script to run; `<point name>.p` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    pub point: Point,
}

pub struct Agent {
    manager: Manager,
    run_opts: RunOptions,
}

impl Agent {
    pub fn new(manager: Manager, run_opts: RunOptions) -> Self {
        Self { manager, run_opts }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Aggregation buckets belong to the script that created them and only
    /// flush by interval when drained. Call this periodically so interval
    /// flushes leave without waiting for the script's next point.
    pub fn take_released(&self) -> Vec<Point> {
        self.manager.take_released()
    }

    /// Parse and process one input line
    pub fn process_line(&self, line: &str, signal: Option<&dyn Signal>) -> Result<Vec<Point>> {
        let input = serde_json::from_str::<Input>(line)
            .map_err(EngineError::from)
            .context("Malformed input line")?;
        Ok(self.process(input, signal))
    }

    /// Run the script for `input` and collect the outgoing points.
    ///
    /// Points without a script pass through untouched. A failed run is
    /// logged and the point is forwarded as the script left it.
    pub fn process(&self, input: Input, signal: Option<&dyn Signal>) -> Vec<Point> {
        let mut point = input.point;
        let category = point.category();
        let name = input
            .script
            .unwrap_or_else(|| format!("{}.{}", point.name(), SCRIPT_EXT));

        let Some(script) = self.manager.query_script_or_default(category, &name) else {
            tracing::trace!(category = %category, script = %name, "no script, passing point through");
            return vec![point];
        };

        if let Err(e) = script.run(&mut point, signal, &self.run_opts) {
            tracing::warn!(category = %category, script = script.name(), error = %e, "script run failed");
        }

        let subs = point.take_sub_points();
        let mut out = Vec::with_capacity(1 + subs.len());
        if !point.dropped() {
            out.push(point);
        }
        out.extend(subs.into_iter().filter(|p| !p.dropped()));
        out.extend(script.take_released());
        out
    }
}

/// Group outgoing points by category, keeping their order
pub fn group_by_category(points: Vec<Point>) -> BTreeMap<Category, Vec<Point>> {
    let mut groups: BTreeMap<Category, Vec<Point>> = BTreeMap::new();
    for p in points {
        groups.entry(p.category().resolve()).or_default().push(p);
    }
    groups
}
