//! Execution runtime
//!
//! Runs one compiled script against one point and applies the post-run
//! steps: logging status normalization, stats, time promotion and window
//! bookkeeping.

use crate::pipeline::PipelineError;
use crate::point::{DType, Point, Value};
use crate::scripting::{CompiledScript, Interp, Signal};
use crate::types::Category;
use std::time::Instant;

/// Key holding the log level of Logging points
pub const KEY_STATUS: &str = "status";

/// Status written when a point has none
pub const STATUS_UNKNOWN: &str = "unknown";

/// Per-run knobs
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip status normalization of Logging points
    pub disable_status_processing: bool,
    /// Normalized statuses whose points are dropped, compared case-insensitively
    pub ignore_status: Vec<String>,
}

/// Execute `script` on `point`.
///
/// A failing run records a failed sample and leaves the point as the script
/// left it; nothing is rolled back.
pub fn run_script(
    script: Option<&CompiledScript>,
    point: Option<&mut Point>,
    signal: Option<&dyn Signal>,
    opts: &RunOptions,
) -> Result<(), PipelineError> {
    let script = script.ok_or(PipelineError::NoScript)?;
    let point = point.ok_or(PipelineError::NoData)?;
    let tags = script.stats_tags();
    let start = Instant::now();

    let outcome = match Interp::new(script, point, signal).run() {
        Ok(outcome) => outcome,
        Err(e) => {
            script
                .stats()
                .write_run(tags, 1, point.dropped() as u64, 1, start.elapsed());
            tracing::debug!(script = script.name(), error = %e, "script run failed");
            return Err(e.into());
        }
    };

    if script.category() == Category::Logging && !opts.disable_status_processing {
        process_status(point, &opts.ignore_status);
    }

    script
        .stats()
        .write_run(tags, 1, point.dropped() as u64, 0, start.elapsed());

    point.key_time_to_time();
    for sub in point.sub_points_mut() {
        sub.key_time_to_time();
    }

    if let (Some(req), Some(pool)) = (outcome.window, script.window_pool()) {
        pool.move_point(&req, point.clone());
    }

    Ok(())
}

/// Map a raw log level onto the canonical set.
///
/// Unmapped values are kept as given; an empty value becomes `unknown`.
pub fn normalize_status(raw: &str) -> String {
    let canonical = match raw.to_ascii_lowercase().as_str() {
        "f" | "emerg" => "emerg",
        "a" | "alert" => "alert",
        "c" | "critical" => "critical",
        "e" | "error" => "error",
        "w" | "warn" | "warning" => "warning",
        "n" | "notice" => "notice",
        "i" | "info" => "info",
        "d" | "trace" | "verbose" | "debug" => "debug",
        "o" | "s" | "ok" => "OK",
        "" => STATUS_UNKNOWN,
        _ => return raw.to_string(),
    };
    canonical.to_string()
}

/// Normalize the `status` key in place and drop ignored statuses
pub fn process_status(point: &mut Point, ignore: &[String]) {
    let raw = match point.get(KEY_STATUS) {
        Ok((Value::String(s), _)) => s,
        _ => String::new(),
    };
    let status = normalize_status(&raw);
    if ignore.iter().any(|s| s.eq_ignore_ascii_case(&status)) {
        point.mark_drop(true);
    }
    point.set(KEY_STATUS, Value::String(status), DType::String);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Namespace;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;

    fn compile(category: Category, src: &str) -> CompiledScript {
        CompiledScript::compile(category, Namespace::Default, "rt.p", src).unwrap()
    }

    #[test]
    fn test_missing_script_or_point() {
        let script = compile(Category::Logging, "x = 1");
        let mut pt = Point::new("a", Category::Logging);
        let opts = RunOptions::default();
        assert!(matches!(
            run_script(None, Some(&mut pt), None, &opts),
            Err(PipelineError::NoScript)
        ));
        assert!(matches!(
            run_script(Some(&script), None, None, &opts),
            Err(PipelineError::NoData)
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(normalize_status("W"), "warning");
        assert_eq!(normalize_status("warn"), "warning");
        assert_eq!(normalize_status("ok"), "OK");
        assert_eq!(normalize_status("verbose"), "debug");
        assert_eq!(normalize_status("custom"), "custom");
        assert_eq!(normalize_status(""), "unknown");
    }

    #[test]
    fn test_logging_status_and_ignore() {
        let script = compile(Category::Logging, "x = 1");
        let opts = RunOptions {
            ignore_status: vec!["DEBUG".to_string()],
            ..Default::default()
        };

        let mut pt = Point::new("a", Category::Logging).with_tag("status", "e");
        script.run(&mut pt, None, &opts).unwrap();
        assert_eq!(pt.tags()["status"], "error");
        assert!(!pt.dropped());

        let mut pt = Point::new("a", Category::Logging).with_field("status", "trace");
        script.run(&mut pt, None, &opts).unwrap();
        assert_eq!(pt.fields()["status"], Value::from("debug"));
        assert!(pt.dropped());

        let mut pt = Point::new("a", Category::Logging);
        script.run(&mut pt, None, &opts).unwrap();
        assert_eq!(pt.fields()["status"], Value::from("unknown"));
    }

    #[test]
    fn test_status_skipped_for_other_categories_and_when_disabled() {
        let metric = compile(Category::Metric, "x = 1");
        let mut pt = Point::new("cpu", Category::Metric);
        metric.run(&mut pt, None, &RunOptions::default()).unwrap();
        assert!(!pt.contains_key("status"));

        let logging = compile(Category::Logging, "x = 1");
        let opts = RunOptions {
            disable_status_processing: true,
            ..Default::default()
        };
        let mut pt = Point::new("a", Category::Logging).with_tag("status", "w");
        logging.run(&mut pt, None, &opts).unwrap();
        assert_eq!(pt.tags()["status"], "w");
    }

    #[test]
    fn test_stats_samples() {
        let script = compile(Category::Logging, "if bad { x = 1 / 0 }\ndrop()");
        let opts = RunOptions::default();

        let mut ok = Point::new("a", Category::Logging);
        script.run(&mut ok, None, &opts).unwrap();
        let mut bad = Point::new("a", Category::Logging).with_field("bad", true);
        assert!(matches!(
            script.run(&mut bad, None, &opts),
            Err(PipelineError::Runtime(_))
        ));

        let s = script.stats().script_stats(script.stats_tags()).unwrap();
        assert_eq!((s.total, s.dropped, s.failed), (2, 1, 1));
    }

    #[test]
    fn test_time_promotion_covers_sub_points() {
        let script = compile(
            Category::Logging,
            "time = 5000\ncreate_point(\"child\", {}, {\"time\": 7000})",
        );
        let mut pt = Point::new("a", Category::Logging).with_field("time", 0i64);
        script.run(&mut pt, None, &RunOptions::default()).unwrap();
        assert_eq!(pt.time().timestamp_nanos_opt(), Some(5000));
        assert!(!pt.contains_key("time"));
        assert_eq!(pt.sub_points()[0].time().timestamp_nanos_opt(), Some(7000));
    }

    #[test]
    fn test_raised_signal_aborts_loop() {
        let script = compile(Category::Metric, "for i = 0; i < 10; i = i + 1 { x = i }");
        let stop = AtomicBool::new(true);
        let mut pt = Point::new("m", Category::Metric);
        let err = script
            .run(&mut pt, Some(&stop), &RunOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("exit signal"));
    }

    proptest! {
        #[test]
        fn prop_status_normalization_is_idempotent(raw in "[a-zA-Z]{0,8}") {
            let once = normalize_status(&raw);
            prop_assert_eq!(normalize_status(&once), once.clone());
        }
    }
}
