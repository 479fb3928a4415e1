//! Namespace priority and fallback through the script manager

mod common;

use common::builders::ScriptSetBuilder;
use pointflow::pipeline::{ChangeOp, Manager, PipelineError};
use pointflow::{Category, CompileOptions, Namespace};
use std::collections::HashMap;

fn manager() -> Manager {
    Manager::new(CompileOptions::default())
}

fn ns_of(manager: &Manager, name: &str) -> Option<Namespace> {
    manager
        .query_script(Category::Logging, name)
        .map(|s| s.namespace())
}

#[test]
fn test_highest_namespace_wins_and_falls_back() {
    let manager = manager();
    let script = |src: &str| ScriptSetBuilder::new().script("nginx.p", src).build();

    manager
        .update_scripts(Category::Logging, Namespace::Default, script("a = 1"))
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), Some(Namespace::Default));

    manager
        .update_scripts(Category::Logging, Namespace::Remote, script("a = 2"))
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), Some(Namespace::Remote));

    // GitRepo sits between Default and Remote and must not take over
    manager
        .update_scripts(Category::Logging, Namespace::GitRepo, script("a = 3"))
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), Some(Namespace::Remote));

    manager
        .update_scripts(Category::Logging, Namespace::Remote, HashMap::new())
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), Some(Namespace::GitRepo));

    manager
        .update_scripts(Category::Logging, Namespace::GitRepo, HashMap::new())
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), Some(Namespace::Default));

    manager
        .update_scripts(Category::Logging, Namespace::Default, HashMap::new())
        .unwrap();
    assert_eq!(ns_of(&manager, "nginx.p"), None);
}

#[test]
fn test_compile_error_keeps_lower_namespace_serving() {
    let manager = manager();
    manager
        .update_scripts(
            Category::Logging,
            Namespace::Default,
            ScriptSetBuilder::new().script("app.p", "x = 1").build(),
        )
        .unwrap();

    let errors = manager
        .update_scripts(
            Category::Logging,
            Namespace::Remote,
            ScriptSetBuilder::new().script("app.p", "x = ").build(),
        )
        .unwrap();

    assert!(matches!(errors.get("app.p"), Some(PipelineError::Compile { .. })));
    assert_eq!(ns_of(&manager, "app.p"), Some(Namespace::Default));

    let events = manager.stats().events();
    assert!(events
        .iter()
        .any(|e| e.op == ChangeOp::CompileError && e.ns == Namespace::Remote));
}

#[test]
fn test_categories_are_isolated() {
    let manager = manager();
    manager
        .update_scripts(
            Category::Metric,
            Namespace::Default,
            ScriptSetBuilder::new().script("cpu.p", "x = 1").build(),
        )
        .unwrap();

    assert!(manager.query_script(Category::Metric, "cpu.p").is_some());
    // The deprecated "metrics" name shares the Metric store
    assert!(manager
        .query_script(Category::MetricDeprecated, "cpu.p")
        .is_some());
    assert!(manager.query_script(Category::Logging, "cpu.p").is_none());
}

#[test]
fn test_unscriptable_category_rejected() {
    let manager = manager();
    let res = manager.update_scripts(
        Category::DynamicDWCategory,
        Namespace::Default,
        HashMap::new(),
    );
    assert!(matches!(res, Err(PipelineError::UnsupportedCategory(_))));
}

#[test]
fn test_default_script_used_for_missing_name() {
    let manager = manager();
    manager
        .update_scripts(
            Category::Logging,
            Namespace::Default,
            ScriptSetBuilder::new().script("fallback.p", "x = 1").build(),
        )
        .unwrap();
    manager
        .set_default_script(Category::Logging, Some("fallback.p".to_string()))
        .unwrap();

    let script = manager
        .query_script_or_default(Category::Logging, "unknown.p")
        .unwrap();
    assert_eq!(script.name(), "fallback.p");
    assert!(manager.query_script(Category::Logging, "unknown.p").is_none());
}

#[test]
fn test_hostile_scripts_fail_alone() {
    let manager = manager();
    let deep = format!("x = {}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let scripts = ScriptSetBuilder::new()
        .script("ok.p", "add_key(seen, true)")
        .script("interval.p", r#"agg_create("b", "9999999999999999h", 0)"#)
        .script("deep.p", &deep)
        .script("ttl.p", "cache_set(\"k\", 1, 9223372036854775807)")
        .build();

    let errors = manager
        .update_scripts(Category::Logging, Namespace::Default, scripts)
        .unwrap();

    let mut failed: Vec<&str> = errors.keys().map(String::as_str).collect();
    failed.sort();
    assert_eq!(failed, vec!["deep.p", "interval.p"]);
    assert!(manager.query_script(Category::Logging, "ok.p").is_some());

    // The store lock is still usable after the failures
    let ttl = manager.query_script(Category::Logging, "ttl.p").unwrap();
    let mut point = common::builders::log_point("app", "m");
    ttl.run(&mut point, None, &pointflow::RunOptions::default())
        .unwrap();
    manager
        .update_scripts(Category::Logging, Namespace::Default, HashMap::new())
        .unwrap();
    assert!(manager.query_script(Category::Logging, "ok.p").is_none());
}
