//! Builtin functions.
//!
//! Every builtin has a compile-time check (argument count, key arguments,
//! literal requirements, pattern precompilation) and a runtime body. Checks
//! run once when a script is compiled; patterns are stored in the script's
//! artifact table and referenced by index from the call node.

use super::aggregate::AggFn;
use super::ast::*;
use super::engine::{point_key, Interp, RuntimeError};
use super::grok::GrokPattern;
use super::parser::ParseError;
use super::window::WindowRequest;
use super::Artifact;
use crate::point::{DType, Point, Value};
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;

type CheckFn = fn(&mut CallExpr, &mut Vec<Artifact>) -> Result<(), String>;
type RunFn = fn(&mut Interp<'_>, &CallExpr, Pos) -> Result<Option<Value>, RuntimeError>;

struct FuncDef {
    name: &'static str,
    min_args: usize,
    max_args: usize,
    /// Argument positions that name a point key (identifier or string literal)
    keys: &'static [usize],
    check: Option<CheckFn>,
    run: RunFn,
}

const FUNCS: &[FuncDef] = &[
    FuncDef { name: "add_key", min_args: 1, max_args: 2, keys: &[0], check: None, run: add_key },
    FuncDef { name: "set_tag", min_args: 1, max_args: 2, keys: &[0], check: None, run: set_tag },
    FuncDef { name: "delete", min_args: 1, max_args: 1, keys: &[0], check: None, run: delete_key },
    FuncDef { name: "drop_key", min_args: 1, max_args: 1, keys: &[0], check: None, run: delete_key },
    FuncDef { name: "rename", min_args: 2, max_args: 2, keys: &[0, 1], check: None, run: rename },
    FuncDef { name: "drop", min_args: 0, max_args: 0, keys: &[], check: None, run: drop_point },
    FuncDef { name: "exit", min_args: 0, max_args: 0, keys: &[], check: None, run: exit },
    FuncDef { name: "set_measurement", min_args: 1, max_args: 2, keys: &[], check: None, run: set_measurement },
    FuncDef { name: "len", min_args: 1, max_args: 1, keys: &[], check: None, run: len },
    FuncDef { name: "lowercase", min_args: 1, max_args: 1, keys: &[0], check: None, run: lowercase },
    FuncDef { name: "uppercase", min_args: 1, max_args: 1, keys: &[0], check: None, run: uppercase },
    FuncDef { name: "trim", min_args: 1, max_args: 2, keys: &[0], check: None, run: trim },
    FuncDef { name: "cast", min_args: 2, max_args: 2, keys: &[0], check: Some(check_cast), run: cast },
    FuncDef { name: "value_type", min_args: 1, max_args: 1, keys: &[], check: None, run: value_type },
    FuncDef { name: "load_json", min_args: 1, max_args: 1, keys: &[], check: None, run: load_json },
    FuncDef { name: "dump_json", min_args: 1, max_args: 1, keys: &[], check: None, run: dump_json },
    FuncDef { name: "grok", min_args: 2, max_args: 2, keys: &[0], check: Some(check_grok), run: grok },
    FuncDef { name: "regex_match", min_args: 2, max_args: 2, keys: &[], check: Some(check_regex), run: regex_match },
    FuncDef { name: "cache_get", min_args: 1, max_args: 1, keys: &[], check: None, run: cache_get },
    FuncDef { name: "cache_set", min_args: 2, max_args: 3, keys: &[], check: None, run: cache_set },
    FuncDef { name: "point_window", min_args: 2, max_args: 3, keys: &[], check: Some(check_point_window), run: point_window },
    FuncDef { name: "window_hit", min_args: 0, max_args: 0, keys: &[], check: None, run: window_hit },
    FuncDef { name: "agg_create", min_args: 3, max_args: 3, keys: &[], check: Some(check_agg_create), run: agg_create },
    FuncDef { name: "agg_metric", min_args: 5, max_args: 5, keys: &[4], check: Some(check_agg_metric), run: agg_metric },
    FuncDef { name: "create_point", min_args: 3, max_args: 4, keys: &[], check: None, run: create_point },
    FuncDef { name: "timestamp", min_args: 0, max_args: 1, keys: &[], check: Some(check_timestamp), run: timestamp },
];

fn lookup(name: &str) -> Option<&'static FuncDef> {
    FUNCS.iter().find(|f| f.name == name)
}

/// Side state a script needs, discovered while checking it
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub window: bool,
    pub aggregate: bool,
}

/// Validate every call in a script and precompile its patterns.
pub fn check(stmts: &mut [Stmt], artifacts: &mut Vec<Artifact>) -> Result<Requirements, ParseError> {
    let mut reqs = Requirements::default();
    let mut first_err: Option<ParseError> = None;

    walk_exprs_mut(stmts, &mut |expr: &mut Expr| {
        if first_err.is_some() {
            return;
        }
        let pos = expr.pos;
        let ExprKind::Call(call) = &mut expr.kind else { return };
        if let Err(msg) = check_call(call, artifacts, &mut reqs) {
            first_err = Some(ParseError::new(pos, format!("{}(): {}", call.name, msg)));
        }
    });

    match first_err {
        Some(err) => Err(err),
        None => Ok(reqs),
    }
}

fn check_call(
    call: &mut CallExpr,
    artifacts: &mut Vec<Artifact>,
    reqs: &mut Requirements,
) -> Result<(), String> {
    let def = lookup(&call.name).ok_or_else(|| "unknown function".to_string())?;
    let n = call.args.len();
    if n < def.min_args || n > def.max_args {
        return Err(if def.min_args == def.max_args {
            format!("expected {} arguments, got {}", def.min_args, n)
        } else {
            format!(
                "expected {} to {} arguments, got {}",
                def.min_args, def.max_args, n
            )
        });
    }
    for &i in def.keys {
        if call.args.get(i).and_then(Expr::as_key).is_none() {
            return Err(format!(
                "argument {} must be a key name or string literal",
                i + 1
            ));
        }
    }
    match def.name {
        "point_window" | "window_hit" => reqs.window = true,
        "agg_create" | "agg_metric" => reqs.aggregate = true,
        _ => {}
    }
    match def.check {
        Some(check) => check(call, artifacts),
        None => Ok(()),
    }
}

/// Dispatch a call at run time
pub(crate) fn call(
    interp: &mut Interp<'_>,
    call: &CallExpr,
    pos: Pos,
) -> Result<Option<Value>, RuntimeError> {
    match lookup(&call.name) {
        Some(def) => (def.run)(interp, call, pos),
        None => Err(RuntimeError::new(
            pos,
            format!("unknown function `{}`", call.name),
        )),
    }
}

fn key_arg(call: &CallExpr, i: usize) -> &str {
    call.args
        .get(i)
        .and_then(Expr::as_key)
        .map(point_key)
        .unwrap_or_default()
}

fn str_literal(call: &CallExpr, i: usize, what: &str) -> Result<String, String> {
    call.args
        .get(i)
        .and_then(Expr::as_str_literal)
        .map(str::to_string)
        .ok_or_else(|| format!("{} must be a string literal", what))
}

fn int_literal(call: &CallExpr, i: usize, what: &str) -> Result<i64, String> {
    match call.args.get(i).map(|e| &e.kind) {
        Some(ExprKind::Int(v)) if *v >= 0 => Ok(*v),
        _ => Err(format!("{} must be a non-negative int literal", what)),
    }
}

fn str_list_literal(call: &CallExpr, i: usize, what: &str) -> Result<Vec<String>, String> {
    let err = || format!("{} must be a list of string literals", what);
    match call.args.get(i).map(|e| &e.kind) {
        Some(ExprKind::List(items)) => items
            .iter()
            .map(|e| e.as_str_literal().map(str::to_string).ok_or_else(err))
            .collect(),
        _ => Err(err()),
    }
}

fn artifact<'s>(interp: &Interp<'s>, call: &CallExpr, pos: Pos) -> Result<&'s Artifact, RuntimeError> {
    let script = interp.script;
    call.payload
        .and_then(|i| script.artifacts().get(i))
        .ok_or_else(|| RuntimeError::new(pos, format!("{}(): missing compiled pattern", call.name)))
}

fn arg(
    interp: &mut Interp<'_>,
    call: &CallExpr,
    i: usize,
) -> Result<Value, RuntimeError> {
    match call.args.get(i) {
        Some(e) => interp.eval(e),
        None => Ok(Value::Nil),
    }
}

// point keys

fn add_key(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let key = key_arg(call, 0);
    let (v, t) = match call.args.get(1) {
        Some(e) => interp.eval_typed(e)?,
        None => {
            let name = call.args[0].as_key().unwrap_or(key);
            interp.lookup(name)
        }
    };
    interp.point.set(key, v, t);
    Ok(None)
}

fn set_tag(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let key = key_arg(call, 0);
    let (v, t) = match call.args.get(1) {
        Some(e) => interp.eval_typed(e)?,
        None => interp
            .point
            .get(key)
            .unwrap_or((Value::String(String::new()), DType::String)),
    };
    interp.point.set_tag(key, v, t);
    Ok(None)
}

fn delete_key(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    interp.point.delete(key_arg(call, 0));
    Ok(None)
}

fn rename(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let to = key_arg(call, 0);
    let from = key_arg(call, 1);
    // a missing source key is not an error
    let _ = interp.point.rename_key(from, to);
    Ok(None)
}

fn drop_point(interp: &mut Interp<'_>, _call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    interp.point.mark_drop(true);
    Ok(None)
}

fn exit(interp: &mut Interp<'_>, _call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    interp.exit = true;
    Ok(None)
}

fn set_measurement(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let name = arg(interp, call, 0)?.to_tag_string();
    if !name.is_empty() {
        interp.point.set_name(name);
    }
    if call.args.len() > 1 && arg(interp, call, 1)?.is_truthy() {
        if let ExprKind::Ident(key) = &call.args[0].kind {
            interp.point.delete(point_key(key));
        }
    }
    Ok(None)
}

// strings and types

fn len(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let n = match arg(interp, call, 0)? {
        Value::String(s) => s.chars().count(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        _ => 0,
    };
    Ok(Some(Value::Int(n as i64)))
}

fn map_string_key(interp: &mut Interp<'_>, call: &CallExpr, f: impl FnOnce(&str) -> String) {
    let key = key_arg(call, 0);
    if let Ok((Value::String(s), _)) = interp.point.get(key) {
        interp.point.set(key, Value::String(f(&s)), DType::String);
    }
}

fn lowercase(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    map_string_key(interp, call, str::to_lowercase);
    Ok(None)
}

fn uppercase(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    map_string_key(interp, call, str::to_uppercase);
    Ok(None)
}

fn trim(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let cutset = match call.args.get(1) {
        Some(e) => Some(interp.eval(e)?.to_tag_string()),
        None => None,
    };
    map_string_key(interp, call, |s| match &cutset {
        Some(cut) => s.trim_matches(|c: char| cut.contains(c)).to_string(),
        None => s.trim().to_string(),
    });
    Ok(None)
}

const CAST_TYPES: &[&str] = &["int", "float", "str", "bool"];

fn check_cast(call: &mut CallExpr, _artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    let ty = str_literal(call, 1, "type")?;
    if CAST_TYPES.contains(&ty.as_str()) {
        Ok(())
    } else {
        Err(format!("unsupported cast type `{}`", ty))
    }
}

pub(crate) fn cast_value(v: &Value, ty: &str) -> Value {
    match ty {
        "int" => Value::Int(match v {
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0),
            other => other.as_i64().unwrap_or(0),
        }),
        "float" => Value::Float(match v {
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            other => other.as_f64().unwrap_or(0.0),
        }),
        "bool" => Value::Bool(match v {
            Value::String(s) => s.trim().parse::<bool>().unwrap_or(false),
            other => other.is_truthy(),
        }),
        _ => Value::String(v.to_tag_string()),
    }
}

fn cast(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let key = key_arg(call, 0);
    let ty = call.args[1].as_str_literal().unwrap_or("str");
    if let Ok((v, _)) = interp.point.get(key) {
        let converted = cast_value(&v, ty);
        let t = converted.dtype();
        interp.point.set(key, converted, t);
    }
    Ok(None)
}

fn value_type(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let name = match arg(interp, call, 0)? {
        Value::Nil => "",
        v => v.dtype().name(),
    };
    Ok(Some(Value::from(name)))
}

fn load_json(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let text = arg(interp, call, 0)?.to_tag_string();
    let v = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(raw) => match Value::from_json(&raw) {
            (_, DType::Invalid) => Value::Nil,
            (v, _) => v,
        },
        Err(_) => Value::Nil,
    };
    Ok(Some(v))
}

fn dump_json(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let v = arg(interp, call, 0)?;
    Ok(Some(Value::String(v.to_json_string())))
}

// patterns

fn check_grok(call: &mut CallExpr, artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    let pattern = str_literal(call, 1, "pattern")?;
    let grok = GrokPattern::compile(&pattern)?;
    call.payload = Some(artifacts.len());
    artifacts.push(Artifact::Grok(grok));
    Ok(())
}

fn grok(interp: &mut Interp<'_>, call: &CallExpr, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let Artifact::Grok(pattern) = artifact(interp, call, pos)? else {
        return Err(RuntimeError::new(pos, "grok(): pattern is not a grok pattern"));
    };
    let text = match interp.point.get(key_arg(call, 0)) {
        Ok((Value::String(s), _)) => s,
        _ => return Ok(Some(Value::Bool(false))),
    };
    match pattern.captures(&text) {
        Some(fields) => {
            for (k, v) in fields {
                let t = v.dtype();
                interp.point.set(&k, v, t);
            }
            Ok(Some(Value::Bool(true)))
        }
        None => Ok(Some(Value::Bool(false))),
    }
}

fn check_regex(call: &mut CallExpr, artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    let pattern = str_literal(call, 0, "pattern")?;
    let re = Regex::new(&pattern).map_err(|e| format!("invalid regex: {}", e))?;
    call.payload = Some(artifacts.len());
    artifacts.push(Artifact::Regex(re));
    Ok(())
}

fn regex_match(interp: &mut Interp<'_>, call: &CallExpr, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let Artifact::Regex(re) = artifact(interp, call, pos)? else {
        return Err(RuntimeError::new(pos, "regex_match(): pattern is not a regex"));
    };
    let matched = match arg(interp, call, 1)? {
        Value::String(s) => re.is_match(&s),
        _ => false,
    };
    Ok(Some(Value::Bool(matched)))
}

// cache

fn cache_get(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let key = arg(interp, call, 0)?.to_tag_string();
    Ok(Some(interp.script.cache().get(&key).unwrap_or(Value::Nil)))
}

fn cache_set(interp: &mut Interp<'_>, call: &CallExpr, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let key = arg(interp, call, 0)?.to_tag_string();
    let value = arg(interp, call, 1)?;
    let ttl = match call.args.get(2) {
        Some(e) => match interp.eval(e)? {
            Value::Int(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
            other => {
                return Err(RuntimeError::new(
                    pos,
                    format!("cache_set(): ttl must be a positive int, got {}", other.dtype()),
                ))
            }
        },
        None => None,
    };
    Ok(Some(Value::Bool(interp.script.cache().set(&key, value, ttl))))
}

// windows

fn check_point_window(call: &mut CallExpr, _artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    int_literal(call, 0, "before")?;
    int_literal(call, 1, "after")?;
    if call.args.len() > 2 {
        str_list_literal(call, 2, "tag keys")?;
    }
    Ok(())
}

fn point_window(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let before = int_literal(call, 0, "before").unwrap_or(0) as usize;
    let after = int_literal(call, 1, "after").unwrap_or(0) as usize;
    let keys = if call.args.len() > 2 {
        str_list_literal(call, 2, "tag keys").unwrap_or_default()
    } else {
        Vec::new()
    };
    let group = keys
        .iter()
        .map(|k| interp.point.tags().get(k).cloned().unwrap_or_default())
        .collect();
    let hit = interp.window.as_ref().is_some_and(|w| w.hit);
    interp.window = Some(WindowRequest {
        before,
        after,
        group,
        hit,
    });
    Ok(None)
}

fn window_hit(interp: &mut Interp<'_>, _call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    if let Some(w) = interp.window.as_mut() {
        w.hit = true;
    }
    Ok(None)
}

// aggregation

/// Parse `90`, `"90s"`, `"5m"`, `"1h"` or `"500ms"`
fn parse_interval(e: &Expr) -> Result<Duration, String> {
    match &e.kind {
        ExprKind::Int(secs) if *secs >= 0 => Ok(Duration::from_secs(*secs as u64)),
        ExprKind::Str(s) => {
            let s = s.trim();
            let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (num, unit) = s.split_at(split);
            let n: u64 = num
                .parse()
                .map_err(|_| format!("invalid interval `{}`", s))?;
            let secs = match unit {
                "ms" => return Ok(Duration::from_millis(n)),
                "" | "s" => Some(n),
                "m" => n.checked_mul(60),
                "h" => n.checked_mul(3600),
                _ => None,
            };
            secs.map(Duration::from_secs)
                .ok_or_else(|| format!("invalid interval `{}`", s))
        }
        _ => Err("interval must be an int or duration literal".to_string()),
    }
}

fn check_agg_create(call: &mut CallExpr, _artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    str_literal(call, 0, "bucket")?;
    parse_interval(&call.args[1])?;
    int_literal(call, 2, "count")?;
    Ok(())
}

fn agg_create(interp: &mut Interp<'_>, call: &CallExpr, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let bucket = call.args[0].as_str_literal().unwrap_or_default();
    let interval = parse_interval(&call.args[1]).map_err(|e| RuntimeError::new(pos, e))?;
    let count = int_literal(call, 2, "count").unwrap_or(0) as usize;
    let created = interp
        .script
        .aggregates()
        .is_some_and(|agg| agg.create(bucket, interval, count));
    Ok(Some(Value::Bool(created)))
}

fn check_agg_metric(call: &mut CallExpr, _artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    str_literal(call, 0, "bucket")?;
    str_literal(call, 1, "new field")?;
    str_literal(call, 2, "function")?.parse::<AggFn>()?;
    str_list_literal(call, 3, "by tags")?;
    Ok(())
}

fn agg_metric(interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let bucket = call.args[0].as_str_literal().unwrap_or_default();
    let new_field = call.args[1].as_str_literal().unwrap_or_default();
    let Ok(func) = call.args[2].as_str_literal().unwrap_or_default().parse::<AggFn>() else {
        return Ok(Some(Value::Bool(false)));
    };
    let by_tags = str_list_literal(call, 3, "by tags").unwrap_or_default();

    let value = match interp.point.get(key_arg(call, 4)) {
        Ok((Value::String(s), _)) => s.trim().parse::<f64>().ok(),
        Ok((v, _)) => v.as_f64(),
        Err(_) => None,
    };
    let Some(value) = value else {
        return Ok(Some(Value::Bool(false)));
    };

    let tags: BTreeMap<String, String> = by_tags
        .into_iter()
        .map(|k| {
            let v = interp.point.tags().get(&k).cloned().unwrap_or_default();
            (k, v)
        })
        .collect();
    let ok = interp
        .script
        .aggregates()
        .is_some_and(|agg| agg.observe(bucket, new_field, func, tags, value));
    Ok(Some(Value::Bool(ok)))
}

// points

fn create_point(interp: &mut Interp<'_>, call: &CallExpr, pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let name = arg(interp, call, 0)?.to_tag_string();
    if name.is_empty() {
        return Err(RuntimeError::new(pos, "create_point(): empty point name"));
    }
    let mut pt = Point::new(name, interp.point.category());

    match arg(interp, call, 1)? {
        Value::Map(tags) => {
            for (k, v) in tags {
                let t = v.dtype();
                pt.set_tag(&k, v, t);
            }
        }
        Value::Nil => {}
        other => {
            return Err(RuntimeError::new(
                pos,
                format!("create_point(): tags must be a map, got {}", other.dtype()),
            ))
        }
    }
    match arg(interp, call, 2)? {
        Value::Map(fields) => {
            for (k, v) in fields {
                let t = v.dtype();
                pt.set(&k, v, t);
            }
        }
        Value::Nil => {}
        other => {
            return Err(RuntimeError::new(
                pos,
                format!("create_point(): fields must be a map, got {}", other.dtype()),
            ))
        }
    }
    if let Value::Int(ns) = arg(interp, call, 3)? {
        pt.set_time(chrono::DateTime::from_timestamp_nanos(ns));
    }

    interp.point.append_sub_point(pt);
    Ok(None)
}

const TIME_UNITS: &[&str] = &["s", "ms", "us", "ns"];

fn check_timestamp(call: &mut CallExpr, _artifacts: &mut Vec<Artifact>) -> Result<(), String> {
    if call.args.is_empty() {
        return Ok(());
    }
    let unit = str_literal(call, 0, "unit")?;
    if TIME_UNITS.contains(&unit.as_str()) {
        Ok(())
    } else {
        Err(format!("unsupported time unit `{}`", unit))
    }
}

fn timestamp(_interp: &mut Interp<'_>, call: &CallExpr, _pos: Pos) -> Result<Option<Value>, RuntimeError> {
    let now = Utc::now();
    let v = match call.args.first().and_then(Expr::as_str_literal) {
        Some("s") => now.timestamp(),
        Some("ms") => now.timestamp_millis(),
        Some("us") => now.timestamp_micros(),
        _ => now.timestamp_nanos_opt().unwrap_or_default(),
    };
    Ok(Some(Value::Int(v)))
}
