//! Tree-walking interpreter for compiled scripts.
//!
//! One [`Interp`] is created per run. It owns the local variable scopes and
//! borrows the point and the script (AST, artifacts, side tables). Identifier
//! lookup checks local scopes first, then the point; `_` names the `message`
//! key.

use super::ast::*;
use super::funcs;
use super::window::WindowRequest;
use super::CompiledScript;
use crate::point::{DType, Point, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Loop guard consulted at every iteration
pub trait Signal: Send + Sync {
    fn exit_signal(&self) -> bool;
}

impl Signal for AtomicBool {
    fn exit_signal(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl Signal for CancellationToken {
    fn exit_signal(&self) -> bool {
        self.is_cancelled()
    }
}

/// Failure raised while executing a script
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{pos}: {message}")]
pub struct RuntimeError {
    pub pos: Pos,
    pub message: String,
}

impl RuntimeError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

type RResult<T> = Result<T, RuntimeError>;

/// Resolve the `_` alias
pub(crate) fn point_key(name: &str) -> &str {
    if name == "_" {
        "message"
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
    Continue,
    Exit,
}

/// What a run leaves behind besides the mutated point
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub window: Option<WindowRequest>,
}

pub struct Interp<'a> {
    pub(crate) point: &'a mut Point,
    pub(crate) script: &'a CompiledScript,
    scopes: Vec<HashMap<String, Value>>,
    signal: Option<&'a dyn Signal>,
    pub(crate) exit: bool,
    pub(crate) window: Option<WindowRequest>,
}

impl<'a> Interp<'a> {
    pub fn new(
        script: &'a CompiledScript,
        point: &'a mut Point,
        signal: Option<&'a dyn Signal>,
    ) -> Self {
        Self {
            point,
            script,
            scopes: vec![HashMap::new()],
            signal,
            exit: false,
            window: None,
        }
    }

    pub fn run(mut self) -> RResult<RunOutcome> {
        let script = self.script;
        self.exec_stmts(script.stmts())?;
        Ok(RunOutcome {
            window: self.window,
        })
    }

    fn check_signal(&self, pos: Pos) -> RResult<()> {
        match self.signal {
            Some(sig) if sig.exit_signal() => {
                Err(RuntimeError::new(pos, "execution aborted by exit signal"))
            }
            _ => Ok(()),
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> RResult<Flow> {
        for stmt in stmts {
            let flow = self.exec(stmt)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn exec_scoped(&mut self, stmts: &[Stmt]) -> RResult<Flow> {
        self.scopes.push(HashMap::new());
        let res = self.exec_stmts(stmts);
        self.scopes.pop();
        res
    }

    fn after_eval(&self) -> Flow {
        if self.exit {
            Flow::Exit
        } else {
            Flow::Next
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> RResult<Flow> {
        match stmt {
            Stmt::Expr(e) => {
                self.eval(e)?;
                Ok(self.after_eval())
            }
            Stmt::Block(body) => self.exec_scoped(body),
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    let hit = self.eval(cond)?.is_truthy();
                    if self.exit {
                        return Ok(Flow::Exit);
                    }
                    if hit {
                        return self.exec_scoped(body);
                    }
                }
                match otherwise {
                    Some(body) => self.exec_scoped(body),
                    None => Ok(Flow::Next),
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let res = self.exec_for(init.as_ref(), cond.as_ref(), step.as_ref(), body);
                self.scopes.pop();
                res
            }
            Stmt::ForIn { var, iter, body } => self.exec_for_in(var, iter, body),
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Expr>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> RResult<Flow> {
        if let Some(init) = init {
            self.eval(init)?;
        }
        loop {
            if let Some(cond) = cond {
                self.check_signal(cond.pos)?;
                if !self.eval(cond)?.is_truthy() {
                    break;
                }
            } else {
                self.check_signal(Pos::default())?;
            }
            match self.exec_scoped(body)? {
                Flow::Break => break,
                Flow::Exit => return Ok(Flow::Exit),
                Flow::Next | Flow::Continue => {}
            }
            if let Some(step) = step {
                self.eval(step)?;
            }
        }
        Ok(Flow::Next)
    }

    fn exec_for_in(&mut self, var: &str, iter: &Expr, body: &[Stmt]) -> RResult<Flow> {
        let items: Vec<Value> = match self.eval(iter)? {
            Value::List(items) => items,
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            Value::Nil => Vec::new(),
            other => {
                return Err(RuntimeError::new(
                    iter.pos,
                    format!("cannot iterate over {}", other.dtype()),
                ))
            }
        };
        for item in items {
            self.check_signal(iter.pos)?;
            self.scopes.push(HashMap::from([(var.to_string(), item)]));
            let flow = self.exec_stmts(body);
            self.scopes.pop();
            match flow? {
                Flow::Break => break,
                Flow::Exit => return Ok(Flow::Exit),
                Flow::Next | Flow::Continue => {}
            }
        }
        Ok(Flow::Next)
    }

    /// Variable first, then point key
    pub(crate) fn lookup(&self, name: &str) -> (Value, DType) {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return (v.clone(), v.dtype());
            }
        }
        self.point
            .get(point_key(name))
            .unwrap_or((Value::Nil, DType::Nil))
    }

    fn assign_ident(&mut self, name: &str, value: Value, dtype: DType) {
        let key = point_key(name);
        if self.point.contains_key(key) {
            self.point.set(key, value, dtype);
            return;
        }
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, dtype: DType) -> RResult<()> {
        if let ExprKind::Ident(name) = &target.kind {
            self.assign_ident(name, value, dtype);
            return Ok(());
        }

        let mut path = Vec::new();
        let mut cur = target;
        let base = loop {
            match &cur.kind {
                ExprKind::Ident(name) => break name,
                ExprKind::Index { obj, index } => {
                    path.push(self.eval(index)?);
                    cur = obj.as_ref();
                }
                ExprKind::Attr { obj, name } => {
                    path.push(Value::String(name.clone()));
                    cur = obj.as_ref();
                }
                ExprKind::Paren(inner) => cur = inner.as_ref(),
                _ => return Err(RuntimeError::new(target.pos, "invalid assignment target")),
            }
        };
        path.reverse();

        let (mut container, _) = self.lookup(base);
        set_path(&mut container, &path, value, target.pos)?;
        let dtype = container.dtype();
        self.assign_ident(base, container, dtype);
        Ok(())
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> RResult<Value> {
        Ok(self.eval_typed(expr)?.0)
    }

    pub(crate) fn eval_typed(&mut self, expr: &Expr) -> RResult<(Value, DType)> {
        let pos = expr.pos;
        let v = match &expr.kind {
            ExprKind::Ident(name) => return Ok(self.lookup(name)),
            ExprKind::Str(s) => Value::String(s.clone()),
            ExprKind::Int(v) => Value::Int(*v),
            ExprKind::Float(v) => Value::Float(*v),
            ExprKind::Bool(v) => Value::Bool(*v),
            ExprKind::Nil => Value::Nil,
            ExprKind::List(items) => Value::List(
                items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<RResult<Vec<_>>>()?,
            ),
            ExprKind::Map(pairs) => {
                let mut map = std::collections::BTreeMap::new();
                for (k, v) in pairs {
                    let key = match self.eval(k)? {
                        Value::String(s) => s,
                        other => {
                            return Err(RuntimeError::new(
                                k.pos,
                                format!("map key must be a string, got {}", other.dtype()),
                            ))
                        }
                    };
                    map.insert(key, self.eval(v)?);
                }
                Value::Map(map)
            }
            ExprKind::Paren(inner) => return self.eval_typed(inner),
            ExprKind::Attr { obj, name } => match self.eval(obj)? {
                Value::Map(mut map) => map.remove(name).unwrap_or(Value::Nil),
                Value::Nil => Value::Nil,
                other => {
                    return Err(RuntimeError::new(
                        pos,
                        format!("cannot read attribute `{}` of {}", name, other.dtype()),
                    ))
                }
            },
            ExprKind::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                index_value(obj, &index, pos)?
            }
            ExprKind::Slice { obj, start, end } => {
                let obj = self.eval(obj)?;
                let start = match start {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                slice_value(obj, start, end, pos)?
            }
            ExprKind::Unary { op, rhs } => {
                let v = self.eval(rhs)?;
                match op {
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                    UnaryOp::Neg => match v {
                        Value::Int(i) => Value::Int(
                            i.checked_neg()
                                .ok_or_else(|| RuntimeError::new(pos, "integer overflow"))?,
                        ),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(RuntimeError::new(
                                pos,
                                format!("cannot negate {}", other.dtype()),
                            ))
                        }
                    },
                }
            }
            ExprKind::Arith { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                arith(*op, l, r, pos)?
            }
            ExprKind::Cond { op, lhs, rhs } => match op {
                CondOp::And => {
                    Value::Bool(self.eval(lhs)?.is_truthy() && self.eval(rhs)?.is_truthy())
                }
                CondOp::Or => {
                    Value::Bool(self.eval(lhs)?.is_truthy() || self.eval(rhs)?.is_truthy())
                }
                _ => {
                    let l = self.eval(lhs)?;
                    let r = self.eval(rhs)?;
                    Value::Bool(compare(*op, &l, &r, pos)?)
                }
            },
            ExprKind::In { lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                Value::Bool(contains(&r, &l, pos)?)
            }
            ExprKind::Assign { target, value } => {
                let (v, t) = self.eval_typed(value)?;
                self.assign(target, v.clone(), t)?;
                return Ok((v, t));
            }
            ExprKind::Call(call) => {
                return Ok(match funcs::call(self, call, pos)? {
                    Some(v) => {
                        let t = v.dtype();
                        (v, t)
                    }
                    None => (Value::Nil, DType::Void),
                })
            }
        };
        let t = v.dtype();
        Ok((v, t))
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    (0..len).contains(&i).then_some(i as usize)
}

fn index_value(obj: Value, index: &Value, pos: Pos) -> RResult<Value> {
    Ok(match (obj, index) {
        (Value::List(mut items), Value::Int(i)) => match normalize_index(*i, items.len()) {
            Some(i) => items.swap_remove(i),
            None => Value::Nil,
        },
        (Value::Map(mut map), Value::String(k)) => map.remove(k).unwrap_or(Value::Nil),
        (Value::String(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            match normalize_index(*i, chars.len()) {
                Some(i) => Value::String(chars[i].to_string()),
                None => Value::Nil,
            }
        }
        (Value::Nil, _) => Value::Nil,
        (obj, index) => {
            return Err(RuntimeError::new(
                pos,
                format!("cannot index {} with {}", obj.dtype(), index.dtype()),
            ))
        }
    })
}

fn slice_bounds(start: Option<Value>, end: Option<Value>, len: usize, pos: Pos) -> RResult<(usize, usize)> {
    let bound = |v: Option<Value>, default: i64| -> RResult<usize> {
        let i = match v {
            None | Some(Value::Nil) => default,
            Some(Value::Int(i)) => i,
            Some(other) => {
                return Err(RuntimeError::new(
                    pos,
                    format!("slice bound must be int, got {}", other.dtype()),
                ))
            }
        };
        let i = if i < 0 { i + len as i64 } else { i };
        Ok(i.clamp(0, len as i64) as usize)
    };
    let s = bound(start, 0)?;
    let e = bound(end, len as i64)?;
    Ok((s, e.max(s)))
}

fn slice_value(obj: Value, start: Option<Value>, end: Option<Value>, pos: Pos) -> RResult<Value> {
    match obj {
        Value::List(items) => {
            let (s, e) = slice_bounds(start, end, items.len(), pos)?;
            Ok(Value::List(items[s..e].to_vec()))
        }
        Value::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = slice_bounds(start, end, chars.len(), pos)?;
            Ok(Value::String(chars[s..e].iter().collect()))
        }
        Value::Nil => Ok(Value::Nil),
        other => Err(RuntimeError::new(
            pos,
            format!("cannot slice {}", other.dtype()),
        )),
    }
}

fn set_path(container: &mut Value, path: &[Value], value: Value, pos: Pos) -> RResult<()> {
    let Some((first, rest)) = path.split_first() else {
        *container = value;
        return Ok(());
    };
    match (container, first) {
        (Value::List(items), Value::Int(i)) => {
            let len = items.len();
            let idx = normalize_index(*i, len).ok_or_else(|| {
                RuntimeError::new(pos, format!("index {} out of range for list of {}", i, len))
            })?;
            set_path(&mut items[idx], rest, value, pos)
        }
        (Value::Map(map), Value::String(k)) => {
            if rest.is_empty() {
                map.insert(k.clone(), value);
                return Ok(());
            }
            match map.get_mut(k) {
                Some(inner) => set_path(inner, rest, value, pos),
                None => Err(RuntimeError::new(pos, format!("key `{}` not found", k))),
            }
        }
        (c, k) => Err(RuntimeError::new(
            pos,
            format!("cannot assign into {} with {} index", c.dtype(), k.dtype()),
        )),
    }
}

fn arith(op: ArithOp, l: Value, r: Value, pos: Pos) -> RResult<Value> {
    let overflow = || RuntimeError::new(pos, "integer overflow");
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let v = match op {
                ArithOp::Add => a.checked_add(b).ok_or_else(overflow)?,
                ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
                ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
                ArithOp::Div | ArithOp::Mod if b == 0 => {
                    return Err(RuntimeError::new(pos, "division by zero"))
                }
                ArithOp::Div => a.checked_div(b).ok_or_else(overflow)?,
                ArithOp::Mod => a.checked_rem(b).ok_or_else(overflow)?,
            };
            Ok(Value::Int(v))
        }
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => Ok(Value::String(a + &b)),
        (l @ (Value::Int(_) | Value::Float(_)), r @ (Value::Int(_) | Value::Float(_))) => {
            let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
            let v = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div if b == 0.0 => {
                    return Err(RuntimeError::new(pos, "division by zero"))
                }
                ArithOp::Div => a / b,
                ArithOp::Mod => {
                    return Err(RuntimeError::new(pos, "`%` requires int operands"))
                }
            };
            Ok(Value::Float(v))
        }
        (l, r) => Err(RuntimeError::new(
            pos,
            format!("unsupported operands for `{}`: {} and {}", op, l.dtype(), r.dtype()),
        )),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => l == r,
    }
}

fn compare(op: CondOp, l: &Value, r: &Value, pos: Pos) -> RResult<bool> {
    match op {
        CondOp::Eq => return Ok(values_equal(l, r)),
        CondOp::Ne => return Ok(!values_equal(l, r)),
        _ => {}
    }
    let ord = match (l, r) {
        (Value::Nil, _) | (_, Value::Nil) => return Ok(false),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (a @ (Value::Int(_) | Value::Float(_)), b @ (Value::Int(_) | Value::Float(_))) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            match a.partial_cmp(&b) {
                Some(o) => o,
                None => return Ok(false),
            }
        }
        _ => {
            return Err(RuntimeError::new(
                pos,
                format!("cannot compare {} with {}", l.dtype(), r.dtype()),
            ))
        }
    };
    Ok(match op {
        CondOp::Lt => ord.is_lt(),
        CondOp::Le => ord.is_le(),
        CondOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
    })
}

fn contains(haystack: &Value, needle: &Value, pos: Pos) -> RResult<bool> {
    match (haystack, needle) {
        (Value::List(items), n) => Ok(items.iter().any(|i| values_equal(i, n))),
        (Value::Map(map), Value::String(k)) => Ok(map.contains_key(k)),
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Nil, _) => Ok(false),
        (h, n) => Err(RuntimeError::new(
            pos,
            format!("unsupported operands for `in`: {} in {}", n.dtype(), h.dtype()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::CompiledScript;
    use crate::types::{Category, Namespace};

    fn run(src: &str, point: &mut Point) -> RResult<RunOutcome> {
        let script = CompiledScript::compile(Category::Logging, Namespace::Default, "t.p", src)
            .unwrap_or_else(|e| panic!("compile failed: {}", e));
        Interp::new(&script, point, None).run()
    }

    fn log(msg: &str) -> Point {
        Point::new("test", Category::Logging).with_field("message", msg)
    }

    #[test]
    fn test_local_variables_do_not_touch_point() {
        let mut pt = log("m");
        run("x = 1 + 2\ny = x * 2", &mut pt).unwrap();
        assert!(!pt.contains_key("x"));
        assert!(!pt.contains_key("y"));
    }

    #[test]
    fn test_assign_existing_key_updates_point() {
        let mut pt = log("m").with_field("n", 1i64);
        run("n = n + 41\n_ = \"rewritten\"", &mut pt).unwrap();
        assert_eq!(pt.fields()["n"], Value::Int(42));
        assert_eq!(pt.fields()["message"], Value::from("rewritten"));
    }

    #[test]
    fn test_if_elif_else_and_loops() {
        let mut pt = log("m");
        run(
            r#"
total = 0
for i = 0; i < 10; i = i + 1 {
    if i == 3 { continue } elif i == 6 { break }
    total = total + i
}
for k in {"a": 1, "b": 2} { total = total + len(k) }
add_key(total)
"#,
            &mut pt,
        )
        .unwrap();
        assert_eq!(pt.fields()["total"], Value::Int(14));
    }

    #[test]
    fn test_index_assignment_on_variables() {
        let mut pt = log("m");
        run(
            r#"
m = {"a": [1, 2, 3]}
m["a"][-1] = 9
m.b = "x"
add_key(out, dump_json(m))
"#,
            &mut pt,
        )
        .unwrap();
        assert_eq!(pt.fields()["out"], Value::from(r#"{"a":[1,2,9],"b":"x"}"#));
    }

    #[test]
    fn test_arith_semantics() {
        let mut pt = log("m");
        run(
            r#"add_key(a, 7 / 2)
add_key(b, 7 / 2.0)
add_key(c, "ab" + "cd")
add_key(d, -(3 % 2))"#,
            &mut pt,
        )
        .unwrap();
        assert_eq!(pt.fields()["a"], Value::Int(3));
        assert_eq!(pt.fields()["b"], Value::Float(3.5));
        assert_eq!(pt.fields()["c"], Value::from("abcd"));
        assert_eq!(pt.fields()["d"], Value::Int(-1));
    }

    #[test]
    fn test_runtime_errors_carry_position() {
        let mut pt = log("m");
        let err = run("x = 1\ny = x / 0", &mut pt).unwrap_err();
        assert_eq!(err.pos.line, 2);
        assert!(err.message.contains("division by zero"));

        let err = run("z = \"a\" + 1", &mut pt).unwrap_err();
        assert!(err.message.contains("unsupported operands"));
    }

    #[test]
    fn test_in_and_comparisons() {
        let mut pt = log("GET /index.html");
        run(
            r#"
if "GET" in _ && 2 in [1, 2.0] && !("z" in {"a": 1}) && 1 < 1.5 && "a" < "b" {
    add_key(ok, true)
}
if missing > 3 { add_key(bad, true) }
"#,
            &mut pt,
        )
        .unwrap();
        assert_eq!(pt.fields()["ok"], Value::Bool(true));
        assert!(!pt.contains_key("bad"));
    }

    #[test]
    fn test_slices() {
        let mut pt = log("hello world");
        run("add_key(head, _[:5])\nadd_key(tail, _[-5:])", &mut pt).unwrap();
        assert_eq!(pt.fields()["head"], Value::from("hello"));
        assert_eq!(pt.fields()["tail"], Value::from("world"));
    }

    #[test]
    fn test_exit_stops_execution() {
        let mut pt = log("m");
        run("add_key(a, 1)\nexit()\nadd_key(b, 2)", &mut pt).unwrap();
        assert!(pt.contains_key("a"));
        assert!(!pt.contains_key("b"));
    }

    #[test]
    fn test_signal_aborts_loops() {
        let script = CompiledScript::compile(
            Category::Logging,
            Namespace::Default,
            "loop.p",
            "for ;; { x = 1 }",
        )
        .unwrap();
        let mut pt = log("m");
        let stop = AtomicBool::new(true);
        let err = Interp::new(&script, &mut pt, Some(&stop)).run().unwrap_err();
        assert!(err.message.contains("exit signal"));
    }
}
