//! Syntax tree of the pipeline script language.
//!
//! The tree is immutable once a script is compiled. Call nodes that need a
//! precompiled pattern carry an index into the script's artifact table
//! (`payload`), filled in by the compile-time checker.

use std::fmt;

/// 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        })
    }
}

impl fmt::Display for CondOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CondOp::Eq => "==",
            CondOp::Ne => "!=",
            CondOp::Lt => "<",
            CondOp::Le => "<=",
            CondOp::Gt => ">",
            CondOp::Ge => ">=",
            CondOp::And => "&&",
            CondOp::Or => "||",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Paren(Box<Expr>),
    /// `obj.name`
    Attr {
        obj: Box<Expr>,
        name: String,
    },
    /// `obj[index]`
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    /// `obj[start:end]`, either bound optional
    Slice {
        obj: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cond {
        op: CondOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    In {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Expr>,
    /// Index into the script's artifact table
    pub payload: Option<usize>,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }

    /// Identifier or string literal used as a point key
    pub fn as_key(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(s) | ExprKind::Str(s) => Some(s),
            ExprKind::Paren(inner) => inner.as_key(),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    For {
        init: Option<Expr>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForIn {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break(Pos),
    Continue(Pos),
}

/// Walk every expression in a statement list, depth first.
pub fn walk_exprs_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(e) => walk_expr_mut(e, f),
            Stmt::Block(body) => walk_exprs_mut(body, f),
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    walk_expr_mut(cond, f);
                    walk_exprs_mut(body, f);
                }
                if let Some(body) = otherwise {
                    walk_exprs_mut(body, f);
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                for e in [init, cond, step].into_iter().flatten() {
                    walk_expr_mut(e, f);
                }
                walk_exprs_mut(body, f);
            }
            Stmt::ForIn { iter, body, .. } => {
                walk_expr_mut(iter, f);
                walk_exprs_mut(body, f);
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }
}

fn walk_expr_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match &mut expr.kind {
        ExprKind::List(items) => items.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        ExprKind::Map(pairs) => {
            for (k, v) in pairs {
                walk_expr_mut(k, f);
                walk_expr_mut(v, f);
            }
        }
        ExprKind::Paren(inner) => walk_expr_mut(inner, f),
        ExprKind::Attr { obj, .. } => walk_expr_mut(obj, f),
        ExprKind::Index { obj, index } => {
            walk_expr_mut(obj, f);
            walk_expr_mut(index, f);
        }
        ExprKind::Slice { obj, start, end } => {
            walk_expr_mut(obj, f);
            for e in [start, end].into_iter().flatten() {
                walk_expr_mut(e, f);
            }
        }
        ExprKind::Unary { rhs, .. } => walk_expr_mut(rhs, f),
        ExprKind::Arith { lhs, rhs, .. }
        | ExprKind::Cond { lhs, rhs, .. }
        | ExprKind::In { lhs, rhs } => {
            walk_expr_mut(lhs, f);
            walk_expr_mut(rhs, f);
        }
        ExprKind::Assign { target, value } => {
            walk_expr_mut(target, f);
            walk_expr_mut(value, f);
        }
        ExprKind::Call(call) => call.args.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        ExprKind::Ident(_)
        | ExprKind::Str(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Bool(_)
        | ExprKind::Nil => {}
    }
    f(expr);
}
