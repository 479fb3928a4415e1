//! Recursive-descent statement parser with a Pratt expression core.
//!
//! Binding powers, loosest first: assignment (right associative), `||`, `&&`,
//! `in`, comparisons, `+ -`, `* / %`, unary `! -`, then postfix call, index,
//! slice and attribute access.

use super::ast::*;
use super::lexer::{tokenize, Spanned, Token};
use thiserror::Error;

/// Syntax error with its source position
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: {message}")]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

impl ParseError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// Deepest expression or block nesting a script may use
pub const MAX_DEPTH: usize = 256;

/// Parse a script into its statement list
pub fn parse(source: &str) -> PResult<Vec<Stmt>> {
    let toks = tokenize(source)?;
    let mut parser = Parser {
        toks,
        idx: 0,
        nest: 0,
        depth: 0,
    };
    let stmts = parser.stmts()?;
    match parser.peek() {
        None => Ok(stmts),
        Some(tok) => {
            let msg = format!("unexpected {}", tok);
            Err(ParseError::new(parser.pos(), msg))
        }
    }
}

struct Parser {
    toks: Vec<Spanned>,
    idx: usize,
    /// Depth of `(`, `[` and map literal nesting; newlines are insignificant inside
    nest: usize,
    /// Current recursion depth, bounded by [`MAX_DEPTH`]
    depth: usize,
}

impl Parser {
    fn peek(&mut self) -> Option<&Token> {
        if self.nest > 0 {
            while matches!(self.toks.get(self.idx), Some(s) if s.tok == Token::Newline) {
                self.idx += 1;
            }
        }
        self.toks.get(self.idx).map(|s| &s.tok)
    }

    fn peek_is(&mut self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn pos(&self) -> Pos {
        self.toks
            .get(self.idx)
            .or_else(|| self.toks.last())
            .map(|s| s.pos)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Option<Spanned> {
        self.peek();
        let tok = self.toks.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> PResult<Pos> {
        let pos = self.pos();
        match self.advance() {
            Some(s) if s.tok == want => Ok(s.pos),
            Some(s) => Err(ParseError::new(
                s.pos,
                format!("expected {}, found {}", want, s.tok),
            )),
            None => Err(ParseError::new(
                pos,
                format!("expected {}, found end of script", want),
            )),
        }
    }

    fn descend(&mut self) -> PResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                self.pos(),
                format!("nesting deeper than {} levels", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.descend()?;
        let res = f(self);
        self.depth -= 1;
        res
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
            self.idx += 1;
        }
    }

    /// Peek past newlines without consuming them
    fn peek_past_newlines(&self) -> Option<&Token> {
        self.toks[self.idx..]
            .iter()
            .map(|s| &s.tok)
            .find(|t| **t != Token::Newline)
    }

    fn stmts(&mut self) -> PResult<Vec<Stmt>> {
        let mut out = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None | Some(Token::RBrace) => return Ok(out),
                _ => {}
            }
            out.push(self.stmt()?);
            match self.peek() {
                None | Some(Token::Newline | Token::Semi | Token::RBrace) => {}
                Some(tok) => {
                    let msg = format!("expected newline or `;`, found {}", tok);
                    return Err(ParseError::new(self.pos(), msg));
                }
            }
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.nested(Self::block_inner)
    }

    fn block_inner(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let saved = std::mem::take(&mut self.nest);
        let body = self.stmts();
        self.nest = saved;
        let body = body?;
        self.expect(Token::RBrace)?;
        Ok(body)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        match self.peek() {
            Some(Token::If) => self.if_stmt(),
            Some(Token::For) => self.for_stmt(),
            Some(Token::Break) => {
                self.idx += 1;
                Ok(Stmt::Break(pos))
            }
            Some(Token::Continue) => {
                self.idx += 1;
                Ok(Stmt::Continue(pos))
            }
            Some(Token::LBrace) => Ok(Stmt::Block(self.block()?)),
            _ => Ok(Stmt::Expr(self.expr()?)),
        }
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        self.expect(Token::If)?;
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut otherwise = None;
        loop {
            match self.peek_past_newlines().cloned() {
                Some(Token::Elif) => {
                    self.skip_newlines();
                    self.idx += 1;
                    branches.push((self.expr()?, self.block()?));
                }
                Some(Token::Else) => {
                    self.skip_newlines();
                    self.idx += 1;
                    otherwise = Some(self.block()?);
                    break;
                }
                _ => break,
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn skip_newlines(&mut self) {
        while matches!(self.toks.get(self.idx), Some(s) if s.tok == Token::Newline) {
            self.idx += 1;
        }
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        self.expect(Token::For)?;

        if let (Some(Spanned { tok: Token::Ident(name), .. }), Some(Spanned { tok: Token::In, .. })) =
            (self.toks.get(self.idx), self.toks.get(self.idx + 1))
        {
            let var = name.clone();
            self.idx += 2;
            let iter = self.expr()?;
            let body = self.block()?;
            return Ok(Stmt::ForIn { var, iter, body });
        }

        let init = if self.peek_is(&Token::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(Token::Semi)?;
        let cond = if self.peek_is(&Token::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(Token::Semi)?;
        let step = if self.peek_is(&Token::LBrace) {
            None
        } else {
            Some(self.expr()?)
        };
        let body = self.block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    pub(crate) fn expr(&mut self) -> PResult<Expr> {
        self.nested(Self::assign)
    }

    fn assign(&mut self) -> PResult<Expr> {
        let lhs = self.binary(0)?;
        if !self.peek_is(&Token::Assign) {
            return Ok(lhs);
        }
        let pos = self.pos();
        match lhs.kind {
            ExprKind::Ident(_) | ExprKind::Index { .. } | ExprKind::Attr { .. } => {}
            _ => return Err(ParseError::new(pos, "invalid assignment target")),
        }
        self.idx += 1;
        let value = self.expr()?;
        let lhs_pos = lhs.pos;
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(lhs),
                value: Box::new(value),
            },
            lhs_pos,
        ))
    }

    fn binding_power(tok: &Token) -> Option<u8> {
        Some(match tok {
            Token::OrOr => 1,
            Token::AndAnd => 2,
            Token::In => 3,
            Token::EqEq | Token::NotEq | Token::Lt | Token::Le | Token::Gt | Token::Ge => 4,
            Token::Plus | Token::Minus => 5,
            Token::Star | Token::Slash | Token::Percent => 6,
            _ => return None,
        })
    }

    fn binary(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        // operators folded into `lhs`; each one deepens the tree by a level
        let mut chain = 0;
        loop {
            let Some(tok) = self.peek().cloned() else { break };
            let Some(bp) = Self::binding_power(&tok) else { break };
            if bp <= min_bp {
                break;
            }
            chain += 1;
            if self.depth + chain > MAX_DEPTH {
                return Err(ParseError::new(
                    self.pos(),
                    format!("expression chain deeper than {} levels", MAX_DEPTH),
                ));
            }
            self.idx += 1;
            let rhs = self.binary(bp)?;
            let pos = lhs.pos;
            let (lhs_b, rhs_b) = (Box::new(lhs), Box::new(rhs));
            let kind = match tok {
                Token::In => ExprKind::In {
                    lhs: lhs_b,
                    rhs: rhs_b,
                },
                Token::Plus | Token::Minus | Token::Star | Token::Slash | Token::Percent => {
                    let op = match tok {
                        Token::Plus => ArithOp::Add,
                        Token::Minus => ArithOp::Sub,
                        Token::Star => ArithOp::Mul,
                        Token::Slash => ArithOp::Div,
                        _ => ArithOp::Mod,
                    };
                    ExprKind::Arith {
                        op,
                        lhs: lhs_b,
                        rhs: rhs_b,
                    }
                }
                _ => {
                    let op = match tok {
                        Token::OrOr => CondOp::Or,
                        Token::AndAnd => CondOp::And,
                        Token::EqEq => CondOp::Eq,
                        Token::NotEq => CondOp::Ne,
                        Token::Lt => CondOp::Lt,
                        Token::Le => CondOp::Le,
                        Token::Gt => CondOp::Gt,
                        _ => CondOp::Ge,
                    };
                    ExprKind::Cond {
                        op,
                        lhs: lhs_b,
                        rhs: rhs_b,
                    }
                }
            };
            lhs = Expr::new(kind, pos);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => {
                let primary = self.primary()?;
                return self.postfix(primary);
            }
        };
        self.idx += 1;
        let rhs = self.unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                rhs: Box::new(rhs),
            },
            pos,
        ))
    }

    fn postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    let name = match &expr.kind {
                        ExprKind::Ident(name) => name.clone(),
                        _ => {
                            return Err(ParseError::new(
                                self.pos(),
                                "only named functions can be called",
                            ))
                        }
                    };
                    self.idx += 1;
                    let args = self.delimited(Token::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call(CallExpr {
                            name,
                            args,
                            payload: None,
                        }),
                        expr.pos,
                    );
                }
                Some(Token::LBracket) => {
                    self.idx += 1;
                    self.nest += 1;
                    let res = self.index_or_slice(expr);
                    self.nest -= 1;
                    expr = res?;
                    self.expect(Token::RBracket)?;
                }
                Some(Token::Dot) => {
                    self.idx += 1;
                    let pos = self.pos();
                    let name = match self.advance().map(|s| s.tok) {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(ParseError::new(pos, "expected attribute name")),
                    };
                    let obj_pos = expr.pos;
                    expr = Expr::new(
                        ExprKind::Attr {
                            obj: Box::new(expr),
                            name,
                        },
                        obj_pos,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn index_or_slice(&mut self, obj: Expr) -> PResult<Expr> {
        let pos = obj.pos;
        let start = if self.peek_is(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if !self.peek_is(&Token::Colon) {
            let index = start.ok_or_else(|| ParseError::new(pos, "empty index"))?;
            return Ok(Expr::new(
                ExprKind::Index {
                    obj: Box::new(obj),
                    index,
                },
                pos,
            ));
        }
        self.idx += 1;
        let end = if self.peek_is(&Token::RBracket) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        Ok(Expr::new(
            ExprKind::Slice {
                obj: Box::new(obj),
                start,
                end,
            },
            pos,
        ))
    }

    /// Comma separated expressions up to `close`; the opener is already consumed.
    fn delimited(&mut self, close: Token) -> PResult<Vec<Expr>> {
        self.nest += 1;
        let res = self.delimited_inner(&close);
        self.nest -= 1;
        let items = res?;
        self.expect(close)?;
        Ok(items)
    }

    fn delimited_inner(&mut self, close: &Token) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.peek_is(close) {
            items.push(self.expr()?);
            if !self.peek_is(&Token::Comma) {
                break;
            }
            self.idx += 1;
        }
        Ok(items)
    }

    fn map_literal(&mut self) -> PResult<Vec<(Expr, Expr)>> {
        self.nest += 1;
        let res = self.map_pairs();
        self.nest -= 1;
        let pairs = res?;
        self.expect(Token::RBrace)?;
        Ok(pairs)
    }

    fn map_pairs(&mut self) -> PResult<Vec<(Expr, Expr)>> {
        let mut pairs = Vec::new();
        while !self.peek_is(&Token::RBrace) {
            let key = self.expr()?;
            self.expect(Token::Colon)?;
            let value = self.expr()?;
            pairs.push((key, value));
            if !self.peek_is(&Token::Comma) {
                break;
            }
            self.idx += 1;
        }
        Ok(pairs)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let Some(spanned) = self.advance() else {
            return Err(ParseError::new(pos, "unexpected end of script"));
        };
        let kind = match spanned.tok {
            Token::Ident(name) => ExprKind::Ident(name),
            Token::Str(s) => ExprKind::Str(s),
            Token::Int(v) => ExprKind::Int(v),
            Token::Float(v) => ExprKind::Float(v),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Nil => ExprKind::Nil,
            Token::LParen => {
                self.nest += 1;
                let inner = self.expr();
                self.nest -= 1;
                let inner = inner?;
                self.expect(Token::RParen)?;
                ExprKind::Paren(Box::new(inner))
            }
            Token::LBracket => ExprKind::List(self.delimited(Token::RBracket)?),
            Token::LBrace => ExprKind::Map(self.map_literal()?),
            other => {
                return Err(ParseError::new(
                    spanned.pos,
                    format!("unexpected {}", other),
                ))
            }
        };
        Ok(Expr::new(kind, spanned.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_expr(src: &str) -> Expr {
        match parse(src).unwrap().remove(0) {
            Stmt::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let e = one_expr("a = 1 + 2 * 3 == 7 && !b");
        let ExprKind::Assign { value, .. } = e.kind else { panic!() };
        let ExprKind::Cond { op: CondOp::And, lhs, rhs } = value.kind else { panic!() };
        assert!(matches!(rhs.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
        let ExprKind::Cond { op: CondOp::Eq, lhs: sum, .. } = lhs.kind else { panic!() };
        let ExprKind::Arith { op: ArithOp::Add, rhs: prod, .. } = sum.kind else { panic!() };
        assert!(matches!(prod.kind, ExprKind::Arith { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("x = {}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let err = parse(&deep).unwrap_err();
        assert!(err.message.contains("nesting deeper than"));

        let lists = format!("x = {}1{}", "[".repeat(50_000), "]".repeat(50_000));
        assert!(parse(&lists).is_err());

        let negs = format!("x = {}1", "-".repeat(50_000));
        assert!(parse(&negs).is_err());

        let blocks = format!("{}x = 1{}", "{\n".repeat(50_000), "\n}".repeat(50_000));
        assert!(parse(&blocks).is_err());
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let chain = format!("x = 1{}", " + 1".repeat(10_000));
        let err = parse(&chain).unwrap_err();
        assert!(err.message.contains("expression chain deeper than"));
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let src = format!("x = {}1{} + 2 * 3", "(".repeat(40), ")".repeat(40));
        assert!(parse(&src).is_ok());
        let sum = format!("x = 1{}", " + 1".repeat(100));
        assert!(parse(&sum).is_ok());
    }

    #[test]
    fn test_left_associative_arith() {
        let e = one_expr("10 - 4 - 3");
        let ExprKind::Arith { lhs, rhs, .. } = e.kind else { panic!() };
        assert!(matches!(lhs.kind, ExprKind::Arith { op: ArithOp::Sub, .. }));
        assert_eq!(rhs.kind, ExprKind::Int(3));
    }

    #[test]
    fn test_assignment_right_associative() {
        let e = one_expr("a = b = 1");
        let ExprKind::Assign { value, .. } = e.kind else { panic!() };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn test_call_and_postfix() {
        let e = one_expr(r#"grok(_, "%{INT:code}")"#);
        let ExprKind::Call(call) = e.kind else { panic!() };
        assert_eq!(call.name, "grok");
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.payload, None);

        let e = one_expr("m.a[1][2:]");
        let ExprKind::Slice { obj, start, end } = e.kind else { panic!() };
        assert!(start.is_some() && end.is_none());
        let ExprKind::Index { obj, .. } = obj.kind else { panic!() };
        assert!(matches!(obj.kind, ExprKind::Attr { .. }));
    }

    #[test]
    fn test_literals_span_lines() {
        let e = one_expr("x = {\n  \"a\": [1,\n 2],\n  \"b\": nil,\n}");
        let ExprKind::Assign { value, .. } = e.kind else { panic!() };
        let ExprKind::Map(pairs) = value.kind else { panic!() };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_if_elif_else() {
        let stmts = parse("if a { b = 1 }\nelif c { b = 2 } else {\n b = 3\n}").unwrap();
        assert_eq!(stmts.len(), 1);
        let Stmt::If { branches, otherwise } = &stmts[0] else { panic!() };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_for_forms() {
        let stmts = parse("for i = 0; i < 3; i = i + 1 { continue }\nfor k in m { break }").unwrap();
        assert!(matches!(&stmts[0], Stmt::For { init: Some(_), cond: Some(_), step: Some(_), .. }));
        assert!(matches!(&stmts[1], Stmt::ForIn { var, .. } if var == "k"));
    }

    #[test]
    fn test_in_operator() {
        let e = one_expr(r#""a" in ["a", "b"]"#);
        assert!(matches!(e.kind, ExprKind::In { .. }));
    }

    #[test]
    fn test_statement_separators() {
        let stmts = parse("a = 1; b = 2\n\n c = 3").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(parse("a = 1 b = 2").is_err());
    }

    #[test]
    fn test_error_reports_position() {
        let err = parse("a = 1\nb = (2").unwrap_err();
        assert_eq!(err.pos.line, 2);
        assert!(err.to_string().starts_with("2:"));
    }
}
