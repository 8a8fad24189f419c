//! Recursive descent parser for the pool source dialect.
//!
//! Expressions use precedence climbing; `match` statements are recognized
//! by bounded backtracking since `match` is a soft keyword. The parser
//! accepts a slight superset of the dialect grammar (e.g. walrus targets
//! anywhere a test appears); it is a consumer of already-valid units, not
//! a validator of the full language.

use bb_error::{PoolError, Result};

use crate::ast::{
    Arg, BinOp, BoolOp, CmpOp, Comprehension, ExceptHandler, Expr, ImportAlias, MatchCase,
    Module, Param, Params, Pattern, Stmt, UnaryOp, WithItem,
};
use crate::lexer::tokenize;
use crate::token::{Keyword as Kw, Op, Token, TokenKind};

/// Parse a complete source unit.
pub fn parse_module(source: &str) -> Result<Module> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.line)
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn err(&self, detail: impl Into<String>) -> PoolError {
        PoolError::syntax(self.line(), detail.into())
    }

    fn unexpected(&self, expected: &str) -> PoolError {
        self.err(format!("expected {expected}, found {}", self.peek().describe()))
    }

    fn check_op(&self, op: Op) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.check_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn check_kw(&self, kw: Kw) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.check_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek() {
            TokenKind::Name(n) => {
                let name = n.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn check_name(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Name(n) if n == name)
    }

    fn expect_newline(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    // ── Module & statements ───────────────────────────────────────────

    fn module(mut self) -> Result<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.pos += 1;
                }
                _ => body.append(&mut self.statement()?),
            }
        }
        Ok(Module { body })
    }

    /// Parse one compound statement or one simple-statement line.
    fn statement(&mut self) -> Result<Vec<Stmt>> {
        match self.peek() {
            TokenKind::Op(Op::At) => Ok(vec![self.decorated_def()?]),
            TokenKind::Keyword(Kw::Def) => Ok(vec![self.function_def(Vec::new(), false)?]),
            TokenKind::Keyword(Kw::Async) => Ok(vec![self.async_stmt(Vec::new())?]),
            TokenKind::Keyword(Kw::If) => Ok(vec![self.if_stmt()?]),
            TokenKind::Keyword(Kw::While) => Ok(vec![self.while_stmt()?]),
            TokenKind::Keyword(Kw::For) => Ok(vec![self.for_stmt(false)?]),
            TokenKind::Keyword(Kw::Try) => Ok(vec![self.try_stmt()?]),
            TokenKind::Keyword(Kw::With) => Ok(vec![self.with_stmt(false)?]),
            TokenKind::Name(n) if n == "match" => {
                // Soft keyword: attempt a match statement, fall back to an
                // expression line on failure.
                let saved = self.pos;
                match self.match_stmt() {
                    Ok(stmt) => Ok(vec![stmt]),
                    Err(_) => {
                        self.pos = saved;
                        self.simple_stmt_line()
                    }
                }
            }
            _ => self.simple_stmt_line(),
        }
    }

    fn decorated_def(&mut self) -> Result<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op(Op::At) {
            decorators.push(self.test()?);
            self.expect_newline()?;
            while matches!(self.peek(), TokenKind::Newline) {
                self.pos += 1;
            }
        }
        if self.check_kw(Kw::Async) {
            self.async_stmt(decorators)
        } else if self.check_kw(Kw::Def) {
            self.function_def(decorators, false)
        } else {
            Err(self.unexpected("'def' after decorators"))
        }
    }

    fn async_stmt(&mut self, decorators: Vec<Expr>) -> Result<Stmt> {
        self.expect_kw(Kw::Async)?;
        match self.peek() {
            TokenKind::Keyword(Kw::Def) => self.function_def(decorators, true),
            TokenKind::Keyword(Kw::For) if decorators.is_empty() => self.for_stmt(true),
            TokenKind::Keyword(Kw::With) if decorators.is_empty() => self.with_stmt(true),
            _ => Err(self.unexpected("'def', 'for', or 'with' after 'async'")),
        }
    }

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> Result<Stmt> {
        self.expect_kw(Kw::Def)?;
        let name = self.expect_name()?;
        self.expect_op(Op::LParen)?;
        let params = self.param_list(true, Op::RParen)?;
        self.expect_op(Op::RParen)?;
        let returns = if self.eat_op(Op::Arrow) {
            Some(self.test()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Stmt::FunctionDef {
            decorators,
            name,
            params,
            returns,
            body,
            is_async,
        })
    }

    /// Parse a parameter list up to (not including) `end`.
    fn param_list(&mut self, annotations: bool, end: Op) -> Result<Params> {
        let mut params = Params::default();
        loop {
            if self.check_op(end) {
                break;
            }
            if self.eat_op(Op::Slash) {
                if params.posonly.is_empty() && !params.args.is_empty() {
                    params.posonly = std::mem::take(&mut params.args);
                } else {
                    return Err(self.err("misplaced '/' in parameter list"));
                }
            } else if self.eat_op(Op::Star) {
                if params.star {
                    return Err(self.err("multiple '*' in parameter list"));
                }
                params.star = true;
                if matches!(self.peek(), TokenKind::Name(_)) {
                    params.vararg = Some(Box::new(self.param(annotations, false)?));
                }
            } else if self.eat_op(Op::DoubleStar) {
                params.kwarg = Some(Box::new(self.param(annotations, false)?));
            } else {
                let param = self.param(annotations, true)?;
                if params.star {
                    params.kwonly.push(param);
                } else {
                    params.args.push(param);
                }
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn param(&mut self, annotations: bool, defaults: bool) -> Result<Param> {
        let name = self.expect_name()?;
        let annotation = if annotations && self.eat_op(Op::Colon) {
            Some(self.test()?)
        } else {
            None
        };
        let default = if defaults && self.eat_op(Op::Assign) {
            Some(self.test()?)
        } else if !defaults && self.eat_op(Op::Assign) {
            return Err(self.err("parameter cannot have a default here"));
        } else {
            None
        };
        Ok(Param {
            name,
            annotation: annotation.map(Box::new),
            default,
        })
    }

    /// `:` NEWLINE INDENT stmts DEDENT, or an inline simple-statement list.
    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(Op::Colon)?;
        if matches!(self.peek(), TokenKind::Newline) {
            self.pos += 1;
            if !matches!(self.peek(), TokenKind::Indent) {
                return Err(self.unexpected("an indented block"));
            }
            self.pos += 1;
            let mut body = Vec::new();
            loop {
                match self.peek() {
                    TokenKind::Dedent => {
                        self.pos += 1;
                        break;
                    }
                    TokenKind::Eof => return Err(self.unexpected("dedent")),
                    TokenKind::Newline => {
                        self.pos += 1;
                    }
                    _ => body.append(&mut self.statement()?),
                }
            }
            Ok(body)
        } else {
            self.simple_stmt_line()
        }
    }

    fn simple_stmt_line(&mut self) -> Result<Vec<Stmt>> {
        let mut out = vec![self.simple_stmt()?];
        while self.eat_op(Op::Semi) {
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            out.push(self.simple_stmt()?);
        }
        self.expect_newline()?;
        Ok(out)
    }

    fn simple_stmt(&mut self) -> Result<Stmt> {
        match self.peek() {
            TokenKind::Keyword(Kw::Return) => {
                self.pos += 1;
                let value = if self.at_stmt_end() {
                    None
                } else {
                    Some(self.testlist_star()?)
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Keyword(Kw::Pass) => {
                self.pos += 1;
                Ok(Stmt::Pass)
            }
            TokenKind::Keyword(Kw::Break) => {
                self.pos += 1;
                Ok(Stmt::Break)
            }
            TokenKind::Keyword(Kw::Continue) => {
                self.pos += 1;
                Ok(Stmt::Continue)
            }
            TokenKind::Keyword(Kw::Import) => self.import_stmt(),
            TokenKind::Keyword(Kw::From) => self.import_from_stmt(),
            TokenKind::Keyword(Kw::Raise) => {
                self.pos += 1;
                if self.at_stmt_end() {
                    return Ok(Stmt::Raise {
                        exc: None,
                        cause: None,
                    });
                }
                let exc = self.test()?;
                let cause = if self.eat_kw(Kw::From) {
                    Some(self.test()?)
                } else {
                    None
                };
                Ok(Stmt::Raise {
                    exc: Some(exc),
                    cause,
                })
            }
            TokenKind::Keyword(Kw::Global) => {
                self.pos += 1;
                Ok(Stmt::Global(self.name_list()?))
            }
            TokenKind::Keyword(Kw::Nonlocal) => {
                self.pos += 1;
                Ok(Stmt::Nonlocal(self.name_list()?))
            }
            TokenKind::Keyword(Kw::Del) => {
                self.pos += 1;
                let target = self.target_list()?;
                let targets = match target {
                    Expr::Tuple(items) => items,
                    single => vec![single],
                };
                Ok(Stmt::Delete(targets))
            }
            TokenKind::Keyword(Kw::Assert) => {
                self.pos += 1;
                let test = self.test()?;
                let msg = if self.eat_op(Op::Comma) {
                    Some(self.test()?)
                } else {
                    None
                };
                Ok(Stmt::Assert { test, msg })
            }
            _ => self.expr_stmt(),
        }
    }

    fn at_stmt_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Op(Op::Semi)
        )
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(Op::Comma) {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn import_stmt(&mut self) -> Result<Stmt> {
        self.expect_kw(Kw::Import)?;
        let mut names = vec![self.dotted_alias()?];
        while self.eat_op(Op::Comma) {
            names.push(self.dotted_alias()?);
        }
        Ok(Stmt::Import(names))
    }

    fn dotted_alias(&mut self) -> Result<ImportAlias> {
        let mut name = self.expect_name()?;
        while self.eat_op(Op::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        let asname = if self.eat_kw(Kw::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(ImportAlias { name, asname })
    }

    fn import_from_stmt(&mut self) -> Result<Stmt> {
        self.expect_kw(Kw::From)?;
        let mut level = 0u32;
        loop {
            if self.eat_op(Op::Dot) {
                level += 1;
            } else if self.eat_op(Op::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }
        let module = if matches!(self.peek(), TokenKind::Name(_)) {
            let mut name = self.expect_name()?;
            while self.eat_op(Op::Dot) {
                name.push('.');
                name.push_str(&self.expect_name()?);
            }
            name
        } else {
            if level == 0 {
                return Err(self.unexpected("a module name"));
            }
            String::new()
        };
        self.expect_kw(Kw::Import)?;

        let names = if self.eat_op(Op::Star) {
            vec![ImportAlias {
                name: "*".to_owned(),
                asname: None,
            }]
        } else if self.eat_op(Op::LParen) {
            let mut names = Vec::new();
            loop {
                if self.check_op(Op::RParen) {
                    break;
                }
                names.push(self.plain_alias()?);
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
            self.expect_op(Op::RParen)?;
            if names.is_empty() {
                return Err(self.unexpected("an imported name"));
            }
            names
        } else {
            let mut names = vec![self.plain_alias()?];
            while self.eat_op(Op::Comma) {
                names.push(self.plain_alias()?);
            }
            names
        };

        Ok(Stmt::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn plain_alias(&mut self) -> Result<ImportAlias> {
        let name = self.expect_name()?;
        let asname = if self.eat_kw(Kw::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(ImportAlias { name, asname })
    }

    fn expr_stmt(&mut self) -> Result<Stmt> {
        let first = self.testlist_star()?;

        if let Some(op) = self.aug_op() {
            self.pos += 1;
            let value = self.rhs()?;
            return Ok(Stmt::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.eat_op(Op::Colon) {
            let annotation = self.test()?;
            let value = if self.eat_op(Op::Assign) {
                Some(self.rhs()?)
            } else {
                None
            };
            return Ok(Stmt::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if self.check_op(Op::Assign) {
            let mut targets = vec![first];
            let value = loop {
                self.expect_op(Op::Assign)?;
                let expr = self.rhs()?;
                if self.check_op(Op::Assign) {
                    targets.push(expr);
                } else {
                    break expr;
                }
            };
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    /// Right-hand side of an assignment: a testlist or a yield expression.
    fn rhs(&mut self) -> Result<Expr> {
        if self.check_kw(Kw::Yield) {
            self.yield_expr()
        } else {
            self.testlist_star()
        }
    }

    fn aug_op(&self) -> Option<BinOp> {
        let TokenKind::Op(op) = self.peek() else {
            return None;
        };
        Some(match op {
            Op::PlusEq => BinOp::Add,
            Op::MinusEq => BinOp::Sub,
            Op::StarEq => BinOp::Mult,
            Op::AtEq => BinOp::MatMult,
            Op::SlashEq => BinOp::Div,
            Op::DoubleSlashEq => BinOp::FloorDiv,
            Op::PercentEq => BinOp::Mod,
            Op::DoubleStarEq => BinOp::Pow,
            Op::LShiftEq => BinOp::LShift,
            Op::RShiftEq => BinOp::RShift,
            Op::AmpEq => BinOp::BitAnd,
            Op::PipeEq => BinOp::BitOr,
            Op::CaretEq => BinOp::BitXor,
            _ => return None,
        })
    }

    // ── Compound statements ───────────────────────────────────────────

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.expect_kw(Kw::If)?;
        let test = self.test()?;
        let body = self.block()?;
        let orelse = self.elif_or_else()?;
        Ok(Stmt::If { test, body, orelse })
    }

    fn elif_or_else(&mut self) -> Result<Vec<Stmt>> {
        if self.check_kw(Kw::Elif) {
            self.pos += 1;
            let test = self.test()?;
            let body = self.block()?;
            let orelse = self.elif_or_else()?;
            Ok(vec![Stmt::If { test, body, orelse }])
        } else if self.eat_kw(Kw::Else) {
            self.block()
        } else {
            Ok(Vec::new())
        }
    }

    fn while_stmt(&mut self) -> Result<Stmt> {
        self.expect_kw(Kw::While)?;
        let test = self.test()?;
        let body = self.block()?;
        let orelse = if self.eat_kw(Kw::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::While { test, body, orelse })
    }

    fn for_stmt(&mut self, is_async: bool) -> Result<Stmt> {
        self.expect_kw(Kw::For)?;
        let target = self.target_list()?;
        self.expect_kw(Kw::In)?;
        let iter = self.testlist_star()?;
        let body = self.block()?;
        let orelse = if self.eat_kw(Kw::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::For {
            target,
            iter,
            body,
            orelse,
            is_async,
        })
    }

    fn try_stmt(&mut self) -> Result<Stmt> {
        self.expect_kw(Kw::Try)?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_kw(Kw::Except) {
            let typ = if self.check_op(Op::Colon) {
                None
            } else {
                Some(self.test()?)
            };
            let name = if self.eat_kw(Kw::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            let handler_body = self.block()?;
            handlers.push(ExceptHandler {
                typ,
                name,
                body: handler_body,
            });
        }
        let orelse = if !handlers.is_empty() && self.eat_kw(Kw::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw(Kw::Finally) {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.err("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_stmt(&mut self, is_async: bool) -> Result<Stmt> {
        self.expect_kw(Kw::With)?;
        let mut items = vec![self.with_item()?];
        while self.eat_op(Op::Comma) {
            items.push(self.with_item()?);
        }
        let body = self.block()?;
        Ok(Stmt::With {
            items,
            body,
            is_async,
        })
    }

    fn with_item(&mut self) -> Result<WithItem> {
        let context = self.test()?;
        let target = if self.eat_kw(Kw::As) {
            Some(self.target()?)
        } else {
            None
        };
        Ok(WithItem { context, target })
    }

    // ── match statement ───────────────────────────────────────────────

    fn match_stmt(&mut self) -> Result<Stmt> {
        if !self.check_name("match") {
            return Err(self.unexpected("'match'"));
        }
        self.pos += 1;
        let subject = self.testlist_star()?;
        self.expect_op(Op::Colon)?;
        if !matches!(self.peek(), TokenKind::Newline) {
            return Err(self.unexpected("end of line"));
        }
        self.pos += 1;
        if !matches!(self.peek(), TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        self.pos += 1;

        let mut cases = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Dedent => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Newline => {
                    self.pos += 1;
                }
                _ => {
                    if !self.check_name("case") {
                        return Err(self.unexpected("'case'"));
                    }
                    self.pos += 1;
                    let pattern = self.patterns()?;
                    let guard = if self.eat_kw(Kw::If) {
                        Some(self.test()?)
                    } else {
                        None
                    };
                    let body = self.block()?;
                    cases.push(MatchCase {
                        pattern,
                        guard,
                        body,
                    });
                }
            }
        }
        if cases.is_empty() {
            return Err(self.err("match statement must have at least one case"));
        }
        Ok(Stmt::Match { subject, cases })
    }

    /// Top-level case patterns: a comma list is an open sequence pattern.
    fn patterns(&mut self) -> Result<Pattern> {
        let first = self.pattern()?;
        if !self.check_op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.check_op(Op::Colon) {
                break;
            }
            items.push(self.pattern()?);
        }
        Ok(Pattern::Sequence(items))
    }

    fn pattern(&mut self) -> Result<Pattern> {
        let mut first = self.closed_pattern()?;
        if self.check_op(Op::Pipe) {
            let mut choices = vec![first];
            while self.eat_op(Op::Pipe) {
                choices.push(self.closed_pattern()?);
            }
            first = Pattern::Or(choices);
        }
        if self.eat_kw(Kw::As) {
            let name = self.expect_name()?;
            return Ok(Pattern::As {
                pattern: Box::new(first),
                name,
            });
        }
        Ok(first)
    }

    fn closed_pattern(&mut self) -> Result<Pattern> {
        match self.peek().clone() {
            // Literal patterns parse a restricted grammar so that a
            // trailing `if` guard is never taken for a ternary.
            TokenKind::Number(_) | TokenKind::Op(Op::Minus) => {
                let mut expr = if self.eat_op(Op::Minus) {
                    Expr::UnaryOp {
                        op: UnaryOp::USub,
                        operand: Box::new(self.number_atom()?),
                    }
                } else {
                    self.number_atom()?
                };
                // Complex literals: `1+2j` / `1-2j`.
                if self.check_op(Op::Plus) || self.check_op(Op::Minus) {
                    let op = if self.eat_op(Op::Plus) {
                        BinOp::Add
                    } else {
                        self.pos += 1;
                        BinOp::Sub
                    };
                    let right = self.number_atom()?;
                    expr = bin(expr, op, right);
                }
                Ok(Pattern::Value(expr))
            }
            TokenKind::Str(_) | TokenKind::Bytes(_) => Ok(Pattern::Value(self.atom()?)),
            TokenKind::Keyword(Kw::None_) => {
                self.pos += 1;
                Ok(Pattern::Value(Expr::NoneLit))
            }
            TokenKind::Keyword(Kw::True) => {
                self.pos += 1;
                Ok(Pattern::Value(Expr::Bool(true)))
            }
            TokenKind::Keyword(Kw::False) => {
                self.pos += 1;
                Ok(Pattern::Value(Expr::Bool(false)))
            }
            TokenKind::Op(Op::Star) => {
                self.pos += 1;
                let name = self.expect_name()?;
                Ok(Pattern::Star {
                    name: (name != "_").then_some(name),
                })
            }
            TokenKind::Op(Op::LParen) => {
                self.pos += 1;
                let inner = self.patterns()?;
                self.expect_op(Op::RParen)?;
                Ok(inner)
            }
            TokenKind::Op(Op::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    if self.check_op(Op::RBracket) {
                        break;
                    }
                    items.push(self.pattern()?);
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RBracket)?;
                Ok(Pattern::Sequence(items))
            }
            TokenKind::Op(Op::LBrace) => self.mapping_pattern(),
            TokenKind::Name(name) => {
                self.pos += 1;
                if self.check_op(Op::Dot) {
                    // Dotted value pattern.
                    let mut expr = Expr::Name(name);
                    while self.eat_op(Op::Dot) {
                        let attr = self.expect_name()?;
                        expr = Expr::Attribute {
                            value: Box::new(expr),
                            attr,
                        };
                    }
                    if self.check_op(Op::LParen) {
                        return self.class_pattern(expr);
                    }
                    return Ok(Pattern::Value(expr));
                }
                if self.check_op(Op::LParen) {
                    return self.class_pattern(Expr::Name(name));
                }
                Ok(Pattern::Capture {
                    name: (name != "_").then_some(name),
                })
            }
            _ => Err(self.unexpected("a pattern")),
        }
    }

    fn number_atom(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Number(text) => {
                self.pos += 1;
                Ok(Expr::Num(text))
            }
            _ => Err(self.unexpected("a number")),
        }
    }

    fn mapping_pattern(&mut self) -> Result<Pattern> {
        self.expect_op(Op::LBrace)?;
        let mut keys = Vec::new();
        let mut patterns = Vec::new();
        let mut rest = None;
        loop {
            if self.check_op(Op::RBrace) {
                break;
            }
            if self.eat_op(Op::DoubleStar) {
                rest = Some(self.expect_name()?);
            } else {
                keys.push(self.test()?);
                self.expect_op(Op::Colon)?;
                patterns.push(self.pattern()?);
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RBrace)?;
        Ok(Pattern::Mapping {
            keys,
            patterns,
            rest,
        })
    }

    fn class_pattern(&mut self, cls: Expr) -> Result<Pattern> {
        self.expect_op(Op::LParen)?;
        let mut patterns = Vec::new();
        let mut kwd_names = Vec::new();
        let mut kwd_patterns = Vec::new();
        loop {
            if self.check_op(Op::RParen) {
                break;
            }
            if matches!(self.peek(), TokenKind::Name(_))
                && matches!(self.peek_at(1), TokenKind::Op(Op::Assign))
            {
                kwd_names.push(self.expect_name()?);
                self.expect_op(Op::Assign)?;
                kwd_patterns.push(self.pattern()?);
            } else {
                if !kwd_names.is_empty() {
                    return Err(self.err("positional pattern after keyword pattern"));
                }
                patterns.push(self.pattern()?);
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RParen)?;
        Ok(Pattern::Class {
            cls,
            patterns,
            kwd_names,
            kwd_patterns,
        })
    }

    // ── Targets ───────────────────────────────────────────────────────

    /// Assignment/loop targets: postfix expressions so that a following
    /// `in` keyword is left alone.
    fn target_list(&mut self) -> Result<Expr> {
        let mut items = vec![self.target()?];
        let mut saw_comma = false;
        while self.eat_op(Op::Comma) {
            saw_comma = true;
            if !self.can_start_target() {
                break;
            }
            items.push(self.target()?);
        }
        if items.len() == 1 && !saw_comma {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Tuple(items))
        }
    }

    fn target(&mut self) -> Result<Expr> {
        if self.eat_op(Op::Star) {
            Ok(Expr::Starred(Box::new(self.target()?)))
        } else {
            self.postfix()
        }
    }

    fn can_start_target(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Name(_) | TokenKind::Op(Op::LParen | Op::LBracket | Op::Star)
        )
    }

    // ── Expressions ───────────────────────────────────────────────────

    /// A comma-aware expression list allowing starred items; commas
    /// produce a tuple.
    fn testlist_star(&mut self) -> Result<Expr> {
        let mut items = vec![self.star_or_test()?];
        let mut saw_comma = false;
        while self.eat_op(Op::Comma) {
            saw_comma = true;
            if !self.can_start_expr() {
                break;
            }
            items.push(self.star_or_test()?);
        }
        if items.len() == 1 && !saw_comma {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Tuple(items))
        }
    }

    fn star_or_test(&mut self) -> Result<Expr> {
        if self.eat_op(Op::Star) {
            Ok(Expr::Starred(Box::new(self.bit_or()?)))
        } else {
            self.test()
        }
    }

    fn can_start_expr(&self) -> bool {
        match self.peek() {
            TokenKind::Name(_)
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Bytes(_) => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Kw::True | Kw::False | Kw::None_ | Kw::Not | Kw::Lambda | Kw::Await | Kw::Yield
            ),
            TokenKind::Op(op) => matches!(
                op,
                Op::LParen
                    | Op::LBracket
                    | Op::LBrace
                    | Op::Plus
                    | Op::Minus
                    | Op::Tilde
                    | Op::Star
                    | Op::Ellipsis
            ),
            _ => false,
        }
    }

    /// Full conditional expression, plus lambda/yield prefixes and a
    /// trailing walrus when the left side is a bare name.
    fn test(&mut self) -> Result<Expr> {
        if self.check_kw(Kw::Lambda) {
            return self.lambda();
        }
        if self.check_kw(Kw::Yield) {
            return self.yield_expr();
        }
        let expr = self.or_test()?;
        if self.check_op(Op::ColonEq) {
            let Expr::Name(target) = expr else {
                return Err(self.err("walrus target must be a name"));
            };
            self.pos += 1;
            let value = self.test()?;
            return Ok(Expr::NamedExpr {
                target,
                value: Box::new(value),
            });
        }
        if self.eat_kw(Kw::If) {
            let test = self.or_test()?;
            self.expect_kw(Kw::Else)?;
            let orelse = self.test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(expr),
                orelse: Box::new(orelse),
            });
        }
        Ok(expr)
    }

    fn lambda(&mut self) -> Result<Expr> {
        self.expect_kw(Kw::Lambda)?;
        let params = self.param_list(false, Op::Colon)?;
        self.expect_op(Op::Colon)?;
        let body = self.test()?;
        Ok(Expr::Lambda {
            params: Box::new(params),
            body: Box::new(body),
        })
    }

    fn yield_expr(&mut self) -> Result<Expr> {
        self.expect_kw(Kw::Yield)?;
        if self.eat_kw(Kw::From) {
            let value = self.test()?;
            return Ok(Expr::YieldFrom(Box::new(value)));
        }
        if self.at_expr_end() {
            return Ok(Expr::Yield(None));
        }
        let value = self.testlist_star()?;
        Ok(Expr::Yield(Some(Box::new(value))))
    }

    fn at_expr_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Op(
                    Op::RParen | Op::RBracket | Op::RBrace | Op::Semi | Op::Comma | Op::Colon
                )
        )
    }

    fn or_test(&mut self) -> Result<Expr> {
        let first = self.and_test()?;
        if !self.check_kw(Kw::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::Or) {
            values.push(self.and_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn and_test(&mut self) -> Result<Expr> {
        let first = self.not_test()?;
        if !self.check_kw(Kw::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::And) {
            values.push(self.not_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn not_test(&mut self) -> Result<Expr> {
        if self.eat_kw(Kw::Not) {
            let operand = self.not_test()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Op(Op::EqEq) => CmpOp::Eq,
                TokenKind::Op(Op::NotEq) => CmpOp::NotEq,
                TokenKind::Op(Op::Lt) => CmpOp::Lt,
                TokenKind::Op(Op::Le) => CmpOp::LtE,
                TokenKind::Op(Op::Gt) => CmpOp::Gt,
                TokenKind::Op(Op::Ge) => CmpOp::GtE,
                TokenKind::Keyword(Kw::In) => CmpOp::In,
                TokenKind::Keyword(Kw::Is) => {
                    self.pos += 1;
                    let op = if self.eat_kw(Kw::Not) {
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    };
                    ops.push(op);
                    comparators.push(self.bit_or()?);
                    continue;
                }
                TokenKind::Keyword(Kw::Not) => {
                    self.pos += 1;
                    self.expect_kw(Kw::In)?;
                    ops.push(CmpOp::NotIn);
                    comparators.push(self.bit_or()?);
                    continue;
                }
                _ => break,
            };
            self.pos += 1;
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn bit_or(&mut self) -> Result<Expr> {
        let mut left = self.bit_xor()?;
        while self.eat_op(Op::Pipe) {
            let right = self.bit_xor()?;
            left = bin(left, BinOp::BitOr, right);
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> Result<Expr> {
        let mut left = self.bit_and()?;
        while self.eat_op(Op::Caret) {
            let right = self.bit_and()?;
            left = bin(left, BinOp::BitXor, right);
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        let mut left = self.shift()?;
        while self.eat_op(Op::Amp) {
            let right = self.shift()?;
            left = bin(left, BinOp::BitAnd, right);
        }
        Ok(left)
    }

    fn shift(&mut self) -> Result<Expr> {
        let mut left = self.arith()?;
        loop {
            let op = if self.eat_op(Op::LShift) {
                BinOp::LShift
            } else if self.eat_op(Op::RShift) {
                BinOp::RShift
            } else {
                break;
            };
            let right = self.arith()?;
            left = bin(left, op, right);
        }
        Ok(left)
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op(Op::Plus) {
                BinOp::Add
            } else if self.eat_op(Op::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.term()?;
            left = bin(left, op, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = if self.eat_op(Op::Star) {
                BinOp::Mult
            } else if self.eat_op(Op::At) {
                BinOp::MatMult
            } else if self.eat_op(Op::DoubleSlash) {
                BinOp::FloorDiv
            } else if self.eat_op(Op::Slash) {
                BinOp::Div
            } else if self.eat_op(Op::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.factor()?;
            left = bin(left, op, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = if self.eat_op(Op::Plus) {
            UnaryOp::UAdd
        } else if self.eat_op(Op::Minus) {
            UnaryOp::USub
        } else if self.eat_op(Op::Tilde) {
            UnaryOp::Invert
        } else {
            return self.power();
        };
        let operand = self.factor()?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = if self.eat_kw(Kw::Await) {
            Expr::Await(Box::new(self.postfix()?))
        } else {
            self.postfix()?
        };
        if self.eat_op(Op::DoubleStar) {
            let exp = self.factor()?;
            return Ok(bin(base, BinOp::Pow, exp));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(Op::Dot) {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.check_op(Op::LParen) {
                let args = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_op(Op::LBracket) {
                let index = self.subscript_list()?;
                self.expect_op(Op::RBracket)?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Arg>> {
        self.expect_op(Op::LParen)?;
        if self.eat_op(Op::RParen) {
            return Ok(Vec::new());
        }

        let mut args = Vec::new();
        let first = self.call_arg()?;
        // A bare `expr for …` argument is a generator expression.
        if matches!(first, Arg::Positional(_))
            && (self.check_kw(Kw::For) || self.check_kw(Kw::Async))
        {
            let Arg::Positional(elt) = first else {
                unreachable!()
            };
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RParen)?;
            return Ok(vec![Arg::Positional(Expr::GeneratorExp {
                elt: Box::new(elt),
                generators,
            })]);
        }
        args.push(first);
        while self.eat_op(Op::Comma) {
            if self.check_op(Op::RParen) {
                break;
            }
            args.push(self.call_arg()?);
        }
        self.expect_op(Op::RParen)?;
        Ok(args)
    }

    fn call_arg(&mut self) -> Result<Arg> {
        if self.eat_op(Op::Star) {
            return Ok(Arg::Starred(self.test()?));
        }
        if self.eat_op(Op::DoubleStar) {
            return Ok(Arg::DoubleStarred(self.test()?));
        }
        if matches!(self.peek(), TokenKind::Name(_))
            && matches!(self.peek_at(1), TokenKind::Op(Op::Assign))
        {
            let name = self.expect_name()?;
            self.expect_op(Op::Assign)?;
            let value = self.test()?;
            return Ok(Arg::Keyword { name, value });
        }
        Ok(Arg::Positional(self.test()?))
    }

    fn subscript_list(&mut self) -> Result<Expr> {
        let mut items = vec![self.subscript_item()?];
        let mut saw_comma = false;
        while self.eat_op(Op::Comma) {
            saw_comma = true;
            if self.check_op(Op::RBracket) {
                break;
            }
            items.push(self.subscript_item()?);
        }
        if items.len() == 1 && !saw_comma {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Tuple(items))
        }
    }

    fn subscript_item(&mut self) -> Result<Expr> {
        let lower = if self.check_op(Op::Colon) {
            None
        } else {
            let expr = self.star_or_test()?;
            if !self.check_op(Op::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(Op::Colon)?;
        let upper = if self.slice_part_follows() {
            Some(Box::new(self.test()?))
        } else {
            None
        };
        let step = if self.eat_op(Op::Colon) {
            if self.slice_part_follows() {
                Some(Box::new(self.test()?))
            } else {
                None
            }
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn slice_part_follows(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::Op(Op::Colon | Op::Comma | Op::RBracket)
        )
    }

    fn comp_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = self.eat_kw(Kw::Async);
            self.expect_kw(Kw::For)?;
            let target = self.target_list()?;
            self.expect_kw(Kw::In)?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat_kw(Kw::If) {
                ifs.push(self.or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
            if !(self.check_kw(Kw::For) || self.check_kw(Kw::Async)) {
                break;
            }
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.pos += 1;
                Ok(Expr::Name(name))
            }
            TokenKind::Number(text) => {
                self.pos += 1;
                Ok(Expr::Num(text))
            }
            TokenKind::Str(value) => {
                self.pos += 1;
                let mut text = value;
                // Adjacent string literals concatenate.
                while let TokenKind::Str(next) = self.peek() {
                    text.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(text))
            }
            TokenKind::Bytes(value) => {
                self.pos += 1;
                let mut bytes = value;
                while let TokenKind::Bytes(next) = self.peek() {
                    bytes.extend_from_slice(next);
                    self.pos += 1;
                }
                Ok(Expr::Bytes(bytes))
            }
            TokenKind::Keyword(Kw::True) => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Kw::False) => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Kw::None_) => {
                self.pos += 1;
                Ok(Expr::NoneLit)
            }
            TokenKind::Op(Op::Ellipsis) => {
                self.pos += 1;
                Ok(Expr::Ellipsis)
            }
            TokenKind::Op(Op::LParen) => self.paren_atom(),
            TokenKind::Op(Op::LBracket) => self.list_atom(),
            TokenKind::Op(Op::LBrace) => self.brace_atom(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn paren_atom(&mut self) -> Result<Expr> {
        self.expect_op(Op::LParen)?;
        if self.eat_op(Op::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.check_kw(Kw::Yield) {
            let inner = self.yield_expr()?;
            self.expect_op(Op::RParen)?;
            return Ok(inner);
        }

        let first = self.star_or_test()?;
        if self.check_kw(Kw::For) || self.check_kw(Kw::Async) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RParen)?;
            return Ok(Expr::GeneratorExp {
                elt: Box::new(first),
                generators,
            });
        }

        if self.check_op(Op::Comma) {
            let mut items = vec![first];
            while self.eat_op(Op::Comma) {
                if self.check_op(Op::RParen) {
                    break;
                }
                items.push(self.star_or_test()?);
            }
            self.expect_op(Op::RParen)?;
            return Ok(Expr::Tuple(items));
        }

        self.expect_op(Op::RParen)?;
        Ok(first)
    }

    fn list_atom(&mut self) -> Result<Expr> {
        self.expect_op(Op::LBracket)?;
        if self.eat_op(Op::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.star_or_test()?;
        if self.check_kw(Kw::For) || self.check_kw(Kw::Async) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RBracket)?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.check_op(Op::RBracket) {
                break;
            }
            items.push(self.star_or_test()?);
        }
        self.expect_op(Op::RBracket)?;
        Ok(Expr::List(items))
    }

    fn brace_atom(&mut self) -> Result<Expr> {
        self.expect_op(Op::LBrace)?;
        if self.eat_op(Op::RBrace) {
            return Ok(Expr::Dict {
                keys: Vec::new(),
                values: Vec::new(),
            });
        }

        // `**expr` can only start a dict display.
        if self.eat_op(Op::DoubleStar) {
            let mut keys = vec![None];
            let mut values = vec![self.bit_or()?];
            while self.eat_op(Op::Comma) {
                if self.check_op(Op::RBrace) {
                    break;
                }
                self.dict_entry(&mut keys, &mut values)?;
            }
            self.expect_op(Op::RBrace)?;
            return Ok(Expr::Dict { keys, values });
        }

        let first = self.star_or_test()?;
        if self.eat_op(Op::Colon) {
            let value = self.test()?;
            if self.check_kw(Kw::For) || self.check_kw(Kw::Async) {
                let generators = self.comp_clauses()?;
                self.expect_op(Op::RBrace)?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut keys = vec![Some(first)];
            let mut values = vec![value];
            while self.eat_op(Op::Comma) {
                if self.check_op(Op::RBrace) {
                    break;
                }
                self.dict_entry(&mut keys, &mut values)?;
            }
            self.expect_op(Op::RBrace)?;
            return Ok(Expr::Dict { keys, values });
        }

        if self.check_kw(Kw::For) || self.check_kw(Kw::Async) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RBrace)?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.check_op(Op::RBrace) {
                break;
            }
            items.push(self.star_or_test()?);
        }
        self.expect_op(Op::RBrace)?;
        Ok(Expr::Set(items))
    }

    fn dict_entry(
        &mut self,
        keys: &mut Vec<Option<Expr>>,
        values: &mut Vec<Expr>,
    ) -> Result<()> {
        if self.eat_op(Op::DoubleStar) {
            keys.push(None);
            values.push(self.bit_or()?);
            return Ok(());
        }
        let key = self.test()?;
        self.expect_op(Op::Colon)?;
        let value = self.test()?;
        keys.push(Some(key));
        values.push(value);
        Ok(())
    }
}

fn bin(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}
