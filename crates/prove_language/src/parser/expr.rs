//! Pratt expression parsing, patterns, and statement blocks.
//!
//! Precedence, low to high: `|>`, `||`, `&&`, comparisons, `..`, `+ -`,
//! `* / %`, prefix `! -`, postfix `!` / call / field access. Only unary
//! operators are right-associative.

use prove_base::Span;

use crate::ast::expr::{
    BinaryOp, Expr, ExprKind, MatchArm, PatLiteral, Pattern, PatternKind, Stmt, StmtKind,
    StrLitPiece, UnaryOp,
};
use crate::token::{StrPiece, Token, TokenKind};

use super::Parser;

/// Binding powers; a binary operator at power `p` parses its right operand
/// at `p + 1`.
const BP_PIPE: u8 = 1;
const BP_OR: u8 = 2;
const BP_AND: u8 = 3;
const BP_CMP: u8 = 4;
const BP_RANGE: u8 = 5;
const BP_ADD: u8 = 6;
const BP_MUL: u8 = 7;

impl<'t, 'i> Parser<'t, 'i> {
    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_bp(0)
    }

    fn parse_bp(&mut self, min_bp: u8) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let (bp, op) = match self.peek() {
                TokenKind::PipeArrow => (BP_PIPE, None),
                TokenKind::OrOr => (BP_OR, Some(BinaryOp::Or)),
                TokenKind::AndAnd => (BP_AND, Some(BinaryOp::And)),
                TokenKind::EqEq => (BP_CMP, Some(BinaryOp::Eq)),
                TokenKind::NotEq => (BP_CMP, Some(BinaryOp::Ne)),
                TokenKind::Lt => (BP_CMP, Some(BinaryOp::Lt)),
                TokenKind::Gt => (BP_CMP, Some(BinaryOp::Gt)),
                TokenKind::LtEq => (BP_CMP, Some(BinaryOp::Le)),
                TokenKind::GtEq => (BP_CMP, Some(BinaryOp::Ge)),
                TokenKind::DotDot => (BP_RANGE, None),
                TokenKind::Plus => (BP_ADD, Some(BinaryOp::Add)),
                TokenKind::Minus => (BP_ADD, Some(BinaryOp::Sub)),
                TokenKind::Star => (BP_MUL, Some(BinaryOp::Mul)),
                TokenKind::Slash => (BP_MUL, Some(BinaryOp::Div)),
                TokenKind::Percent => (BP_MUL, Some(BinaryOp::Mod)),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            let op_token = self.advance().kind.clone();
            let rhs = self.parse_bp(bp + 1);
            let span = lhs.span.merge(rhs.span);
            let kind = match (op, op_token) {
                (_, TokenKind::PipeArrow) => ExprKind::Pipe {
                    value: Box::new(lhs),
                    target: Box::new(rhs),
                },
                (_, TokenKind::DotDot) => ExprKind::Range {
                    lo: Box::new(lhs),
                    hi: Box::new(rhs),
                },
                (Some(op), _) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                _ => unreachable!("operator table and construction table disagree"),
            };
            lhs = self.mk(kind, span);
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        let start = self.peek_span();
        match self.peek() {
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary();
                let span = start.merge(operand.span);
                self.mk(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) }, span)
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary();
                let span = start.merge(operand.span);
                self.mk(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }, span)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr());
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.peek_span();
                    self.expect(TokenKind::RParen, "')' to close arguments");
                    let span = expr.span.merge(end);
                    expr = self.mk(ExprKind::Call { callee: Box::new(expr), args }, span);
                }
                TokenKind::Dot => {
                    self.advance();
                    match self.eat_ident() {
                        Some((name, name_span)) => {
                            let span = expr.span.merge(name_span);
                            expr = self.mk(ExprKind::Field { recv: Box::new(expr), name }, span);
                        }
                        None => {
                            self.error_here("E200", "expected a field name after '.'");
                            break;
                        }
                    }
                }
                TokenKind::FailBang => {
                    let end = self.peek_span();
                    self.advance();
                    let span = expr.span.merge(end);
                    expr = self.mk(ExprKind::FailProp(Box::new(expr)), span);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Integer(value) => {
                self.advance();
                self.mk(ExprKind::Integer(value), span)
            }
            TokenKind::Decimal(value) => {
                self.advance();
                self.mk(ExprKind::Decimal(value), span)
            }
            TokenKind::True => {
                self.advance();
                self.mk(ExprKind::Boolean(true), span)
            }
            TokenKind::False => {
                self.advance();
                self.mk(ExprKind::Boolean(false), span)
            }
            TokenKind::Regex(text) => {
                self.advance();
                self.mk(ExprKind::Regex(text), span)
            }
            TokenKind::Str { kind, pieces } => {
                self.advance();
                let mut parsed = Vec::with_capacity(pieces.len());
                for piece in pieces {
                    match piece {
                        StrPiece::Text(text) => parsed.push(StrLitPiece::Text(text)),
                        StrPiece::Interp(tokens) => {
                            let expr = self.parse_interp(&tokens);
                            parsed.push(StrLitPiece::Interp(Box::new(expr)));
                        }
                    }
                }
                self.mk(ExprKind::Str { kind, pieces: parsed }, span)
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.mk(ExprKind::Ident(name), span)
            }
            TokenKind::ConstIdent(name) => {
                self.advance();
                self.mk(ExprKind::Ident(name), span)
            }
            TokenKind::TypeIdent(name) => {
                self.advance();
                if self.at(&TokenKind::Lt) {
                    // `TypeIdent<...>` is type arguments when the list is
                    // well-formed; otherwise revert to comparison.
                    let snapshot = self.pos;
                    self.advance();
                    if let Some(args) = self.try_type_arg_list() {
                        let end = self.tokens[self.pos - 1].span;
                        return self.mk(ExprKind::TypeApply { head: name, args }, span.merge(end));
                    }
                    self.pos = snapshot;
                }
                self.mk(ExprKind::TypeIdent(name), span)
            }
            TokenKind::Valid => {
                self.advance();
                let (name, name_span) = match self.eat_ident() {
                    Some(pair) => pair,
                    None => {
                        self.error_here("E200", "expected a function name after 'valid'");
                        (prove_base::Symbol::EMPTY, span)
                    }
                };
                if self.at(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr());
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.peek_span();
                    self.expect(TokenKind::RParen, "')' to close arguments");
                    self.mk(ExprKind::Valid { name, args: Some(args) }, span.merge(end))
                } else {
                    self.mk(ExprKind::Valid { name, args: None }, span.merge(name_span))
                }
            }
            TokenKind::Match => {
                self.advance();
                let subject = self.parse_expr();
                let arms = self.parse_arm_block();
                let span = span.merge(self.prev_span());
                self.mk(ExprKind::Match { subject: Box::new(subject), arms }, span)
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expr();
                let then_block = self.parse_stmt_block();
                let else_block = if self.eat(TokenKind::Else) {
                    Some(self.parse_stmt_block())
                } else {
                    None
                };
                let span = span.merge(self.prev_span());
                self.mk(
                    ExprKind::If { cond: Box::new(cond), then_block, else_block },
                    span,
                )
            }
            TokenKind::Comptime => {
                self.advance();
                let block = self.parse_stmt_block();
                let span = span.merge(self.prev_span());
                self.mk(ExprKind::Comptime(block), span)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr());
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = self.peek_span();
                self.expect(TokenKind::RBracket, "']' to close list literal");
                self.mk(ExprKind::List(items), span.merge(end))
            }
            TokenKind::LParen => {
                if let Some(lambda) = self.try_parse_lambda() {
                    return lambda;
                }
                self.advance();
                let inner = self.parse_expr();
                let end = self.peek_span();
                self.expect(TokenKind::RParen, "')' to close expression");
                self.mk(ExprKind::Paren(Box::new(inner)), span.merge(end))
            }
            other => {
                self.error_here("E200", format!("expected an expression, found {}", describe(&other)));
                self.advance_guarded();
                self.mk(ExprKind::Integer(0), span)
            }
        }
    }

    /// After `TypeIdent<`: attempts `type (',' type)* '>'`. Returns `None`
    /// (without committing) when the list is malformed.
    fn try_type_arg_list(&mut self) -> Option<Vec<crate::ast::types::TypeExpr>> {
        let mut args = Vec::new();
        let diags_before = self.diag_count();
        loop {
            if !matches!(self.peek(), TokenKind::TypeIdent(_)) {
                return None;
            }
            let ty = self.parse_type()?;
            args.push(ty);
            if self.eat(TokenKind::Comma) {
                continue;
            }
            break;
        }
        if self.diag_count() != diags_before {
            return None;
        }
        if self.eat(TokenKind::Gt) {
            Some(args)
        } else {
            None
        }
    }

    /// Lambdas are `(params) => expr`; the lookahead to the matching `)`
    /// decides between a lambda and a parenthesized expression.
    fn try_parse_lambda(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        let mut probe = self.pos + 1;
        let mut depth = 1usize;
        while let Some(token) = self.tokens.get(probe) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Newline | TokenKind::Eof => return None,
                _ => {}
            }
            probe += 1;
        }
        if !matches!(self.tokens.get(probe + 1).map(|t| &t.kind), Some(TokenKind::FatArrow)) {
            return None;
        }

        self.advance(); // (
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let Some((name, _)) = self.eat_ident() else {
                    self.error_here("E200", "expected a parameter name in lambda");
                    break;
                };
                let ty = if matches!(self.peek(), TokenKind::TypeIdent(_)) {
                    self.parse_type_no_where()
                } else {
                    None
                };
                params.push((name, ty));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close lambda parameters");
        self.expect(TokenKind::FatArrow, "'=>' to begin lambda body");
        let body = self.parse_expr();
        let span = start.merge(body.span);
        Some(self.mk(ExprKind::Lambda { params, body: Box::new(body) }, span))
    }

    /// Parses an interpolation segment's token stream as one expression.
    fn parse_interp(&mut self, tokens: &[Token]) -> Expr {
        let mut sub = Parser {
            tokens,
            pos: 0,
            file: self.file,
            interner: self.interner,
            diags: std::mem::take(&mut self.diags),
            next_node: self.next_node,
        };
        let expr = sub.parse_expr();
        if !matches!(sub.peek(), TokenKind::Eof) {
            sub.error_here("E200", "unexpected trailing tokens in interpolation");
        }
        self.diags = sub.diags;
        self.next_node = sub.next_node;
        expr
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// `Newline Indent stmt* Dedent`, or a single inline statement.
    pub(crate) fn parse_stmt_block(&mut self) -> Vec<Stmt> {
        if !self.eat(TokenKind::Newline) {
            // Inline body: a single statement on the same line.
            let stmt = self.parse_stmt();
            return vec![stmt];
        }
        if !self.eat_indent() {
            self.error_here("E200", "expected an indented block");
            return Vec::new();
        }
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_dedent() || matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt());
            if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Dedent(_) | TokenKind::Eof) {
                self.error_here("E200", "expected end of statement");
                self.sync_to_newline();
            }
        }
        stmts
    }

    pub(crate) fn parse_stmt(&mut self) -> Stmt {
        let start = self.peek_span();
        if let TokenKind::Ident(name) = self.peek().clone() {
            match self.peek2() {
                TokenKind::As => {
                    let name_span = self.peek_span();
                    self.advance();
                    self.advance();
                    let ty = self.parse_type();
                    self.expect(TokenKind::Assign, "'=' in variable declaration");
                    let value = self.parse_expr();
                    let span = start.merge(value.span);
                    return Stmt {
                        kind: StmtKind::VarDecl { name, name_span, ty, value },
                        span,
                    };
                }
                TokenKind::Assign => {
                    let name_span = self.peek_span();
                    self.advance();
                    self.advance();
                    let value = self.parse_expr();
                    let span = start.merge(value.span);
                    return Stmt {
                        kind: StmtKind::Assign { name, name_span, value },
                        span,
                    };
                }
                _ => {}
            }
        }
        let expr = self.parse_expr();
        let span = expr.span;
        Stmt { kind: StmtKind::Expr(expr), span }
    }

    /// `Newline Indent (pattern => expr)* Dedent`.
    pub(crate) fn parse_arm_block(&mut self) -> Vec<MatchArm> {
        let mut arms = Vec::new();
        if !self.eat(TokenKind::Newline) {
            self.error_here("E200", "expected match arms on the following lines");
            return arms;
        }
        if !self.eat_indent() {
            self.error_here("E200", "expected an indented block of match arms");
            return arms;
        }
        loop {
            self.skip_newlines();
            if self.eat_dedent() || matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            let pattern = self.parse_pattern();
            self.expect(TokenKind::FatArrow, "'=>' after match pattern");
            let body = self.parse_expr();
            let span = pattern.span.merge(body.span);
            arms.push(MatchArm { pattern, body, span });
            if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Dedent(_) | TokenKind::Eof) {
                self.error_here("E200", "expected end of match arm");
                self.sync_to_newline();
            }
        }
        arms
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    pub(crate) fn parse_pattern(&mut self) -> Pattern {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::TypeIdent(name) => {
                self.advance();
                let mut args = Vec::new();
                let mut end = span;
                if self.at(&TokenKind::LParen) {
                    self.advance();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_pattern());
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    end = self.peek_span();
                    self.expect(TokenKind::RParen, "')' to close pattern arguments");
                }
                Pattern {
                    kind: PatternKind::Variant { name, args },
                    span: span.merge(end),
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.is_underscore(name) {
                    Pattern { kind: PatternKind::Wildcard, span }
                } else {
                    Pattern { kind: PatternKind::Binding(name), span }
                }
            }
            TokenKind::Integer(value) => {
                self.advance();
                Pattern { kind: PatternKind::Literal(PatLiteral::Integer(value)), span }
            }
            TokenKind::Decimal(value) => {
                self.advance();
                Pattern { kind: PatternKind::Literal(PatLiteral::Decimal(value)), span }
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek().clone() {
                    TokenKind::Integer(value) => {
                        let end = self.peek_span();
                        self.advance();
                        Pattern {
                            kind: PatternKind::Literal(PatLiteral::Integer(-value)),
                            span: span.merge(end),
                        }
                    }
                    TokenKind::Decimal(value) => {
                        let end = self.peek_span();
                        self.advance();
                        Pattern {
                            kind: PatternKind::Literal(PatLiteral::Decimal(-value)),
                            span: span.merge(end),
                        }
                    }
                    _ => {
                        self.error_here("E205", "expected a numeric literal after '-' in pattern");
                        Pattern { kind: PatternKind::Wildcard, span }
                    }
                }
            }
            TokenKind::True => {
                self.advance();
                Pattern { kind: PatternKind::Literal(PatLiteral::Boolean(true)), span }
            }
            TokenKind::False => {
                self.advance();
                Pattern { kind: PatternKind::Literal(PatLiteral::Boolean(false)), span }
            }
            TokenKind::Str { pieces, .. } => {
                self.advance();
                let text = pieces
                    .iter()
                    .map(|p| match p {
                        StrPiece::Text(t) => t.as_str(),
                        StrPiece::Interp(_) => "",
                    })
                    .collect::<String>();
                if pieces.iter().any(|p| matches!(p, StrPiece::Interp(_))) {
                    self.error_here("E205", "interpolated strings cannot be patterns");
                }
                Pattern { kind: PatternKind::Literal(PatLiteral::Str(text)), span }
            }
            other => {
                self.error_here("E205", format!("expected a pattern, found {}", describe(&other)));
                self.advance_guarded();
                Pattern { kind: PatternKind::Wildcard, span }
            }
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].span
    }
}

/// Human name of a token kind for "expected X, found Y" messages.
pub(crate) fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Indent(_) => "indent".to_string(),
        TokenKind::Dedent(_) => "dedent".to_string(),
        TokenKind::Eof => "end of file".to_string(),
        TokenKind::Ident(_) => "an identifier".to_string(),
        TokenKind::TypeIdent(_) => "a type name".to_string(),
        TokenKind::ConstIdent(_) => "a constant name".to_string(),
        TokenKind::Integer(_) => "an integer literal".to_string(),
        TokenKind::Decimal(_) => "a decimal literal".to_string(),
        TokenKind::Str { .. } => "a string literal".to_string(),
        TokenKind::Regex(_) => "a regex literal".to_string(),
        TokenKind::RawRow(_) => "an annotation row".to_string(),
        TokenKind::DocComment(_) => "a doc comment".to_string(),
        other => format!("'{:?}'", other),
    }
}
