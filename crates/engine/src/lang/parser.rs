// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Recursive-descent parser producing a [`Module`].

use super::{
    ast::{BinaryOp, CmpOp, Expr, Module, Stmt, StmtKind, Target},
    lexer::{tokenize, Token, TokenKind},
    CompileError,
};

/// Deepest bracket nesting a program may use
pub const MAX_BRACKET_NESTING: usize = 200;

/// Deepest syntax tree a program may produce, counting blocks, operator
/// chains and unary prefixes
pub const MAX_NESTING: usize = 500;

/// Parse program text into a syntax tree
pub fn parse(source: &str) -> Result<Module, CompileError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0, brackets: 0 };
    parser.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    brackets: usize,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_name(&mut self, what: &str) -> PResult<String> {
        match self.advance() {
            TokenKind::Name(name) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected {what}")))
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.line(), message)
    }

    /// Enter one more level of the syntax tree
    fn descend(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("too many nested expressions or blocks"));
        }
        Ok(())
    }

    fn open_bracket(&mut self) -> PResult<()> {
        self.brackets += 1;
        if self.brackets > MAX_BRACKET_NESTING {
            return Err(self.error("too many nested parentheses"));
        }
        Ok(())
    }

    fn close_bracket(&mut self, close: TokenKind, what: &str) -> PResult<()> {
        self.expect(close, what)?;
        self.brackets -= 1;
        Ok(())
    }

    fn module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        while *self.peek() != TokenKind::Eof {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(Module { body })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        match self.peek() {
            TokenKind::Def => self.def(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Indent => Err(self.error("unexpected indent")),
            _ => self.simple_statement(),
        }
    }

    fn simple_statement(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                    None
                } else {
                    Some(self.expression()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            _ => {
                let expr = self.expression()?;
                let aug_op = match self.peek() {
                    TokenKind::PlusAssign => Some(BinaryOp::Add),
                    TokenKind::MinusAssign => Some(BinaryOp::Sub),
                    TokenKind::StarAssign => Some(BinaryOp::Mul),
                    _ => None,
                };
                if self.eat(&TokenKind::Assign) {
                    let target = self.target(expr)?;
                    let value = self.expression()?;
                    StmtKind::Assign { target, value }
                } else if let Some(op) = aug_op {
                    self.advance();
                    let Expr::Name(name) = expr else {
                        return Err(self.error("augmented assignment needs a plain name"));
                    };
                    let value = self.expression()?;
                    StmtKind::AugAssign { name, op, value }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };

        if !matches!(self.peek(), TokenKind::Eof) {
            self.expect(TokenKind::Newline, "end of line")?;
        }
        Ok(Stmt { kind, line })
    }

    fn target(&self, expr: Expr) -> PResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { object, index } => Ok(Target::Subscript { object: *object, index: *index }),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "':'")?;
        self.descend()?;
        let body = self.block_body()?;
        self.depth -= 1;
        Ok(body)
    }

    fn block_body(&mut self) -> PResult<Vec<Stmt>> {
        if !self.eat(&TokenKind::Newline) {
            return Ok(vec![self.simple_statement()?]);
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if *self.peek() == TokenKind::Eof {
                break;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn def(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_name("function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let param = self.expect_name("parameter name")?;
                if params.contains(&param) {
                    return Err(self.error(format!(
                        "duplicate argument '{param}' in function definition"
                    )));
                }
                params.push(param);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma, "',' or ')'")?;
                if self.eat(&TokenKind::RParen) {
                    break;
                }
            }
        }
        let body = self.block()?;
        Ok(Stmt { kind: StmtKind::Def { name, params, body }, line })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        let condition = self.expression()?;
        let body = self.block()?;
        let mut branches = vec![(condition, line, body)];
        let mut orelse = Vec::new();
        loop {
            let branch_line = self.line();
            if self.eat(&TokenKind::Elif) {
                let condition = self.expression()?;
                let body = self.block()?;
                branches.push((condition, branch_line, body));
            } else if self.eat(&TokenKind::Else) {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt { kind: StmtKind::If { branches, orelse }, line })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let line = self.line();
        self.advance();
        let condition = self.expression()?;
        let body = self.block()?;
        Ok(Stmt { kind: StmtKind::While { condition, body }, line })
    }

    fn expression(&mut self) -> PResult<Expr> {
        self.descend()?;
        let expr = self.or_expr()?;
        self.depth -= 1;
        Ok(expr)
    }

    // Operator chains build left-leaning trees, so every link counts as a level.

    fn or_expr(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            self.descend()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = start;
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            self.descend()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = start;
        Ok(left)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Not) {
            self.descend()?;
            let operand = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn compare_op(&self) -> Option<CmpOp> {
        Some(match self.peek() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            _ => return None,
        })
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.arith()?;
        let Some(op) = self.compare_op() else {
            return Ok(left);
        };
        self.advance();
        let right = self.arith()?;
        if self.compare_op().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }
        Ok(Expr::Compare { op, left: Box::new(left), right: Box::new(right) })
    }

    fn arith(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.term()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = start;
        Ok(left)
    }

    fn term(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = start;
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut negations = 0usize;
        loop {
            if self.eat(&TokenKind::Minus) {
                negations += 1;
                self.descend()?;
            } else if !self.eat(&TokenKind::Plus) {
                break;
            }
        }
        let mut expr = self.postfix()?;
        for _ in 0..negations {
            expr = Expr::Neg(Box::new(expr));
        }
        self.depth = start;
        Ok(expr)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let start = self.depth;
        let mut expr = self.atom()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                self.descend()?;
                self.open_bracket()?;
                let args = self.sequence(TokenKind::RParen, "')'")?;
                expr = Expr::Call { callee: Box::new(expr), args };
            } else if self.eat(&TokenKind::LBracket) {
                self.descend()?;
                self.open_bracket()?;
                let index = self.expression()?;
                self.close_bracket(TokenKind::RBracket, "']'")?;
                expr = Expr::Subscript { object: Box::new(expr), index: Box::new(index) };
            } else {
                break;
            }
        }
        self.depth = start;
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed; the
    /// opening bracket has already been counted
    fn sequence(&mut self, close: TokenKind, what: &str) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if *self.peek() == close {
                break;
            }
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.close_bracket(close, what)?;
        Ok(items)
    }

    fn atom(&mut self) -> PResult<Expr> {
        let expr = match self.advance() {
            TokenKind::Int(i) => Expr::Int(i),
            TokenKind::Float(x) => Expr::Float(x),
            TokenKind::Str(s) => {
                let mut text = s;
                while let TokenKind::Str(next) = self.peek() {
                    text.push_str(next);
                    self.advance();
                }
                Expr::Str(text)
            }
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::None => Expr::None,
            TokenKind::Name(name) => Expr::Name(name),
            TokenKind::LParen => {
                self.open_bracket()?;
                let inner = self.expression()?;
                self.close_bracket(TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => {
                self.open_bracket()?;
                Expr::List(self.sequence(TokenKind::RBracket, "']'")?)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error("invalid syntax"));
            }
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Vec<Stmt> {
        parse(source).unwrap().body
    }

    #[test]
    fn test_precedence() {
        let stmts = body("x = 1 + 2 * 3 < 10 and not y\n");
        let StmtKind::Assign { value, .. } = &stmts[0].kind else { panic!("not an assignment") };
        let Expr::And(left, right) = value else { panic!("expected and, got {value:?}") };
        assert!(matches!(**right, Expr::Not(_)));
        let Expr::Compare { op: CmpOp::Lt, left, .. } = &**left else { panic!("expected <") };
        let Expr::Binary { op: BinaryOp::Add, right, .. } = &**left else { panic!("expected +") };
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_compound_statements() {
        let source = "\
def f(a, b):
    if a:
        return b
    elif b:
        pass
    else:
        return
while x < 3: x += 1
items[0] = f(1, 2)[1]
";
        let stmts = body(source);
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[1].line, 8);
        assert_eq!(stmts[2].line, 9);

        let StmtKind::Def { name, params, body } = &stmts[0].kind else { panic!("not a def") };
        assert_eq!(name, "f");
        assert_eq!(params, &["a".to_string(), "b".to_string()]);
        let StmtKind::If { branches, orelse } = &body[0].kind else { panic!("not an if") };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].1, 4);
        assert_eq!(orelse[0].kind, StmtKind::Return(None));

        assert!(matches!(
            &stmts[1].kind,
            StmtKind::While { body, .. } if matches!(body[0].kind, StmtKind::AugAssign { .. })
        ));
        assert!(matches!(&stmts[2].kind, StmtKind::Assign { target: Target::Subscript { .. }, .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("x = \n").is_err());
        assert!(parse("1 = x\n").is_err());
        assert!(parse("def f(a, a):\n    pass\n").is_err());
        assert!(parse("if x\n    pass\n").is_err());
        assert!(parse("a < b < c\n").is_err());
        assert_eq!(parse("x = 1\ny = (2 +)\n").unwrap_err().line, 2);
        assert!(parse("    x = 1\n").is_err());
    }

    #[test]
    fn test_nesting_limits() {
        let nested = |depth: usize| format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        assert!(parse(&nested(MAX_BRACKET_NESTING)).is_ok());
        let err = parse(&nested(100_000)).unwrap_err();
        assert_eq!(err.message, "too many nested parentheses");
        assert_eq!(err.line, 1);

        let lists = format!("x = {}{}\n", "[".repeat(100_000), "]".repeat(100_000));
        assert_eq!(parse(&lists).unwrap_err().message, "too many nested parentheses");

        let sum = format!("x = 1{}\n", " + 1".repeat(100_000));
        assert_eq!(parse(&sum).unwrap_err().message, "too many nested expressions or blocks");

        let negated = format!("x = {}1\n", "-".repeat(100_000));
        assert!(parse(&negated).is_err());
        assert!(parse(&format!("x = {}1\n", "-".repeat(10))).is_ok());
    }
}
