//! Recursive-descent parser for the sandbox script language.
//!
//! ```text
//! program   = stmt*
//! stmt      = "let" IDENT "=" expr ";"?
//!           | IDENT "=" expr ";"?
//!           | "print" "(" (expr ("," expr)*)? ")" ";"?
//!           | "if" expr block ("else" (block | if-stmt))?
//!           | "while" expr block
//!           | expr ";"?
//! block     = "{" stmt* "}"
//! expr      = or
//! or        = and ("||" and)*
//! and       = compare ("&&" compare)*
//! compare   = sum (("==" | "!=" | "<" | "<=" | ">" | ">=") sum)?
//! sum       = product (("+" | "-") product)*
//! product   = unary (("*" | "/" | "%") unary)*
//! unary     = ("-" | "!") unary | power
//! power     = primary ("^" unary)?
//! primary   = NUMBER | STRING | "true" | "false" | IDENT ("(" args ")")? | "(" expr ")"
//! ```

use super::ScriptError;
use super::lexer::{Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Var { name: String, line: usize },
    Unary(UnaryOp, Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, line: usize },
    Call { name: String, args: Vec<Expr>, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr, line: usize },
    Print(Vec<Expr>),
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Expr(Expr),
}

/// Deepest syntax tree the parser builds. Bounds the parser's own recursion
/// and the interpreter's walk over the result.
pub const MAX_DEPTH: usize = 128;

pub fn parse(tokens: &[Spanned]) -> Result<Vec<Stmt>, ScriptError> {
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let mut program = Vec::new();
    while !parser.at_end() {
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos).map(|s| &s.token);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ScriptError {
        match self.peek() {
            Some(tok) => ScriptError::syntax(self.line(), format!("expected {what}, found {tok:?}")),
            None => ScriptError::syntax(self.line(), format!("expected {what}, found end of input")),
        }
    }

    /// One level deeper into the tree; the caller restores `depth` on success.
    fn descend(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_DEPTH {
            return Err(ScriptError::syntax(self.line(), "nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.descend()?;
        let stmt = self.statement_inner();
        self.depth -= 1;
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        let stmt = match self.peek() {
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.ident()?;
                self.expect(Token::Assign, "'='")?;
                Stmt::Let { name, value: self.expr()? }
            }
            Some(Token::Ident(_)) if self.peek_second() == Some(&Token::Assign) => {
                let line = self.line();
                let name = self.ident()?;
                self.pos += 1;
                Stmt::Assign { name, value: self.expr()?, line }
            }
            Some(Token::Print) => {
                self.pos += 1;
                self.expect(Token::LParen, "'(' after print")?;
                Stmt::Print(self.arguments()?)
            }
            Some(Token::If) => return self.if_statement(),
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                let body = self.block()?;
                return Ok(Stmt::While { cond, body });
            }
            _ => Stmt::Expr(self.expr()?),
        };
        self.eat(&Token::Semi);
        Ok(stmt)
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.descend()?;
        let stmt = self.if_chain();
        self.depth -= 1;
        stmt
    }

    fn if_chain(&mut self) -> Result<Stmt, ScriptError> {
        self.expect(Token::If, "'if'")?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If { cond, then, otherwise })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    /// Comma-separated expressions after an opening parenthesis, through `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(Token::Comma, "',' or ')'")?;
        }
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.or()
    }

    fn binary(&self, op: BinaryOp, lhs: Expr, rhs: Expr, line: usize) -> Expr {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line }
    }

    fn or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.and()?;
        let mut levels = 0;
        while self.peek() == Some(&Token::Or) {
            let line = self.line();
            self.pos += 1;
            self.descend()?;
            levels += 1;
            let rhs = self.and()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs, line);
        }
        self.depth -= levels;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.compare()?;
        let mut levels = 0;
        while self.peek() == Some(&Token::And) {
            let line = self.line();
            self.pos += 1;
            self.descend()?;
            levels += 1;
            let rhs = self.compare()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs, line);
        }
        self.depth -= levels;
        Ok(lhs)
    }

    fn compare(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::NotEq,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::LtEq) => BinaryOp::LtEq,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::GtEq) => BinaryOp::GtEq,
            _ => return Ok(lhs),
        };
        let line = self.line();
        self.pos += 1;
        let rhs = self.sum()?;
        Ok(self.binary(op, lhs, rhs, line))
    }

    fn sum(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.product()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => {
                    self.depth -= levels;
                    return Ok(lhs);
                }
            };
            let line = self.line();
            self.pos += 1;
            self.descend()?;
            levels += 1;
            let rhs = self.product()?;
            lhs = self.binary(op, lhs, rhs, line);
        }
    }

    fn product(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => {
                    self.depth -= levels;
                    return Ok(lhs);
                }
            };
            let line = self.line();
            self.pos += 1;
            self.descend()?;
            levels += 1;
            let rhs = self.unary()?;
            lhs = self.binary(op, lhs, rhs, line);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.descend()?;
        let expr = self.prefixed();
        self.depth -= 1;
        expr
    }

    fn prefixed(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.power(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    // right-associative: 2 ^ 3 ^ 2 == 2 ^ 9
    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            let line = self.line();
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(self.binary(BinaryOp::Pow, base, exponent, line));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    Ok(Expr::Call { name, args, line })
                } else {
                    Ok(Expr::Var { name, line })
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(tok) => Err(ScriptError::syntax(line, format!("unexpected {tok:?}"))),
            None => Err(ScriptError::syntax(line, "unexpected end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::lexer::tokenize;

    fn program(src: &str) -> Vec<Stmt> {
        parse(&tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn precedence_and_power_associativity() {
        let stmts = program("1 + 2 * 3 ^ 2 ^ 2");
        let Stmt::Expr(Expr::Binary { op: BinaryOp::Add, rhs, .. }) = &stmts[0] else {
            panic!("expected addition at the top: {stmts:?}");
        };
        let Expr::Binary { op: BinaryOp::Mul, rhs: pow, .. } = rhs.as_ref() else {
            panic!("expected multiplication: {rhs:?}");
        };
        let Expr::Binary { op: BinaryOp::Pow, rhs: exponent, .. } = pow.as_ref() else {
            panic!("expected power: {pow:?}");
        };
        assert!(matches!(exponent.as_ref(), Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn statements() {
        let stmts = program(
            "let n = 3\nwhile n > 0 { print(n, \"left\"); n = n - 1 }\nif n == 0 { print(\"done\") } else if n < 0 { print() } else { }",
        );
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Let { .. }));
        let Stmt::While { body, .. } = &stmts[1] else { panic!() };
        assert!(matches!(&body[0], Stmt::Print(args) if args.len() == 2));
        assert!(matches!(body[1], Stmt::Assign { .. }));
        let Stmt::If { otherwise, .. } = &stmts[2] else { panic!() };
        assert!(matches!(otherwise[0], Stmt::If { .. }));
    }

    #[test]
    fn syntax_errors() {
        let bad = ["let = 3", "print(1", "while x { print(x)", "1 +", "if { }"];
        for src in bad {
            let tokens = tokenize(src).unwrap();
            assert!(parse(&tokens).is_err(), "{src} should not parse");
        }
    }

    #[test]
    fn nesting_is_capped() {
        let deep = [
            format!("print({}1{})", "(".repeat(100_000), ")".repeat(100_000)),
            format!("{}1", "-".repeat(100_000)),
            format!("1{}", " + 1".repeat(100_000)),
            format!("{}{}", "if true { ".repeat(10_000), "}".repeat(10_000)),
        ];
        for src in &deep {
            let err = parse(&tokenize(src).unwrap()).unwrap_err();
            assert!(matches!(err, ScriptError::Syntax { ref msg, .. } if msg.contains("too deep")));
        }

        let shallow = format!("print({}1{} + 1 + 1)", "(".repeat(50), ")".repeat(50));
        assert_eq!(program(&shallow).len(), 1);
    }
}
