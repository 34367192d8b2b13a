//! Recursive-descent parser for the evidence grammar
//!
//! ```text
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := not (("&&" | "and") not)*
//! not        := ("!" | "not") not | comparison
//! comparison := additive (cmp additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | primary
//! primary    := number | string | "true" | "false" | "(" expr ")"
//!             | aggregate "(" expr ("," expr)* ")"
//!             | "records" "[" int "]" ("." ident | "[" string "]" | "[" int "]")+
//! aggregate  := average | avg | mean | sum | count | len | min | max
//! ```

use crate::ast::{Aggregate, ArithOp, CompareOp, Expr, FieldRef, PathSegment};
use crate::lexer::{tokenize, Token};
use crate::{EvidenceError, Result};

/// Deepest nesting accepted
pub const MAX_DEPTH: usize = 48;

/// Parse one expression
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(error("empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;

    if let Some(token) = parser.peek() {
        return Err(error(format!("unexpected trailing token {:?}", token)));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(error(format!("expected {:?}, found {:?}", expected, token))),
            None => Err(error(format!("expected {:?}, found end of input", expected))),
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(error("expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) || self.eat_word("or") {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.not()?;
        while self.eat(&Token::AndAnd) || self.eat_word("and") {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) || self.eat_word("not") {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.additive()?;
        let mut rest = Vec::new();

        while let Some(op) = self.peek().and_then(compare_op) {
            self.pos += 1;
            rest.push((op, self.additive()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" | "True" => Ok(Expr::Bool(true)),
                "false" | "False" => Ok(Expr::Bool(false)),
                "records" => self.field_ref().map(Expr::Field),
                name => match Aggregate::from_name(name) {
                    Some(func) => self.call(func),
                    None => Err(error(format!("unknown identifier '{}'", name))),
                },
            },
            Some(token) => Err(error(format!("unexpected token {:?}", token))),
            None => Err(error("unexpected end of input")),
        }
    }

    fn call(&mut self, func: Aggregate) -> Result<Expr> {
        self.expect(Token::LParen)?;
        self.descend()?;

        let mut args = vec![self.or()?];
        while self.eat(&Token::Comma) {
            args.push(self.or()?);
        }

        self.expect(Token::RParen)?;
        self.depth -= 1;
        Ok(Expr::Call { func, args })
    }

    fn field_ref(&mut self) -> Result<FieldRef> {
        self.expect(Token::LBracket)?;
        let index = match self.next() {
            Some(Token::Number(n)) => as_index(n)?,
            other => return Err(error(format!("expected record index, found {:?}", other))),
        };
        self.expect(Token::RBracket)?;

        let mut path = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(key)) => path.push(PathSegment::Key(key)),
                        other => return Err(error(format!("expected field name, found {:?}", other))),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Str(key)) => path.push(PathSegment::Key(key)),
                        Some(Token::Number(n)) => path.push(PathSegment::Index(as_index(n)?)),
                        other => return Err(error(format!("expected key or index, found {:?}", other))),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => break,
            }
        }

        if path.is_empty() {
            return Err(error(format!("records[{}] must name a field", index)));
        }
        Ok(FieldRef { index, path })
    }
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token {
        Token::Lt => Some(CompareOp::Lt),
        Token::Le => Some(CompareOp::Le),
        Token::Gt => Some(CompareOp::Gt),
        Token::Ge => Some(CompareOp::Ge),
        Token::EqEq => Some(CompareOp::Eq),
        Token::Ne => Some(CompareOp::Ne),
        _ => None,
    }
}

fn as_index(n: f64) -> Result<usize> {
    if n.fract() == 0.0 && n >= 0.0 && n <= u32::MAX as f64 {
        Ok(n as usize)
    } else {
        Err(error(format!("invalid index {}", n)))
    }
}

fn error(message: impl Into<String>) -> EvidenceError {
    EvidenceError::Parse {
        message: message.into(),
    }
}
