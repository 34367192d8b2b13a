//! Tokenizer for evidence expressions

use crate::{EvidenceError, Result};

/// Longest expression text accepted
pub const MAX_EXPRESSION_LEN: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Dot,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(parse_error(format!(
            "expression longer than {} bytes",
            MAX_EXPRESSION_LEN
        )));
    }

    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('\'' | '"', _) => {
                let (text, width) = lex_string(&chars[i..])?;
                (Token::Str(text), width)
            }
            (d, _) if d.is_ascii_digit() => {
                let (number, width) = lex_number(&chars[i..])?;
                (Token::Number(number), width)
            }
            (a, _) if a.is_ascii_alphabetic() || a == '_' => {
                let width = chars[i..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .count();
                (Token::Ident(chars[i..i + width].iter().collect()), width)
            }
            (other, _) => {
                return Err(parse_error(format!("unexpected character '{}' at {}", other, i)));
            }
        };

        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn lex_string(chars: &[char]) -> Result<(String, usize)> {
    let quote = chars[0];
    let mut text = String::new();
    let mut i = 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| parse_error("unterminated escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(parse_error("unterminated string literal"))
}

/// Digits with optional `_` separators, fraction and exponent
fn lex_number(chars: &[char]) -> Result<(f64, usize)> {
    let mut digits = String::new();
    let mut i = 0;

    let take_digits = |i: &mut usize, digits: &mut String| {
        while let Some(c) = chars.get(*i) {
            match c {
                '0'..='9' => digits.push(*c),
                '_' => {}
                _ => break,
            }
            *i += 1;
        }
    };

    take_digits(&mut i, &mut digits);

    if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
        digits.push('.');
        i += 1;
        take_digits(&mut i, &mut digits);
    }

    if matches!(chars.get(i), Some('e' | 'E')) {
        let sign = chars.get(i + 1).filter(|c| **c == '+' || **c == '-');
        let exp_start = i + 1 + usize::from(sign.is_some());
        if chars.get(exp_start).is_some_and(|c| c.is_ascii_digit()) {
            digits.push('e');
            if let Some(sign) = sign {
                digits.push(*sign);
            }
            i = exp_start;
            take_digits(&mut i, &mut digits);
        }
    }

    digits
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| (n, i))
        .ok_or_else(|| parse_error(format!("invalid number '{}'", digits)))
}

fn parse_error(message: impl Into<String>) -> EvidenceError {
    EvidenceError::Parse {
        message: message.into(),
    }
}
