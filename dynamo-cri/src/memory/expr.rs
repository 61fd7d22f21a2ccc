//! Evaluator for the DynamoDB expression subset the models emit
//!
//! Supported grammar:
//!
//! ```text
//! condition  := predicate ( AND predicate )*
//! predicate  := operand cmp operand
//!             | operand BETWEEN operand AND operand
//!             | begins_with ( operand , operand )
//! cmp        := = | <> | < | <= | > | >=
//! update     := SET assignment ( , assignment )*
//! assignment := operand = operand
//! operand    := #placeholder | :placeholder | attribute_name
//! ```
//!
//! Placeholders are resolved against the request's name/value maps at parse
//! time; an unknown placeholder is a validation error, as it is in DynamoDB.

use crate::backend::AttributeNames;
use crate::error::{CriError, Result};
use crate::Item;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Ident(String),
    Op(CmpOp),
    LParen,
    RParen,
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Attr(String),
    Literal(JsonValue),
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Compare(Operand, CmpOp, Operand),
    Between(Operand, Operand, Operand),
    BeginsWith(Operand, Operand),
}

/// Parsed key condition or filter expression
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Condition {
    predicates: Vec<Predicate>,
}

/// Parsed `SET` update expression
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Assignments {
    sets: Vec<(String, JsonValue)>,
}

fn validation(msg: impl std::fmt::Display) -> CriError {
    CriError::backend(format!("ValidationException: {msg}"))
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-';

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('<', Some('>')) => (CmpOp::Ne, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    _ => (CmpOp::Gt, 1),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '#' | ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_word(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(validation(format!("empty placeholder at offset {i}")));
                }
                let word: String = chars[i..end].iter().collect();
                tokens.push(if c == '#' {
                    Token::Name(word)
                } else {
                    Token::Value(word)
                });
                i = end;
            }
            c if is_word(c) => {
                let mut end = i;
                while end < chars.len() && is_word(chars[end]) {
                    end += 1;
                }
                tokens.push(Token::Ident(chars[i..end].iter().collect()));
                i = end;
            }
            other => return Err(validation(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a AttributeNames,
    values: &'a Item,
}

impl<'a> Parser<'a> {
    fn new(expr: &str, names: &'a AttributeNames, values: &'a Item) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(expr)?,
            pos: 0,
            names,
            values,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(validation(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(validation(format!(
                "expected {keyword}, found {:?}",
                self.peek()
            )))
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Name(placeholder)) => self
                .names
                .get(&placeholder)
                .map(|name| Operand::Attr(name.clone()))
                .ok_or_else(|| {
                    validation(format!("unresolved attribute name placeholder {placeholder}"))
                }),
            Some(Token::Value(placeholder)) => self
                .values
                .get(&placeholder)
                .map(|value| Operand::Literal(value.clone()))
                .ok_or_else(|| {
                    validation(format!("unresolved attribute value placeholder {placeholder}"))
                }),
            Some(Token::Ident(name)) => Ok(Operand::Attr(name)),
            other => Err(validation(format!("expected operand, found {other:?}"))),
        }
    }

    fn predicate(&mut self) -> Result<Predicate> {
        if self.peek_keyword("begins_with") {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let target = self.operand()?;
            self.expect(Token::Comma)?;
            let prefix = self.operand()?;
            self.expect(Token::RParen)?;
            return Ok(Predicate::BeginsWith(target, prefix));
        }

        let left = self.operand()?;
        if self.peek_keyword("between") {
            self.pos += 1;
            let low = self.operand()?;
            self.expect_keyword("and")?;
            let high = self.operand()?;
            return Ok(Predicate::Between(left, low, high));
        }
        match self.next() {
            Some(Token::Op(op)) => Ok(Predicate::Compare(left, op, self.operand()?)),
            other => Err(validation(format!("expected comparator, found {other:?}"))),
        }
    }
}

impl Condition {
    pub(crate) fn parse(expr: &str, names: &AttributeNames, values: &Item) -> Result<Self> {
        let mut parser = Parser::new(expr, names, values)?;
        let mut predicates = vec![parser.predicate()?];
        while parser.peek_keyword("and") {
            parser.pos += 1;
            predicates.push(parser.predicate()?);
        }
        if !parser.at_end() {
            return Err(validation(format!(
                "unexpected trailing token {:?}",
                parser.peek()
            )));
        }
        Ok(Self { predicates })
    }

    /// Value the condition pins `attribute` to with an equality, if any
    pub(crate) fn equality_on(&self, attribute: &str) -> Option<&JsonValue> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Compare(Operand::Attr(a), CmpOp::Eq, Operand::Literal(v))
            | Predicate::Compare(Operand::Literal(v), CmpOp::Eq, Operand::Attr(a))
                if a == attribute =>
            {
                Some(v)
            }
            _ => None,
        })
    }

    pub(crate) fn matches(&self, item: &Item) -> bool {
        self.predicates.iter().all(|p| evaluate(p, item))
    }
}

impl Assignments {
    pub(crate) fn parse(expr: &str, names: &AttributeNames, values: &Item) -> Result<Self> {
        let mut parser = Parser::new(expr, names, values)?;
        parser.expect_keyword("set")?;
        let mut sets = Vec::new();
        loop {
            let target = match parser.operand()? {
                Operand::Attr(name) => name,
                Operand::Literal(_) => {
                    return Err(validation("assignment target must be an attribute"))
                }
            };
            parser.expect(Token::Op(CmpOp::Eq))?;
            let value = match parser.operand()? {
                Operand::Literal(value) => value,
                Operand::Attr(_) => {
                    return Err(validation("assignment source must be a value placeholder"))
                }
            };
            sets.push((target, value));
            match parser.next() {
                Some(Token::Comma) => continue,
                None => break,
                other => return Err(validation(format!("unexpected token {other:?}"))),
            }
        }
        Ok(Self { sets })
    }

    pub(crate) fn apply(self, item: &mut Item) {
        for (name, value) in self.sets {
            item.insert(name, value);
        }
    }
}

fn resolve<'a>(operand: &'a Operand, item: &'a Item) -> Option<&'a JsonValue> {
    match operand {
        Operand::Attr(name) => item.get(name),
        Operand::Literal(value) => Some(value),
    }
}

fn evaluate(predicate: &Predicate, item: &Item) -> bool {
    match predicate {
        Predicate::Compare(left, op, right) => {
            let (Some(l), Some(r)) = (resolve(left, item), resolve(right, item)) else {
                return false;
            };
            match op {
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
                _ => match compare_scalars(l, r) {
                    Some(ordering) => match op {
                        CmpOp::Lt => ordering == Ordering::Less,
                        CmpOp::Le => ordering != Ordering::Greater,
                        CmpOp::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    },
                    None => false,
                },
            }
        }
        Predicate::Between(target, low, high) => {
            let (Some(v), Some(lo), Some(hi)) = (
                resolve(target, item),
                resolve(low, item),
                resolve(high, item),
            ) else {
                return false;
            };
            matches!(compare_scalars(v, lo), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_scalars(v, hi), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::BeginsWith(target, prefix) => {
            match (resolve(target, item), resolve(prefix, item)) {
                (Some(JsonValue::String(s)), Some(JsonValue::String(p))) => s.starts_with(p.as_str()),
                _ => false,
            }
        }
    }
}

/// Order two scalars the way a sort key orders them; `None` across types.
pub(crate) fn compare_scalars(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used to sort index entries: numbers, then strings, then the rest.
pub(crate) fn sort_key_order(a: &JsonValue, b: &JsonValue) -> Ordering {
    fn rank(v: &JsonValue) -> u8 {
        match v {
            JsonValue::Number(_) => 0,
            JsonValue::String(_) => 1,
            _ => 2,
        }
    }
    compare_scalars(a, b).unwrap_or_else(|| {
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string()))
    })
}
