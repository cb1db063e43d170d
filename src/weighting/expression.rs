// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Line-oriented language for cost-model statements.
//!
//! ```text
//! base: 'car'
//! max_speed: 90            # comments run to the end of the line
//! priority:
//!   surface == 'mud' ? 0.1
//!   road_class == 'track' && !toll ? 0.5
//!   0.9
//! ```
//!
//! Every non-indented line starts an assignment `target: [condition ?] value`;
//! indented lines add further `[condition ?] value` expressions to the last target.
//! Expressions of a repeated target accumulate in source order.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ModelError;

/// Right-hand side of an expression: a number or a quoted string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "numeric",
            Self::Str(_) => "string",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "'{}'", s),
        }
    }
}

/// Literal on the right of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
    /// A bare identifier naming a category, as in `road_class == MOTORWAY`.
    Constant(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "'{}'", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Constant(c) => f.write_str(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

/// Boolean condition guarding an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Const(bool),
    /// A boolean encoded value, true if set.
    Var(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare {
        name: String,
        op: CmpOp,
        value: Literal,
    },
}

impl Condition {
    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 0,
            Self::And(..) => 1,
            _ => 2,
        }
    }

    fn fmt_child(&self, child: &Condition, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({})", child)
        } else {
            write!(f, "{}", child)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(b) => write!(f, "{}", b),
            Self::Var(name) => f.write_str(name),
            Self::Not(inner) => {
                if inner.precedence() < 2 || matches!(**inner, Self::Compare { .. }) {
                    write!(f, "!({})", inner)
                } else {
                    write!(f, "!{}", inner)
                }
            }
            Self::And(a, b) => {
                self.fmt_child(a, f)?;
                f.write_str(" && ")?;
                self.fmt_child(b, f)
            }
            Self::Or(a, b) => write!(f, "{} || {}", a, b),
            Self::Compare { name, op, value } => write!(f, "{} {} {}", name, op.symbol(), value),
        }
    }
}

/// One `[condition ?] value` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GSExpression {
    pub condition: Option<Condition>,
    pub value: Value,
}

impl GSExpression {
    /// Parses a single `[condition ?] value` entry.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let clean = strip_comment(text);
        parse_expression(clean, text, 1, 0)
    }
}

impl fmt::Display for GSExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(c) => write!(f, "{} ? {}", c, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

impl TryFrom<String> for GSExpression {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, ModelError> {
        Self::parse(&s)
    }
}

impl From<GSExpression> for String {
    fn from(e: GSExpression) -> Self {
        e.to_string()
    }
}

/// A target with all its expressions, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct GSAssignment {
    pub target: String,
    pub expressions: Vec<GSExpression>,
}

/// Targets understood by [type_check] and their required value kind.
pub const TARGETS: [(&str, &str); 8] = [
    ("base", "string"),
    ("max_speed", "numeric"),
    ("distance_influence", "numeric"),
    ("vehicle_width", "numeric"),
    ("vehicle_height", "numeric"),
    ("vehicle_weight", "numeric"),
    ("speed", "numeric"),
    ("priority", "numeric"),
];

/// Parses a whole document into assignments. Repeated targets are merged
/// into the first assignment with that target.
pub fn parse(text: &str) -> Result<Vec<GSAssignment>, ModelError> {
    let mut assignments: Vec<GSAssignment> = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let clean = strip_comment(raw);
        if clean.trim().is_empty() {
            continue;
        }

        if clean.starts_with(|c: char| c == ' ' || c == '\t') {
            let Some(a) = current else {
                return Err(parse_error(line_no, raw, 0, "expression without a target"));
            };
            let indent = clean.len() - clean.trim_start().len();
            let expr = parse_expression(clean.trim_start(), raw, line_no, indent)?;
            assignments[a].expressions.push(expr);
            continue;
        }

        let Some(colon) = clean.find(':') else {
            return Err(parse_error(line_no, raw, 0, "expected 'target:'"));
        };
        let target = clean[..colon].trim();
        if !is_identifier(target) {
            return Err(parse_error(line_no, raw, 0, "invalid target name"));
        }

        let a = match assignments.iter().position(|a| a.target == target) {
            Some(a) => a,
            None => {
                assignments.push(GSAssignment {
                    target: target.to_string(),
                    expressions: Vec::new(),
                });
                assignments.len() - 1
            }
        };
        current = Some(a);

        let rest = &clean[colon + 1..];
        if !rest.trim().is_empty() {
            let offset = colon + 1 + (rest.len() - rest.trim_start().len());
            let expr = parse_expression(rest.trim_start(), raw, line_no, offset)?;
            assignments[a].expressions.push(expr);
        }
    }

    for a in &assignments {
        if a.expressions.is_empty() {
            return Err(ModelError::TypeCheck {
                target: a.target.clone(),
                expected: "non-empty",
            });
        }
    }

    Ok(assignments)
}

/// Parses a document and checks it with [type_check].
pub fn parse_checked(text: &str) -> Result<Vec<GSAssignment>, ModelError> {
    let assignments = parse(text)?;
    type_check(&assignments)?;
    Ok(assignments)
}

/// Ensures every target is known and all of its values have the kind the target requires.
pub fn type_check(assignments: &[GSAssignment]) -> Result<(), ModelError> {
    for a in assignments {
        let expected = TARGETS
            .iter()
            .find(|(t, _)| *t == a.target)
            .map(|&(_, kind)| kind)
            .ok_or_else(|| ModelError::UnknownTarget(a.target.clone()))?;

        if let Some(e) = a.expressions.iter().find(|e| e.value.kind() != expected) {
            log::debug!("{}: {} value {} rejected", a.target, e.value.kind(), e.value);
            return Err(ModelError::TypeCheck {
                target: a.target.clone(),
                expected,
            });
        }
    }
    Ok(())
}

fn parse_error(line: usize, text: &str, offset: usize, message: &str) -> ModelError {
    let column = text.get(..offset).map(|s| s.chars().count()).unwrap_or(offset) + 1;
    ModelError::Parse {
        line,
        column,
        text: text.to_string(),
        message: message.to_string(),
    }
}

/// Cuts off a `#` comment, ignoring hashes inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '#' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses `[condition ?] value`; `offset` is the position of `expr` inside `raw`.
fn parse_expression(expr: &str, raw: &str, line: usize, offset: usize) -> Result<GSExpression, ModelError> {
    let tokens = tokenize(expr).map_err(|(pos, msg)| parse_error(line, raw, offset + pos, msg))?;
    let question = tokens.iter().position(|t| t.token == Token::Question);

    let (condition, value_tokens) = match question {
        Some(q) => {
            let mut p = Parser {
                tokens: &tokens[..q],
                pos: 0,
                end: tokens[q].offset,
            };
            let cond = p
                .parse_condition()
                .map_err(|(pos, msg)| parse_error(line, raw, offset + pos, msg))?;
            (Some(cond), &tokens[q + 1..])
        }
        None => (None, &tokens[..]),
    };

    let value = match value_tokens {
        [Spanned { token: Token::Number(n), .. }] => Value::Number(*n),
        [Spanned { token: Token::Minus, .. }, Spanned { token: Token::Number(n), .. }] => {
            Value::Number(-*n)
        }
        [Spanned { token: Token::Str(s), .. }] => Value::Str(s.clone()),
        [] => return Err(parse_error(line, raw, offset + expr.len(), "missing value")),
        [first, ..] => {
            return Err(parse_error(
                line,
                raw,
                offset + first.offset,
                "expected a number or a quoted string",
            ))
        }
    };

    Ok(GSExpression { condition, value })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Op(CmpOp),
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
    Question,
}

#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    offset: usize,
}

type Located<T> = Result<T, (usize, &'static str)>;

fn tokenize(s: &str) -> Located<Vec<Spanned>> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let rest = &bytes[i..];

        let token = match c {
            b' ' | b'\t' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'?' => {
                i += 1;
                Token::Question
            }
            b'-' => {
                i += 1;
                Token::Minus
            }
            b'&' if rest.starts_with(b"&&") => {
                i += 2;
                Token::And
            }
            b'|' if rest.starts_with(b"||") => {
                i += 2;
                Token::Or
            }
            b'=' if rest.starts_with(b"==") => {
                i += 2;
                Token::Op(CmpOp::Eq)
            }
            b'!' if rest.starts_with(b"!=") => {
                i += 2;
                Token::Op(CmpOp::Ne)
            }
            b'!' => {
                i += 1;
                Token::Not
            }
            b'<' | b'>' => {
                let eq = bytes.get(i + 1) == Some(&b'=');
                i += if eq { 2 } else { 1 };
                Token::Op(match (c, eq) {
                    (b'<', false) => CmpOp::Lt,
                    (b'<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                })
            }
            b'\'' => {
                let Some(len) = s[i + 1..].find('\'') else {
                    return Err((start, "unterminated string"));
                };
                i += len + 2;
                Token::Str(s[start + 1..start + 1 + len].to_string())
            }
            b'0'..=b'9' | b'.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let n = s[start..i].parse().map_err(|_| (start, "invalid number"))?;
                Token::Number(n)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                Token::Ident(s[start..i].to_string())
            }
            _ => return Err((start, "unexpected character")),
        };

        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    Ok(tokens)
}

/// Recursive-descent parser for conditions:
///
/// ```text
/// or      := and ('||' and)*
/// and     := unary ('&&' unary)*
/// unary   := '!' unary | primary
/// primary := '(' or ')' | 'true' | 'false' | name [op literal]
/// ```
struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
}

impl Parser<'_> {
    fn parse_condition(&mut self) -> Located<Condition> {
        let cond = self.parse_or()?;
        match self.tokens.get(self.pos) {
            None => Ok(cond),
            Some(t) => Err((t.offset, "unexpected token in condition")),
        }
    }

    fn here(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.offset).unwrap_or(self.end)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn parse_or(&mut self) -> Located<Condition> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Located<Condition> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Located<Condition> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Located<Condition> {
        let at = self.here();
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err((self.here(), "expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => return Ok(Condition::Const(true)),
                    "false" => return Ok(Condition::Const(false)),
                    _ => {}
                }

                let Some(Token::Op(op)) = self.peek().cloned() else {
                    return Ok(Condition::Var(name));
                };
                self.pos += 1;
                let value = self.parse_literal()?;
                Ok(Condition::Compare { name, op, value })
            }
            Some(_) => Err((at, "expected a condition")),
            None => Err((at, "empty condition")),
        }
    }

    fn parse_literal(&mut self) -> Located<Literal> {
        let at = self.here();
        let negative = self.peek() == Some(&Token::Minus);
        if negative {
            self.pos += 1;
        }

        let lit = match self.peek().cloned() {
            Some(Token::Number(n)) => Literal::Number(if negative { -n } else { n }),
            Some(Token::Str(s)) if !negative => Literal::Str(s),
            Some(Token::Ident(b)) if !negative && b == "true" => Literal::Bool(true),
            Some(Token::Ident(b)) if !negative && b == "false" => Literal::Bool(false),
            Some(Token::Ident(c)) if !negative => Literal::Constant(c),
            _ => return Err((at, "expected a literal")),
        };
        self.pos += 1;
        Ok(lit)
    }
}
