#![forbid(unsafe_code)]

//! Sandboxed expression evaluation for `eval(...)` templates.
//!
//! The language is a small, side-effect free subset of JavaScript
//! expressions. There are no function calls, member accesses or
//! assignments, so evaluating untrusted server text cannot reach anything
//! beyond the bound variables.
//!
//! | Precedence (low → high) | Operators |
//! |-------------------------|-----------|
//! | conditional | `c ? a : b` |
//! | logical or | `\|\|` |
//! | logical and | `&&` |
//! | equality | `==` `!=` `===` `!==` |
//! | relational | `<` `<=` `>` `>=` |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `%` |
//! | unary | `!` `-` `+` |
//!
//! Variables are named `var0`, `var1`, ... and index into the slice passed
//! to [`Expression::evaluate`].
//!
//! Parsing rejects expressions whose syntax tree is deeper than
//! [`MAX_DEPTH`], so neither parsing nor evaluation can exhaust the stack.

use std::fmt;

use serde_json::Value;

use crate::coerce::format_f64;

/// Deepest syntax tree (and parser nesting) an expression may have.
pub const MAX_DEPTH: usize = 256;

/// Parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    UnexpectedChar { pos: usize, ch: char },
    UnterminatedString { pos: usize },
    UnexpectedToken { pos: usize, found: String },
    UnexpectedEnd,
    UnknownIdentifier(String),
    MissingVariable(usize),
    /// Nesting exceeds [`MAX_DEPTH`].
    TooDeep { limit: usize },
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar { pos, ch } => write!(f, "unexpected character {ch:?} at {pos}"),
            Self::UnterminatedString { pos } => write!(f, "unterminated string starting at {pos}"),
            Self::UnexpectedToken { pos, found } => write!(f, "unexpected {found} at {pos}"),
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnknownIdentifier(name) => write!(f, "unknown identifier: {name}"),
            Self::MissingVariable(index) => write!(f, "no value bound for var{index}"),
            Self::TooDeep { limit } => write!(f, "expression nested deeper than {limit} levels"),
        }
    }
}

impl std::error::Error for ExprError {}

/// A dynamically typed expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl ExprValue {
    /// Expose a JSON value to the evaluator. Containers become their JSON
    /// text.
    #[must_use]
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Null,
            Some(Value::Bool(b)) => Self::Bool(*b),
            Some(Value::Number(n)) => n.as_f64().map_or(Self::Null, Self::Number),
            Some(Value::String(s)) => Self::Str(s.clone()),
            Some(other) => Self::Str(other.to_string()),
        }
    }

    /// Back to JSON. Integral numbers become integers; non-finite numbers
    /// have no JSON form and become `null`.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) if !n.is_finite() => Value::Null,
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
                Value::from(n as i64)
            }
            Self::Number(n) => Value::from(n),
            Self::Str(s) => Value::String(s),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    fn to_text(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) if n.is_nan() => "NaN".to_owned(),
            Self::Number(n) if n.is_infinite() => {
                (if *n > 0.0 { "Infinity" } else { "-Infinity" }).to_owned()
            }
            Self::Number(n) => format_f64(*n),
            Self::Str(s) => s.clone(),
        }
    }

    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }

    fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    And,
    Or,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::StrictEq | Self::StrictNe => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(ExprValue),
    Var(usize),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
    "?", ":", "(", ")",
];

fn lex(source: &str) -> Result<Vec<(usize, Tok)>, ExprError> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let rest = &source[pos..];
        let Some(ch) = rest.chars().next() else { break };
        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }
        if ch.is_ascii_digit() || (ch == '.' && rest[1..].starts_with(|c: char| c.is_ascii_digit())) {
            let len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let number = rest[..len]
                .parse()
                .map_err(|_| ExprError::UnexpectedChar { pos, ch })?;
            out.push((pos, Tok::Num(number)));
            pos += len;
            continue;
        }
        if ch == '"' || ch == '\'' {
            let (text, len) = lex_string(rest, ch).ok_or(ExprError::UnterminatedString { pos })?;
            out.push((pos, Tok::Str(text)));
            pos += len;
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == '_' || ch == '$' {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
                .unwrap_or(rest.len());
            out.push((pos, Tok::Ident(rest[..len].to_owned())));
            pos += len;
            continue;
        }
        let op = OPERATORS
            .iter()
            .find(|op| rest.starts_with(**op))
            .ok_or(ExprError::UnexpectedChar { pos, ch })?;
        out.push((pos, Tok::Op(op)));
        pos += op.len();
    }
    Ok(out)
}

/// Returns the unescaped text and the consumed length including quotes.
fn lex_string(rest: &str, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            c if c == quote => return Some((text, i + c.len_utf8())),
            c => text.push(c),
        }
    }
    None
}

/// A subtree and its height.
type Parsed = (Expr, usize);

fn node(expr: Expr, height: usize) -> Result<Parsed, ExprError> {
    if height > MAX_DEPTH {
        return Err(ExprError::TooDeep { limit: MAX_DEPTH });
    }
    Ok((expr, height))
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Tok)> {
        let tok = self.tokens.get(self.cursor).cloned();
        self.cursor += 1;
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ExprError> {
        if self.eat_op(op) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn unexpected(&self) -> ExprError {
        match self.tokens.get(self.cursor) {
            Some((pos, tok)) => ExprError::UnexpectedToken {
                pos: *pos,
                found: format!("{tok:?}"),
            },
            None => ExprError::UnexpectedEnd,
        }
    }

    /// Run a recursive production one level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Parsed, ExprError> {
        let (condition, condition_height) = self.binary(1)?;
        if !self.eat_op("?") {
            return Ok((condition, condition_height));
        }
        let (then, then_height) = self.nested(Self::conditional)?;
        self.expect_op(":")?;
        let (otherwise, otherwise_height) = self.nested(Self::conditional)?;
        node(
            Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise)),
            1 + condition_height.max(then_height).max(otherwise_height),
        )
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        let Some(Tok::Op(op)) = self.peek() else {
            return None;
        };
        Some(match *op {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNe,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Precedence climbing; all binary operators are left-associative.
    fn binary(&mut self, min: u8) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.unary()?;
        while let Some(op) = self.binary_op() {
            if op.precedence() < min {
                break;
            }
            self.cursor += 1;
            let (rhs, rhs_height) = self.nested(|parser| parser.binary(op.precedence() + 1))?;
            (lhs, height) = node(
                Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                1 + height.max(rhs_height),
            )?;
        }
        Ok((lhs, height))
    }

    fn unary(&mut self) -> Result<Parsed, ExprError> {
        let op = if self.eat_op("!") {
            UnaryOp::Not
        } else if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Plus
        } else {
            return self.primary();
        };
        let (operand, height) = self.nested(Self::unary)?;
        node(Expr::Unary(op, Box::new(operand)), height + 1)
    }

    fn primary(&mut self) -> Result<Parsed, ExprError> {
        let Some((pos, tok)) = self.next() else {
            return Err(ExprError::UnexpectedEnd);
        };
        let leaf = match tok {
            Tok::Num(n) => Expr::Literal(ExprValue::Number(n)),
            Tok::Str(s) => Expr::Literal(ExprValue::Str(s)),
            Tok::Ident(name) => match name.as_str() {
                "true" => Expr::Literal(ExprValue::Bool(true)),
                "false" => Expr::Literal(ExprValue::Bool(false)),
                "null" | "undefined" => Expr::Literal(ExprValue::Null),
                _ => name
                    .strip_prefix("var")
                    .and_then(|index| index.parse().ok())
                    .map(Expr::Var)
                    .ok_or(ExprError::UnknownIdentifier(name))?,
            },
            Tok::Op("(") => {
                let inner = self.nested(Self::conditional)?;
                self.expect_op(")")?;
                return Ok(inner);
            }
            other => {
                return Err(ExprError::UnexpectedToken {
                    pos,
                    found: format!("{other:?}"),
                });
            }
        };
        Ok((leaf, 1))
    }
}

/// A parsed expression, ready to evaluate any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut parser = Parser {
            tokens: lex(source)?,
            cursor: 0,
            depth: 0,
        };
        let (root, _) = parser.conditional()?;
        if parser.cursor < parser.tokens.len() {
            return Err(parser.unexpected());
        }
        Ok(Self { root })
    }

    /// Evaluate with `vars[i]` bound to `var{i}`.
    pub fn evaluate(&self, vars: &[ExprValue]) -> Result<ExprValue, ExprError> {
        eval(&self.root, vars)
    }
}

fn eval(expr: &Expr, vars: &[ExprValue]) -> Result<ExprValue, ExprError> {
    Ok(match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Var(index) => vars
            .get(*index)
            .cloned()
            .ok_or(ExprError::MissingVariable(*index))?,
        Expr::Unary(op, operand) => {
            let value = eval(operand, vars)?;
            match op {
                UnaryOp::Not => ExprValue::Bool(!value.truthy()),
                UnaryOp::Neg => ExprValue::Number(-value.to_number()),
                UnaryOp::Plus => ExprValue::Number(value.to_number()),
            }
        }
        Expr::Conditional(condition, then, otherwise) => {
            if eval(condition, vars)?.truthy() {
                eval(then, vars)?
            } else {
                eval(otherwise, vars)?
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let left = eval(lhs, vars)?;
            if left.truthy() { eval(rhs, vars)? } else { left }
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let left = eval(lhs, vars)?;
            if left.truthy() { left } else { eval(rhs, vars)? }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, vars)?, eval(rhs, vars)?),
    })
}

fn binary(op: BinaryOp, left: ExprValue, right: ExprValue) -> ExprValue {
    use ExprValue::{Bool, Number, Str};
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Str(_), _) | (_, Str(_)) => Str(left.to_text() + &right.to_text()),
            _ => Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Bool(left.loose_eq(&right)),
        BinaryOp::Ne => Bool(!left.loose_eq(&right)),
        BinaryOp::StrictEq => Bool(left.strict_eq(&right)),
        BinaryOp::StrictNe => Bool(!left.strict_eq(&right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Str(a), Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Bool(ordering.is_some_and(|ord| match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::And => {
            if left.truthy() { right } else { left }
        }
        BinaryOp::Or => {
            if left.truthy() { left } else { right }
        }
    }
}
